//! # Geiger Bridge
//!
//! The Geiger Bridge performs the following functions:
//! * Opens a serial link to a Geiger counter, or substitutes a synthetic
//!   transport when no device is configured.
//! * Puts the device into heartbeat mode, in which it reports a 2-byte event
//!   count frame once per second.
//! * Decodes each frame and accumulates the event counts over a fixed 60
//!   second interval.
//! * At the end of each interval, writes the counts-per-minute total and the
//!   derived dose rate to InfluxDB.
//! * Shuts down gracefully on SIGINT or SIGTERM, taking the device out of
//!   heartbeat mode before releasing the transport.
//!
//! ## Error Conditions
//! * An unreachable InfluxDB server or an unopenable device terminates
//!   startup with a non-zero exit status.
//! * A failed sink write drops that interval's sample; the accumulator is
//!   reset regardless, so counts are never double-reported.
//! * End of stream on the transport stops count production but not the
//!   bridge; the flush timer keeps firing with whatever was accumulated.

mod accumulator;
mod control;
mod error;
mod frame;
mod metric_names;
mod reader;
mod sink;
mod transport;

use crate::{
    control::{FLUSH_PERIOD, run_control_loop},
    reader::{COUNT_CHANNEL_CAPACITY, run_reader},
    sink::MetricsSink,
    transport::{DeviceSession, DynSensorPort, RawLoggingPort, SyntheticPort, open_device},
};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use miette::{Context, IntoDiagnostic};
use std::net::SocketAddr;
use tokio::{
    select,
    signal::unix::{SignalKind, signal},
    sync::mpsc,
};
use tracing::info;
use url::Url;

/// [clap] derived struct to handle command line parameters.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Serial port device for sensor communication.
    /// If unset or empty, a synthetic transport is used which reports a
    /// fixed frame on every read.
    #[clap(long)]
    dev: Option<String>,

    /// Serial port baud rate for sensor communication
    #[clap(long, default_value = "57600")]
    baud: u32,

    /// Address of the InfluxDB server
    #[clap(long, default_value = "http://localhost:8086")]
    influx_addr: Url,

    /// Log the raw communication with the device
    #[clap(long)]
    log_raw_communication: bool,

    /// Endpoint on which Prometheus text format metrics are available
    #[clap(long, env, default_value = "127.0.0.1:9090")]
    observability_address: SocketAddr,
}

/// Entry point.
#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Cli::parse();

    let sink = MetricsSink::connect(&args.influx_addr)
        .await
        .into_diagnostic()
        .wrap_err("Failed to reach the metrics sink")?;

    let port: DynSensorPort = match args.dev.as_deref() {
        Some(device) if !device.is_empty() => open_device(device, args.baud).into_diagnostic()?,
        _ => {
            info!("No device configured, using the synthetic transport");
            Box::new(SyntheticPort)
        }
    };
    let port: DynSensorPort = if args.log_raw_communication {
        Box::new(RawLoggingPort::new(port))
    } else {
        port
    };

    // Install exporter and register metrics
    PrometheusBuilder::new()
        .with_http_listener(args.observability_address)
        .install()
        .into_diagnostic()
        .wrap_err("Failed to set up the Prometheus metrics exporter")?;
    metric_names::describe();

    let (session, read_half) = DeviceSession::start(port)
        .await
        .map_err(error::BridgeError::HeartbeatEnable)
        .into_diagnostic()?;

    let (count_send, counts) = mpsc::channel(COUNT_CHANNEL_CAPACITY);
    let reader_handle = tokio::spawn(run_reader(read_half, count_send));

    // Is used to await any termination signals
    let mut sigint = signal(SignalKind::interrupt()).into_diagnostic()?;
    let mut sigterm = signal(SignalKind::terminate()).into_diagnostic()?;
    let shutdown = async move {
        select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
    };

    run_control_loop(counts, &sink, FLUSH_PERIOD, shutdown).await;

    session.close().await;
    reader_handle.abort();
    Ok(())
}

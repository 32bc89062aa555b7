//! Top-level error handling.
use thiserror::Error;

/// Errors that can occur while bringing the bridge up.
///
/// All of these are fatal: they are reported via [miette] at the binary
/// boundary and terminate the process with a non-zero exit status. Errors
/// that occur after startup (read failures, sink write failures) are logged
/// where they happen and the pipeline carries on.
#[derive(Debug, Error)]
pub(crate) enum BridgeError {
    /// The serial device could not be opened.
    #[error("Failed to open serial device {device}: {source}")]
    DeviceOpen {
        device: String,
        #[source]
        source: tokio_serial::Error,
    },
    /// The heartbeat-enable command could not be written to the device.
    #[error("Failed to enable heartbeat mode: {0}")]
    HeartbeatEnable(#[source] std::io::Error),
    /// The metrics sink did not respond at construction time.
    #[error("InfluxDB server unreachable at {addr}: {source}")]
    SinkUnreachable {
        addr: url::Url,
        #[source]
        source: influxdb::Error,
    },
}

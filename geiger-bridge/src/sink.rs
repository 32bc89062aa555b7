//! Sample construction and the InfluxDB metrics sink.

use crate::error::BridgeError;
use chrono::{DateTime, Utc};
use influxdb::{Client, InfluxDbWriteable, Timestamp};
use url::Url;

/// Conversion factor from counts per minute to dose rate.
///
/// Specific to the detector tube, treated as a constant.
pub(crate) const DOSE_RATE_FACTOR: f64 = 0.00625;

const DATABASE: &str = "sensors";
const MEASUREMENT: &str = "measurements";
const LOCATION: &str = "Office";

/// One flush interval's measurement. Immutable once constructed and
/// discarded after the write attempt, successful or not.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Sample {
    pub(crate) cpm: u32,
    pub(crate) dose_rate: f64,
    pub(crate) timestamp: DateTime<Utc>,
}

impl Sample {
    /// Derives a sample from the interval's accumulated count total.
    pub(crate) fn new(cpm: u32, timestamp: DateTime<Utc>) -> Self {
        Self {
            cpm,
            dose_rate: f64::from(cpm) * DOSE_RATE_FACTOR,
            timestamp,
        }
    }
}

/// Destination for flush samples.
///
/// Abstracts [MetricsSink] so the control loop can be exercised against a
/// test double.
pub(crate) trait SampleSink {
    async fn write_sample(&self, sample: &Sample) -> Result<(), influxdb::Error>;
}

/// Writes samples to an InfluxDB 1.x server.
pub(crate) struct MetricsSink {
    client: Client,
}

impl MetricsSink {
    /// Creates a client for the server at `addr` and verifies it is
    /// reachable. An unreachable server is a fatal startup error.
    pub(crate) async fn connect(addr: &Url) -> Result<Self, BridgeError> {
        let client = Client::new(addr.as_str(), DATABASE);
        client
            .ping()
            .await
            .map_err(|source| BridgeError::SinkUnreachable {
                addr: addr.clone(),
                source,
            })?;
        Ok(Self { client })
    }
}

impl SampleSink for MetricsSink {
    /// Writes one sample with seconds precision.
    async fn write_sample(&self, sample: &Sample) -> Result<(), influxdb::Error> {
        let seconds = u128::try_from(sample.timestamp.timestamp()).unwrap_or_default();
        let query = Timestamp::Seconds(seconds)
            .into_query(MEASUREMENT)
            .add_tag("location", LOCATION)
            .add_field("geiger_counter_cpm", i64::from(sample.cpm))
            .add_field("geiger_counter_dose_rate", sample.dose_rate);
        self.client.query(query).await?;
        Ok(())
    }
}

//! Names of the Prometheus counters exposed by the bridge.

pub(crate) const FRAMES_RECEIVED: &str = "frames_received";
pub(crate) const READ_FAILURES: &str = "read_failures";
pub(crate) const SAMPLES_FLUSHED: &str = "samples_flushed";
pub(crate) const SINK_WRITE_FAILURES: &str = "sink_write_failures";

/// Registers descriptions for all counters with the installed recorder.
pub(crate) fn describe() {
    metrics::describe_counter!(
        FRAMES_RECEIVED,
        metrics::Unit::Count,
        "Number of event frames decoded from the sensor"
    );
    metrics::describe_counter!(
        READ_FAILURES,
        metrics::Unit::Count,
        "Number of recoverable sensor read errors"
    );
    metrics::describe_counter!(
        SAMPLES_FLUSHED,
        metrics::Unit::Count,
        "Number of samples written to the metrics sink"
    );
    metrics::describe_counter!(
        SINK_WRITE_FAILURES,
        metrics::Unit::Count,
        "Number of failed metrics sink writes"
    );
}

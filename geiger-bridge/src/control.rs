//! The control loop: drains decoded counts into the interval accumulator
//! and flushes one sample to the sink per flush period.

use crate::{
    accumulator::IntervalAccumulator,
    metric_names,
    sink::{Sample, SampleSink},
};
use chrono::Utc;
use metrics::counter;
use std::{future::Future, time::Duration};
use tokio::{select, sync::mpsc::Receiver};
use tracing::{info, warn};

/// Period of the flush timer.
pub(crate) const FLUSH_PERIOD: Duration = Duration::from_secs(60);

/// Runs the event-select loop until `shutdown` completes.
///
/// Each incoming count is added to the accumulator; each flush tick derives
/// a [Sample] and submits it to the sink. When the count channel closes
/// (the reader hit end of stream) the count branch is disabled so the
/// closed channel cannot re-fire, and flushes carry on with whatever was
/// accumulated.
pub(crate) async fn run_control_loop<S: SampleSink>(
    mut counts: Receiver<u16>,
    sink: &S,
    flush_period: Duration,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);

    let mut flush_interval = tokio::time::interval(flush_period);
    // The first tick completes immediately, the flushes start one full
    // period from now.
    flush_interval.tick().await;

    let mut accumulator = IntervalAccumulator::default();
    let mut stream_open = true;

    loop {
        select! {
            () = &mut shutdown => break,
            count = counts.recv(), if stream_open => {
                match count {
                    Some(count) => accumulator.add(count),
                    None => {
                        info!("Count channel closed, flushes continue without new counts");
                        stream_open = false;
                    }
                }
            }
            _ = flush_interval.tick() => {
                flush(&mut accumulator, sink).await;
            }
        }
    }
}

/// Derives the interval's [Sample], writes it to the sink and logs the
/// outcome. The accumulator is reset by [IntervalAccumulator::take] before
/// the write is attempted, so a sink failure drops the sample but never
/// carries counts into the next interval.
async fn flush<S: SampleSink>(accumulator: &mut IntervalAccumulator, sink: &S) {
    let sample = Sample::new(accumulator.take(), Utc::now());
    info!("cpm={}, doseRate={}", sample.cpm, sample.dose_rate);
    match sink.write_sample(&sample).await {
        Ok(()) => {
            counter!(metric_names::SAMPLES_FLUSHED).increment(1);
        }
        Err(e) => {
            warn!("Failed to write sample to the metrics sink: {e}");
            counter!(metric_names::SINK_WRITE_FAILURES).increment(1);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::reader::COUNT_CHANNEL_CAPACITY;
    use std::sync::Mutex;
    use tokio::{sync::mpsc, time::sleep};

    /// Sink double that records every sample and optionally fails each write.
    #[derive(Default)]
    struct RecordingSink {
        written: Mutex<Vec<Sample>>,
        fail_writes: bool,
    }

    impl RecordingSink {
        fn failing() -> Self {
            Self {
                written: Mutex::default(),
                fail_writes: true,
            }
        }
    }

    impl SampleSink for RecordingSink {
        async fn write_sample(&self, sample: &Sample) -> Result<(), influxdb::Error> {
            self.written.lock().expect("sink lock").push(sample.clone());
            if self.fail_writes {
                Err(influxdb::Error::DatabaseError {
                    error: "sink unavailable".to_owned(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn flushes_keep_firing_after_end_of_stream() {
        let (count_send, counts) = mpsc::channel(COUNT_CHANNEL_CAPACITY);
        let sink = RecordingSink::default();

        count_send.send(3).await.unwrap();
        count_send.send(4).await.unwrap();
        // End the stream before the first flush.
        drop(count_send);

        run_control_loop(
            counts,
            &sink,
            Duration::from_millis(100),
            sleep(Duration::from_millis(250)),
        )
        .await;

        // Ticks at 100 ms and 200 ms fired despite the closed channel; the
        // first carries the pre-EOF total, the rest are empty intervals.
        let written = sink.written.lock().expect("sink lock");
        assert_eq!(written.len(), 2);
        assert_eq!(written.first().map(|sample| sample.cpm), Some(7));
        assert!(written.iter().skip(1).all(|sample| sample.cpm == 0));
    }

    #[tokio::test]
    async fn sink_failure_does_not_carry_counts_into_next_interval() {
        let (count_send, counts) = mpsc::channel(COUNT_CHANNEL_CAPACITY);
        let sink = RecordingSink::failing();

        let driver = async move {
            count_send.send(5).await.unwrap();
            sleep(Duration::from_millis(150)).await;
            count_send.send(2).await.unwrap();
        };

        tokio::join!(
            run_control_loop(
                counts,
                &sink,
                Duration::from_millis(100),
                sleep(Duration::from_millis(250)),
            ),
            driver,
        );

        // Both writes failed, yet each interval starts from zero: the
        // totals would read [5, 7] if a failed write skipped the reset.
        let written = sink.written.lock().expect("sink lock");
        let totals: Vec<_> = written.iter().map(|sample| sample.cpm).collect();
        assert_eq!(totals, vec![5, 2]);
    }

    #[tokio::test]
    async fn shutdown_breaks_the_loop_mid_interval() {
        let (count_send, counts) = mpsc::channel(COUNT_CHANNEL_CAPACITY);
        let sink = RecordingSink::default();

        count_send.send(9).await.unwrap();

        // Shut down well before the first flush tick.
        run_control_loop(
            counts,
            &sink,
            Duration::from_millis(500),
            sleep(Duration::from_millis(50)),
        )
        .await;

        assert!(sink.written.lock().expect("sink lock").is_empty());
    }
}

//! Producer loop: reads event frames from the sensor and forwards decoded
//! counts to the control loop.

use crate::{
    frame::{FRAME_SIZE, decode_frame},
    metric_names::{FRAMES_RECEIVED, READ_FAILURES},
    transport::READ_TIMEOUT,
};
use metrics::counter;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::mpsc::Sender,
    time::timeout,
};
use tracing::{debug, info, warn};

/// Capacity of the count handoff channel.
///
/// A deliberate backpressure boundary: at the device's 1 Hz cadence the
/// channel never comes close to filling, but if the control loop stalls the
/// producer blocks on a full channel rather than dropping counts.
pub(crate) const COUNT_CHANNEL_CAPACITY: usize = 128;

/// Reads 2-byte event frames until end of stream and forwards each decoded
/// count through `counts`.
///
/// Returning drops the sender, which closes the channel and signals end of
/// stream to the control loop. A read that produces no data within
/// [READ_TIMEOUT], or fewer bytes than a full frame, produces no count and
/// is retried. Read errors are logged and retried immediately.
pub(crate) async fn run_reader<R>(mut port: R, counts: Sender<u16>)
where
    R: AsyncRead + Unpin + Send,
{
    let mut buf = [0u8; FRAME_SIZE];
    loop {
        let read = match timeout(READ_TIMEOUT, port.read(&mut buf)).await {
            // No data before the read timeout, check the stream again.
            Err(_elapsed) => continue,
            Ok(Err(e)) => {
                warn!("Sensor read error: {e}");
                counter!(READ_FAILURES).increment(1);
                continue;
            }
            Ok(Ok(n)) => n,
        };

        match read {
            0 => {
                info!("Sensor stream ended");
                return;
            }
            n if n < FRAME_SIZE => {
                debug!("Short read of {n} bytes, no count produced");
                continue;
            }
            _ => {}
        }

        let count = decode_frame(buf);
        counter!(FRAMES_RECEIVED).increment(1);
        if counts.send(count).await.is_err() {
            debug!("Count channel closed, stopping reader");
            return;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::SyntheticPort;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn frames_are_decoded_and_forwarded_in_order() {
        let (local, mut remote) = tokio::io::duplex(64);
        let (count_send, mut counts) = tokio::sync::mpsc::channel(COUNT_CHANNEL_CAPACITY);
        tokio::spawn(run_reader(local, count_send));

        remote.write_all(&[0x00, 0x2A]).await.unwrap();
        assert_eq!(counts.recv().await, Some(42));

        remote.write_all(&[0xFF, 0xFF]).await.unwrap();
        assert_eq!(counts.recv().await, Some(0x3FFF));

        drop(remote);
        assert_eq!(counts.recv().await, None);
    }

    #[tokio::test]
    async fn end_of_stream_closes_the_channel() {
        let (local, remote) = tokio::io::duplex(64);
        let (count_send, mut counts) = tokio::sync::mpsc::channel(COUNT_CHANNEL_CAPACITY);
        let handle = tokio::spawn(run_reader(local, count_send));

        drop(remote);
        assert_eq!(counts.recv().await, None);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn short_read_produces_no_count() {
        let (local, mut remote) = tokio::io::duplex(64);
        let (count_send, mut counts) = tokio::sync::mpsc::channel(COUNT_CHANNEL_CAPACITY);
        tokio::spawn(run_reader(local, count_send));

        // A lone byte followed by end of stream must never reach the
        // control loop as a count.
        remote.write_all(&[0x01]).await.unwrap();
        drop(remote);

        assert_eq!(counts.recv().await, None);
    }

    #[tokio::test]
    async fn sixty_synthetic_reads_sum_to_zero() {
        // The synthetic frame 0x8000 masks to zero, so a full interval of
        // synthetic reads accumulates no events.
        let (count_send, mut counts) = tokio::sync::mpsc::channel(COUNT_CHANNEL_CAPACITY);
        tokio::spawn(run_reader(SyntheticPort, count_send));

        let mut total = 0u32;
        for _ in 0..60 {
            let count = counts.recv().await.expect("synthetic stream never ends");
            total += u32::from(count);
        }
        assert_eq!(total, 0);
    }
}

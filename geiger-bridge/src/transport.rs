//! Sensor transport selection, wrapping and the device session handshake.
//!
//! The control loop never branches on which transport is in use: the choice
//! between the real serial port and the synthetic generator is made once at
//! startup and erased behind [DynSensorPort].

use crate::{
    error::BridgeError,
    frame::{FRAME_SIZE, HEARTBEAT_DISABLE, HEARTBEAT_ENABLE},
};
use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf, ReadHalf, WriteHalf};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, warn};

/// Bound on a single sensor read, so the producer loop can re-check stream
/// health even when the device is silent.
pub(crate) const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// The frame reported by [SyntheticPort] on every read.
///
/// Note `0x8000` masks to zero, so the synthetic transport always reports
/// zero events. The mask reflects the real device protocol and is kept
/// exact regardless.
pub(crate) const SYNTHETIC_FRAME: [u8; FRAME_SIZE] = [0x80, 0x00];

/// Any duplex byte stream usable as the sensor link.
///
/// Implemented by `tokio_serial::SerialStream` (real hardware),
/// [SyntheticPort] (no hardware), `tokio::io::DuplexStream` (tests), and
/// any of these wrapped in [RawLoggingPort].
pub(crate) trait SensorPort: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SensorPort for T {}

/// Type-erased sensor port, chosen once at startup.
pub(crate) type DynSensorPort = Box<dyn SensorPort>;

/// Opens the real serial device.
pub(crate) fn open_device(device: &str, baud: u32) -> Result<DynSensorPort, BridgeError> {
    let port = tokio_serial::new(device, baud)
        .timeout(READ_TIMEOUT)
        .open_native_async()
        .map_err(|source| BridgeError::DeviceOpen {
            device: device.to_owned(),
            source,
        })?;
    Ok(Box::new(port))
}

/// Stand-in for the real device, used when no device path is configured.
///
/// Every read yields [SYNTHETIC_FRAME] and every write is accepted and
/// discarded. A read buffer smaller than a frame receives the frame's
/// prefix rather than a spurious end of stream.
#[derive(Debug, Default)]
pub(crate) struct SyntheticPort;

impl AsyncRead for SyntheticPort {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let len = buf.remaining().min(SYNTHETIC_FRAME.len());
        if let Some(chunk) = SYNTHETIC_FRAME.get(..len) {
            buf.put_slice(chunk);
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for SyntheticPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Pass-through wrapper that logs the raw bytes of every read and write
/// without altering data or control flow.
#[derive(Debug)]
pub(crate) struct RawLoggingPort<T> {
    inner: T,
}

impl<T> RawLoggingPort<T> {
    pub(crate) fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for RawLoggingPort<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let filled_before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let read = buf.filled().get(filled_before..).unwrap_or_default();
            debug!("Read {} bytes: {}", read.len(), hex(read));
        }
        poll
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for RawLoggingPort<T> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(written)) = &poll {
            debug!(
                "Wrote {written} bytes: {}",
                hex(buf.get(..*written).unwrap_or(buf))
            );
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// An open device session with heartbeat mode enabled.
///
/// [start] performs the enable handshake and hands the read half of the
/// port to the caller for the producer loop. [close] consumes the session,
/// performing the best-effort disable handshake before releasing the
/// transport. There is no way back to an idle session.
///
/// [start]: DeviceSession::start
/// [close]: DeviceSession::close
pub(crate) struct DeviceSession {
    writer: WriteHalf<DynSensorPort>,
}

impl DeviceSession {
    /// Writes the heartbeat-enable command, after which the device reports
    /// an event count every second.
    pub(crate) async fn start(
        mut port: DynSensorPort,
    ) -> io::Result<(Self, ReadHalf<DynSensorPort>)> {
        port.write_all(HEARTBEAT_ENABLE).await?;
        let (reader, writer) = tokio::io::split(port);
        Ok((Self { writer }, reader))
    }

    /// Writes the heartbeat-disable command and releases the transport.
    ///
    /// Both steps are best-effort: failures are logged and otherwise
    /// ignored, as the process is exiting anyway.
    pub(crate) async fn close(mut self) {
        if let Err(e) = self.writer.write_all(HEARTBEAT_DISABLE).await {
            warn!("Failed to write heartbeat disable command: {e}");
        }
        if let Err(e) = self.writer.shutdown().await {
            debug!("Transport shutdown failed: {e}");
        }
    }
}

//! # PACE Transport
//!
//! One request in flight at a time over a single half-duplex line. Every
//! [`PaceTransport::send`]:
//!
//! 1. waits until the request throttle has elapsed since the previous exchange
//!    completed,
//! 2. discards any stale input; after a timeout the line must also stay quiet
//!    for one response timeout, so a late answer cannot pass as the next one,
//! 3. asserts flow control, writes and flushes the frame, deasserts flow control,
//! 4. reads until EOI with an inactivity timeout that restarts on every byte,
//! 5. decodes the frame with the device's [`FrameCodec`].

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::{sleep_until, timeout, Instant};

use crate::constants::{
    PACE_DEFAULT_REQUEST_THROTTLE, PACE_DEFAULT_RESPONSE_TIMEOUT, PACE_EOI, PACE_MAX_FRAME_LEN,
    PACE_SOI,
};
use crate::error::{DecodeError, TransportError};
use crate::pace::frame::{FrameCodec, Response};
use crate::pace::identity::DeviceIdentity;
use crate::pace::request::Request;
use crate::pace::serial::{FlowControl, SerialLine};
use crate::util::hex::format_frame_ascii;
use crate::util::logging::{log_frame, LogThrottle};

/// Timing of the request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Minimum gap between the end of one exchange and the next transmit
    pub request_throttle: Duration,
    /// Maximum silence while waiting for (the rest of) a response
    pub response_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            request_throttle: PACE_DEFAULT_REQUEST_THROTTLE,
            response_timeout: PACE_DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

struct Line<P> {
    port: P,
    flow_control: FlowControl,
    last_completed: Option<Instant>,
    awaiting_late_reply: bool,
    stale_warnings: LogThrottle,
}

/// Owns the serial line to one addressed BMS.
pub struct PaceTransport<P> {
    codec: FrameCodec,
    config: TransportConfig,
    line: Mutex<Line<P>>,
}

impl<P: SerialLine> PaceTransport<P> {
    pub fn new(port: P, identity: &DeviceIdentity, config: TransportConfig) -> Self {
        PaceTransport {
            codec: FrameCodec::new(identity),
            config,
            line: Mutex::new(Line {
                port,
                flow_control: FlowControl::Disabled,
                last_completed: None,
                awaiting_late_reply: false,
                stale_warnings: LogThrottle::new(60_000, 5),
            }),
        }
    }

    /// Drives `flow_control` around every transmit.
    pub fn with_flow_control(mut self, flow_control: FlowControl) -> Self {
        self.line.get_mut().flow_control = flow_control;
        self
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Sends `request` and waits for its decoded response.
    ///
    /// Fails with [`TransportError::ChannelBusy`] if another request owns the line.
    pub async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let profile = self.codec.profile();
        if !profile.supports(request) {
            return Err(TransportError::Unsupported {
                request: request.name(),
                command_set: profile.command_set,
            });
        }
        let frame = self.codec.encode(request, self.codec.address())?;

        let mut line = self.line.try_lock().map_err(|_| TransportError::ChannelBusy)?;
        if let Some(last) = line.last_completed {
            sleep_until(last + self.config.request_throttle).await;
        }

        debug!("Sending {} request", request.name());
        let result = self.exchange(&mut line, &frame).await;
        line.last_completed = Some(Instant::now());
        line.awaiting_late_reply = matches!(result, Err(TransportError::Timeout(_)));

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                debug!("{} request failed: {e}", request.name());
                return Err(e);
            }
        };
        Ok(self.codec.decode(&raw)?)
    }

    async fn exchange(&self, line: &mut Line<P>, frame: &[u8]) -> Result<Bytes, TransportError> {
        let quiet = if line.awaiting_late_reply {
            self.config.response_timeout
        } else {
            Duration::ZERO
        };
        line.discard_stale_input(quiet).await?;

        let Line {
            port, flow_control, ..
        } = line;
        log_frame("TX", frame);
        let written = match flow_control.drive(port, true).await {
            Ok(()) => write_frame(port, frame).await,
            Err(e) => Err(e),
        };
        let released = flow_control.drive(port, false).await;
        written?;
        released?;

        let raw = read_frame(port, self.config.response_timeout).await?;
        log_frame("RX", &raw);
        Ok(raw)
    }
}

async fn write_frame<P: SerialLine>(port: &mut P, frame: &[u8]) -> std::io::Result<()> {
    port.write_all(frame).await?;
    port.flush().await
}

/// Reads one frame. The timeout restarts whenever bytes arrive.
async fn read_frame<P: SerialLine>(
    port: &mut P,
    response_timeout: Duration,
) -> Result<Bytes, TransportError> {
    let mut frame = BytesMut::with_capacity(128);
    let mut chunk = [0u8; 64];
    loop {
        let n = match timeout(response_timeout, port.read(&mut chunk)).await {
            Ok(read) => read?,
            Err(_) => {
                if frame.is_empty() {
                    warn!("Response timeout after {response_timeout:?}, no data received");
                } else {
                    warn!(
                        "Response timeout after {response_timeout:?}, partial frame: {}",
                        format_frame_ascii(&frame)
                    );
                }
                return Err(TransportError::Timeout(response_timeout));
            }
        };
        if n == 0 {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "serial line closed",
            )));
        }

        for (i, &byte) in chunk[..n].iter().enumerate() {
            if frame.is_empty() && byte != PACE_SOI {
                return Err(DecodeError::Malformed(format!(
                    "response does not begin with '~', got 0x{byte:02X}"
                ))
                .into());
            }
            frame.put_u8(byte);
            if byte == PACE_EOI {
                let trailing = n - i - 1;
                if trailing > 0 {
                    warn!("Dropped {trailing} bytes received after EOI");
                }
                return Ok(frame.freeze());
            }
            if frame.len() >= PACE_MAX_FRAME_LEN {
                return Err(DecodeError::Malformed(format!(
                    "response exceeds {PACE_MAX_FRAME_LEN} bytes without EOI"
                ))
                .into());
            }
        }
    }
}

impl<P: SerialLine> Line<P> {
    /// Drops buffered input until the line has been silent for `quiet`.
    ///
    /// A zero `quiet` only drops what is already buffered.
    async fn discard_stale_input(&mut self, quiet: Duration) -> Result<(), TransportError> {
        let mut scratch = [0u8; 64];
        let mut discarded = 0usize;
        loop {
            match timeout(quiet, self.port.read(&mut scratch)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => discarded += n,
                Ok(Err(e)) => return Err(e.into()),
            }
        }
        if discarded > 0 && self.stale_warnings.allow() {
            warn!("Discarded {discarded} bytes received while no request was active");
        }
        Ok(())
    }
}

//! Simulated PACE BMS for testing
//!
//! [`MockPaceBms`] sits on one end of an in-memory duplex pipe and answers
//! requests the way a pack would: it decodes each request frame, records when it
//! arrived and replies with a scripted frame, optionally after a delay, or stays
//! silent. The other end of the pipe is handed to a
//! [`PaceTransport`](crate::pace::PaceTransport).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::Instant;

use crate::constants::{PACE_EOI, PACE_MAX_FRAME_LEN, PACE_RTN_OK};
use crate::error::DecodeError;
use crate::pace::frame::FrameCodec;
use crate::pace::identity::DeviceIdentity;
use crate::pace::request::Request;

/// What the simulator does when it receives a given command.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Write `frame` after `delay`
    Frame { frame: Bytes, delay: Duration },
    /// Never answer
    Silent,
}

/// A request the simulator decoded, with its arrival time.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedRequest {
    pub at: Instant,
    pub request: Request,
}

#[derive(Default)]
struct MockState {
    replies: HashMap<u8, MockReply>,
    received: Vec<ReceivedRequest>,
    rejected: usize,
}

/// Scriptable device simulator.
#[derive(Clone)]
pub struct MockPaceBms {
    codec: FrameCodec,
    state: Arc<Mutex<MockState>>,
}

impl MockPaceBms {
    pub fn new(identity: &DeviceIdentity) -> Self {
        MockPaceBms {
            codec: FrameCodec::new(identity),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Answers `cid2` with a raw frame.
    pub fn reply(&self, cid2: u8, frame: impl Into<Bytes>) {
        self.reply_after(cid2, Duration::ZERO, frame);
    }

    /// Answers `cid2` with a raw frame after `delay`.
    pub fn reply_after(&self, cid2: u8, delay: Duration, frame: impl Into<Bytes>) {
        self.state().replies.insert(
            cid2,
            MockReply::Frame {
                frame: frame.into(),
                delay,
            },
        );
    }

    /// Answers `cid2` with a success frame carrying `info`.
    pub fn reply_info(&self, cid2: u8, info: &[u8]) -> Result<(), DecodeError> {
        let frame = self
            .codec
            .encode_response(self.codec.address(), PACE_RTN_OK, info)?;
        self.reply(cid2, frame);
        Ok(())
    }

    /// Answers `cid2` with an error return code.
    pub fn reply_error(&self, cid2: u8, return_code: u8) -> Result<(), DecodeError> {
        let frame = self
            .codec
            .encode_response(self.codec.address(), return_code, &[])?;
        self.reply(cid2, frame);
        Ok(())
    }

    pub fn silence(&self, cid2: u8) {
        self.state().replies.insert(cid2, MockReply::Silent);
    }

    /// Requests decoded so far, in arrival order.
    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.state().received.clone()
    }

    /// Frames that arrived but could not be decoded as a request for this device.
    pub fn rejected(&self) -> usize {
        self.state().rejected
    }

    /// Spawns the device task and returns the host end of the line.
    pub fn attach(&self) -> DuplexStream {
        let (host, device) = tokio::io::duplex(1024);
        let mock = self.clone();
        tokio::spawn(async move { mock.serve(device).await });
        host
    }

    async fn serve(self, mut line: DuplexStream) {
        let mut frame = BytesMut::with_capacity(64);
        let mut chunk = [0u8; 64];
        loop {
            let n = match line.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            for &byte in &chunk[..n] {
                frame.put_u8(byte);
                if byte != PACE_EOI && frame.len() < PACE_MAX_FRAME_LEN {
                    continue;
                }
                let request = frame.split().freeze();
                if let Some((reply, delay)) = self.handle(&request) {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if line.write_all(&reply).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    fn handle(&self, frame: &[u8]) -> Option<(Bytes, Duration)> {
        let request = match self.codec.decode_request(frame) {
            Ok(request) => request,
            Err(e) => {
                log::debug!("Simulator ignoring frame: {e}");
                self.state().rejected += 1;
                return None;
            }
        };
        let cid2 = request.cid2();
        let mut state = self.state();
        state.received.push(ReceivedRequest {
            at: Instant::now(),
            request,
        });
        match state.replies.get(&cid2) {
            Some(MockReply::Frame { frame, delay }) => Some((frame.clone(), *delay)),
            Some(MockReply::Silent) | None => None,
        }
    }
}

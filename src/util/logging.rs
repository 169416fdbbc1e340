//! # Logging Utilities
//!
//! Rate limiting for log lines that can repeat on every request, and a frame dump
//! helper used by the transport.
//!
//! ```rust
//! use pace_bms_rs::util::logging::LogThrottle;
//!
//! let mut throttle = LogThrottle::new(1000, 2);
//! assert!(throttle.allow());
//! assert!(throttle.allow());
//! assert!(!throttle.allow());
//! ```

use std::time::Instant;

use crate::util::hex::format_frame_ascii;

/// Allows at most `cap` messages per `window_ms`.
#[derive(Debug)]
pub struct LogThrottle {
    window_ms: u64,
    cap: u32,
    count: u32,
    t0: Instant,
}

impl LogThrottle {
    pub fn new(window_ms: u64, cap: u32) -> Self {
        Self {
            window_ms,
            cap,
            count: 0,
            t0: Instant::now(),
        }
    }

    /// Returns `true` if the message should be logged. Resets after the window expires.
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.t0).as_millis() as u64 > self.window_ms {
            self.t0 = now;
            self.count = 0;
        }
        self.count += 1;
        self.count <= self.cap
    }

    /// Messages suppressed in the current window.
    pub fn suppressed(&self) -> u32 {
        self.count.saturating_sub(self.cap)
    }
}

/// Logs a raw PACE frame at trace level.
pub fn log_frame(direction: &str, frame: &[u8]) {
    if log::log_enabled!(target: "pace_bms::frame", log::Level::Trace) {
        log::trace!(
            target: "pace_bms::frame",
            "{direction} {} bytes: {}",
            frame.len(),
            format_frame_ascii(frame)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_throttle_caps_messages() {
        let mut throttle = LogThrottle::new(60_000, 3);
        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(!throttle.allow());
        assert!(!throttle.allow());
        assert_eq!(throttle.suppressed(), 2);
    }

    #[test]
    fn test_log_throttle_window_expires() {
        let mut throttle = LogThrottle::new(0, 1);
        assert!(throttle.allow());
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(throttle.allow());
    }
}

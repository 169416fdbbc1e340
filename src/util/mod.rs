//! # Utility Modules
//!
//! ASCII hex field parsing and logging helpers shared by the codec and transport.

pub mod hex;
pub mod logging;

pub use hex::{encode_hex_upper, format_frame_ascii, hex_u16, hex_u8};
pub use logging::{log_frame, LogThrottle};

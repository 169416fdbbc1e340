//! Small payloads: identification strings, the system clock and write acknowledgements.

use chrono::NaiveDateTime;

use crate::error::DecodeError;
use crate::pace::request::{decode_datetime, SwitchCommand};

/// Hardware version (0xC1) and serial number (0xC2) are space/NUL padded ASCII.
pub fn decode_device_text(info: &[u8]) -> String {
    String::from_utf8_lossy(info)
        .trim_end_matches([' ', '\0'])
        .to_string()
}

/// System date/time (0xB1): `yy mm dd hh mi ss`, year offset 2000.
pub fn decode_system_datetime(info: &[u8]) -> Result<NaiveDateTime, DecodeError> {
    decode_datetime(info)
}

/// A switch command response echoes the switch code as its first byte.
pub fn verify_switch_ack(info: &[u8], switch: SwitchCommand) -> Result<(), DecodeError> {
    match info.first() {
        Some(&code) if code == switch.code() => Ok(()),
        Some(&code) => Err(DecodeError::Malformed(format!(
            "switch acknowledgement 0x{code:02X} does not match command 0x{:02X}",
            switch.code()
        ))),
        None => Err(DecodeError::Truncated {
            expected: 1,
            actual: 0,
        }),
    }
}

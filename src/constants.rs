//! PACE BMS Protocol Constants
//!
//! This module defines the constants used by the PACE BMS serial protocol: frame
//! markers, command codes (CID2), default chemistry (CID1), configuration
//! defaults and documented device return codes.

use std::time::Duration;

// ----------------------------------------------------------------------------
// Frame layout
// ----------------------------------------------------------------------------

/// Start-of-information marker
pub const PACE_SOI: u8 = b'~';

/// End-of-information marker
pub const PACE_EOI: u8 = b'\r';

/// Size of a frame with an empty INFO field: SOI + 12 header chars + 4 checksum chars + EOI
pub const PACE_FRAME_OVERHEAD: usize = 18;

/// Largest INFO length expressible in the 12-bit LENID field
pub const PACE_MAX_INFO_LEN: usize = 0x0FFF;

/// Receive buffer limit; responses longer than this are abandoned
pub const PACE_MAX_FRAME_LEN: usize = 512;

// ----------------------------------------------------------------------------
// Device identity
// ----------------------------------------------------------------------------

/// CID1 for lithium iron phosphate packs, used unless a chemistry is configured
pub const PACE_CID1_LITHIUM_IRON: u8 = 0x46;

/// Lowest and highest supported protocol command sets
pub const PACE_COMMANDSET_MIN: u8 = 0x20;
pub const PACE_COMMANDSET_MAX: u8 = 0x25;

/// Highest bus address a PACE pack can be dialled to
pub const PACE_ADDRESS_MAX: u8 = 15;

// ----------------------------------------------------------------------------
// Command codes (CID2)
// ----------------------------------------------------------------------------

pub const PACE_CID2_READ_ANALOG_INFORMATION: u8 = 0x42;
pub const PACE_CID2_READ_STATUS_INFORMATION: u8 = 0x44;
pub const PACE_CID2_WRITE_SWITCH_COMMAND: u8 = 0x99;
pub const PACE_CID2_WRITE_CHARGE_MOSFET: u8 = 0x9A;
pub const PACE_CID2_WRITE_DISCHARGE_MOSFET: u8 = 0x9B;
pub const PACE_CID2_WRITE_SHUTDOWN: u8 = 0x9C;
pub const PACE_CID2_READ_SYSTEM_DATETIME: u8 = 0xB1;
pub const PACE_CID2_WRITE_SYSTEM_DATETIME: u8 = 0xB2;
pub const PACE_CID2_READ_HARDWARE_VERSION: u8 = 0xC1;
pub const PACE_CID2_READ_SERIAL_NUMBER: u8 = 0xC2;
pub const PACE_CID2_READ_REMAINING_CAPACITY: u8 = 0xA6;
pub const PACE_CID2_READ_PROTOCOLS: u8 = 0xEB;
pub const PACE_CID2_WRITE_PROTOCOLS: u8 = 0xEC;

/// INFO byte sent with the shutdown command (the pack reboots)
pub const PACE_SHUTDOWN_PAYLOAD: u8 = 0x01;

// ----------------------------------------------------------------------------
// Analog encoding
// ----------------------------------------------------------------------------

/// Temperatures are reported in tenths of a Kelvin with this offset
pub const PACE_TEMPERATURE_OFFSET: i32 = 2730;

/// Year offset of the system clock
pub const PACE_YEAR_OFFSET: i32 = 2000;

/// Highest cell/temperature index exposed as a sensor
pub const PACE_MAX_CELLS: u8 = 16;
pub const PACE_MAX_TEMPERATURES: u8 = 6;

// ----------------------------------------------------------------------------
// Serial and timing defaults
// ----------------------------------------------------------------------------

pub const PACE_BAUD_RATE: u32 = 9600;
pub const PACE_DEFAULT_ADDRESS: u8 = 1;
pub const PACE_DEFAULT_COMMANDSET: u8 = 0x25;
pub const PACE_DEFAULT_REQUEST_THROTTLE: Duration = Duration::from_millis(50);
pub const PACE_DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(200);
pub const PACE_DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

// ----------------------------------------------------------------------------
// Return codes (RTN)
// ----------------------------------------------------------------------------

pub const PACE_RTN_OK: u8 = 0x00;

/// Human-readable text for a device return code.
pub fn describe_return_code(code: u8) -> &'static str {
    match code {
        0x00 => "OK",
        0x01 => "Version Error",
        0x02 => "CKSUM Error (full request checksum)",
        0x03 => "LCKSUM Error (checksum of embedded payload length value)",
        0x04 => "CID2 Undefined (unknown command)",
        0x05 => "Command Format Error",
        0x06 => "Invalid Data",
        0x07 => "No Data (historical record)",
        0x09 => "Operation or Write Error",
        0x90 => "ADR Error",
        0x91 => "Communication Error",
        0xE1 => "CID1 Error (battery chemistry)",
        0xE2 => "Command Execution Failed",
        0xE3 => "Equipment Failure",
        0xE4 => "Invalid Permission",
        _ => "Undocumented Response Error Code",
    }
}

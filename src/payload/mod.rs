//! The payload module contains the decoders for the INFO field of each PACE
//! response, plus the conversion of decoded values into published measurements.

pub mod analog;
pub mod configuration;
pub mod info;
pub mod status;

pub use analog::AnalogInformation;
pub use configuration::{
    CapacityInformation, CellBalancing, ChargeCurrentLimiter, Configuration, ConfigurationKind,
    CurrentProtection, FastCurrentProtection, FullChargeLowCharge, Protocols,
    ShortCircuitProtection, Sleep, TemperatureProtection, VoltageProtection,
};
pub use info::{decode_device_text, decode_system_datetime, verify_switch_ack};
pub use status::{
    ConfigurationStatus, FaultStatus, ProtectionStatus1, ProtectionStatus2, StatusInformation,
    SystemStatus, WarningStatus1, WarningStatus2,
};

use nom::error::ErrorKind;

use crate::constants::PACE_TEMPERATURE_OFFSET;
use crate::error::DecodeError;

/// Tenths of a Kelvin on the wire to tenths of a degree Celsius.
pub(crate) fn decode_temperature(raw: u16) -> Option<i16> {
    i16::try_from(raw as i32 - PACE_TEMPERATURE_OFFSET).ok()
}

pub(crate) fn encode_temperature(dc: i16) -> Option<u16> {
    u16::try_from(dc as i32 + PACE_TEMPERATURE_OFFSET).ok()
}

/// Maps a `nom` failure inside a payload to a [`DecodeError`].
pub(crate) fn payload_error(
    payload: &'static str,
) -> impl Fn(nom::Err<nom::error::Error<&[u8]>>) -> DecodeError {
    move |err| match err {
        nom::Err::Incomplete(_) => DecodeError::Malformed(format!("{payload} is incomplete")),
        nom::Err::Error(e) | nom::Err::Failure(e)
            if matches!(e.code, ErrorKind::MapOpt | ErrorKind::Verify) =>
        {
            DecodeError::Malformed(format!("{payload} contains an out-of-range value"))
        }
        nom::Err::Error(e) | nom::Err::Failure(e) => DecodeError::Malformed(format!(
            "{payload} ended early ({} bytes left, {:?})",
            e.input.len(),
            e.code
        )),
    }
}

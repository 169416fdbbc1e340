//! PACE request catalogue.
//!
//! Every request knows its CID2 opcode and how to serialise its INFO bytes.
//! Configuration groups carry their own opcodes, see
//! [`ConfigurationKind`](crate::payload::ConfigurationKind). The
//! reverse mapping, [`Request::from_parts`], is used by the device simulator to
//! understand what it was asked.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::constants::*;
use crate::error::DecodeError;
use crate::payload::{Configuration, ConfigurationKind, Protocols};

/// Toggles carried by the 0x99 write switch command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchCommand {
    BuzzerOn,
    BuzzerOff,
    LedOn,
    LedOff,
    ChargeCurrentLimiterOn,
    ChargeCurrentLimiterOff,
    ChargeCurrentLimiterGearHigh,
    ChargeCurrentLimiterGearLow,
}

impl SwitchCommand {
    pub const ALL: [SwitchCommand; 8] = [
        SwitchCommand::BuzzerOn,
        SwitchCommand::BuzzerOff,
        SwitchCommand::LedOn,
        SwitchCommand::LedOff,
        SwitchCommand::ChargeCurrentLimiterOn,
        SwitchCommand::ChargeCurrentLimiterOff,
        SwitchCommand::ChargeCurrentLimiterGearHigh,
        SwitchCommand::ChargeCurrentLimiterGearLow,
    ];

    pub fn code(self) -> u8 {
        match self {
            SwitchCommand::LedOn => 0x06,
            SwitchCommand::LedOff => 0x07,
            SwitchCommand::ChargeCurrentLimiterGearHigh => 0x08,
            SwitchCommand::ChargeCurrentLimiterGearLow => 0x09,
            SwitchCommand::ChargeCurrentLimiterOn => 0x0A,
            SwitchCommand::ChargeCurrentLimiterOff => 0x0B,
            SwitchCommand::BuzzerOff => 0x0C,
            SwitchCommand::BuzzerOn => 0x0D,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MosfetType {
    Charge,
    Discharge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MosfetState {
    Open,
    Close,
}

impl MosfetState {
    fn code(self) -> u8 {
        match self {
            MosfetState::Open => 0x00,
            MosfetState::Close => 0x01,
        }
    }
}

/// A request the crate knows how to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ReadAnalogInformation,
    ReadStatusInformation,
    ReadHardwareVersion,
    ReadSerialNumber,
    ReadSystemDateTime,
    WriteSystemDateTime(NaiveDateTime),
    WriteSwitch(SwitchCommand),
    WriteMosfet {
        mosfet: MosfetType,
        state: MosfetState,
    },
    Shutdown,
    ReadRemainingCapacity,
    ReadConfiguration(ConfigurationKind),
    WriteConfiguration(Configuration),
    ReadProtocols,
    WriteProtocols(Protocols),
}

impl Request {
    /// Command opcode placed in the CID2 field.
    pub fn cid2(&self) -> u8 {
        match self {
            Request::ReadAnalogInformation => PACE_CID2_READ_ANALOG_INFORMATION,
            Request::ReadStatusInformation => PACE_CID2_READ_STATUS_INFORMATION,
            Request::ReadHardwareVersion => PACE_CID2_READ_HARDWARE_VERSION,
            Request::ReadSerialNumber => PACE_CID2_READ_SERIAL_NUMBER,
            Request::ReadSystemDateTime => PACE_CID2_READ_SYSTEM_DATETIME,
            Request::WriteSystemDateTime(_) => PACE_CID2_WRITE_SYSTEM_DATETIME,
            Request::WriteSwitch(_) => PACE_CID2_WRITE_SWITCH_COMMAND,
            Request::WriteMosfet {
                mosfet: MosfetType::Charge,
                ..
            } => PACE_CID2_WRITE_CHARGE_MOSFET,
            Request::WriteMosfet {
                mosfet: MosfetType::Discharge,
                ..
            } => PACE_CID2_WRITE_DISCHARGE_MOSFET,
            Request::Shutdown => PACE_CID2_WRITE_SHUTDOWN,
            Request::ReadRemainingCapacity => PACE_CID2_READ_REMAINING_CAPACITY,
            Request::ReadConfiguration(kind) => kind.read_cid2(),
            Request::WriteConfiguration(config) => config.kind().write_cid2(),
            Request::ReadProtocols => PACE_CID2_READ_PROTOCOLS,
            Request::WriteProtocols(_) => PACE_CID2_WRITE_PROTOCOLS,
        }
    }

    /// Short name used in log lines and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Request::ReadAnalogInformation => "read analog information",
            Request::ReadStatusInformation => "read status information",
            Request::ReadHardwareVersion => "read hardware version",
            Request::ReadSerialNumber => "read serial number",
            Request::ReadSystemDateTime => "read system date/time",
            Request::WriteSystemDateTime(_) => "write system date/time",
            Request::WriteSwitch(_) => "write switch command",
            Request::WriteMosfet {
                mosfet: MosfetType::Charge,
                ..
            } => "write charge MOSFET",
            Request::WriteMosfet {
                mosfet: MosfetType::Discharge,
                ..
            } => "write discharge MOSFET",
            Request::Shutdown => "shutdown",
            Request::ReadRemainingCapacity => "read remaining capacity",
            Request::ReadConfiguration(_) => "read configuration",
            Request::WriteConfiguration(_) => "write configuration",
            Request::ReadProtocols => "read protocols",
            Request::WriteProtocols(_) => "write protocols",
        }
    }

    /// True for commands that change device state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Request::WriteSystemDateTime(_)
                | Request::WriteSwitch(_)
                | Request::WriteMosfet { .. }
                | Request::Shutdown
                | Request::WriteConfiguration(_)
                | Request::WriteProtocols(_)
        )
    }

    /// Binary INFO bytes (before hex encoding).
    pub fn payload(&self, address: u8) -> Result<Vec<u8>, DecodeError> {
        let info = match self {
            Request::ReadAnalogInformation | Request::ReadStatusInformation => vec![address],
            Request::ReadHardwareVersion
            | Request::ReadSerialNumber
            | Request::ReadSystemDateTime
            | Request::ReadRemainingCapacity
            | Request::ReadConfiguration(_)
            | Request::ReadProtocols => Vec::new(),
            Request::WriteSystemDateTime(dt) => encode_datetime(dt)?,
            Request::WriteSwitch(switch) => vec![switch.code()],
            Request::WriteMosfet { state, .. } => vec![state.code()],
            Request::Shutdown => vec![PACE_SHUTDOWN_PAYLOAD],
            Request::WriteConfiguration(config) => config.payload()?,
            Request::WriteProtocols(protocols) => protocols.payload(),
        };
        Ok(info)
    }

    /// Rebuilds a request from its opcode and INFO bytes.
    pub fn from_parts(cid2: u8, info: &[u8]) -> Result<Self, DecodeError> {
        let request = match cid2 {
            PACE_CID2_READ_ANALOG_INFORMATION => Request::ReadAnalogInformation,
            PACE_CID2_READ_STATUS_INFORMATION => Request::ReadStatusInformation,
            PACE_CID2_READ_HARDWARE_VERSION => Request::ReadHardwareVersion,
            PACE_CID2_READ_SERIAL_NUMBER => Request::ReadSerialNumber,
            PACE_CID2_READ_SYSTEM_DATETIME => Request::ReadSystemDateTime,
            PACE_CID2_WRITE_SYSTEM_DATETIME => {
                Request::WriteSystemDateTime(decode_datetime(info)?)
            }
            PACE_CID2_WRITE_SWITCH_COMMAND => {
                let code = single_byte(info)?;
                let switch = SwitchCommand::from_code(code).ok_or_else(|| {
                    DecodeError::Malformed(format!("unknown switch code 0x{code:02X}"))
                })?;
                Request::WriteSwitch(switch)
            }
            PACE_CID2_WRITE_CHARGE_MOSFET | PACE_CID2_WRITE_DISCHARGE_MOSFET => {
                let mosfet = if cid2 == PACE_CID2_WRITE_CHARGE_MOSFET {
                    MosfetType::Charge
                } else {
                    MosfetType::Discharge
                };
                let state = match single_byte(info)? {
                    0x00 => MosfetState::Open,
                    0x01 => MosfetState::Close,
                    other => {
                        return Err(DecodeError::Malformed(format!(
                            "unknown MOSFET state 0x{other:02X}"
                        )))
                    }
                };
                Request::WriteMosfet { mosfet, state }
            }
            PACE_CID2_WRITE_SHUTDOWN => Request::Shutdown,
            PACE_CID2_READ_REMAINING_CAPACITY => Request::ReadRemainingCapacity,
            PACE_CID2_READ_PROTOCOLS => Request::ReadProtocols,
            PACE_CID2_WRITE_PROTOCOLS => Request::WriteProtocols(Protocols::decode(info)?),
            other => {
                if let Some(kind) = ConfigurationKind::from_read_cid2(other) {
                    Request::ReadConfiguration(kind)
                } else if let Some(kind) = ConfigurationKind::from_write_cid2(other) {
                    Request::WriteConfiguration(Configuration::decode(kind, info)?)
                } else {
                    return Err(DecodeError::Malformed(format!(
                        "unknown command 0x{other:02X}"
                    )));
                }
            }
        };
        Ok(request)
    }
}

fn single_byte(info: &[u8]) -> Result<u8, DecodeError> {
    match info {
        [byte] => Ok(*byte),
        _ => Err(DecodeError::Malformed(format!(
            "expected 1 payload byte, got {}",
            info.len()
        ))),
    }
}

/// Encodes the six-byte `yy mm dd hh mi ss` clock layout. The pack only
/// counts years 2000 to 2255.
fn encode_datetime(dt: &NaiveDateTime) -> Result<Vec<u8>, DecodeError> {
    let year = u8::try_from(dt.year() - PACE_YEAR_OFFSET).map_err(|_| {
        DecodeError::OutOfRange(format!(
            "year {} outside {}..={}",
            dt.year(),
            PACE_YEAR_OFFSET,
            PACE_YEAR_OFFSET + 255
        ))
    })?;
    Ok(vec![
        year,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
    ])
}

/// Decodes the six-byte `yy mm dd hh mi ss` clock layout.
pub(crate) fn decode_datetime(info: &[u8]) -> Result<NaiveDateTime, DecodeError> {
    let [yy, mo, dd, hh, mi, ss] = match info {
        [a, b, c, d, e, f, ..] => [*a, *b, *c, *d, *e, *f],
        _ => {
            return Err(DecodeError::Truncated {
                expected: 6,
                actual: info.len(),
            })
        }
    };
    NaiveDate::from_ymd_opt(PACE_YEAR_OFFSET + yy as i32, mo as u32, dd as u32)
        .and_then(|date| date.and_hms_opt(hh as u32, mi as u32, ss as u32))
        .ok_or_else(|| {
            DecodeError::Malformed(format!(
                "invalid date/time {yy:02}-{mo:02}-{dd:02} {hh:02}:{mi:02}:{ss:02}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_codes_are_unique() {
        for switch in SwitchCommand::ALL {
            assert_eq!(SwitchCommand::from_code(switch.code()), Some(switch));
        }
        assert_eq!(SwitchCommand::from_code(0x00), None);
    }

    #[test]
    fn test_datetime_payload() {
        let dt = NaiveDate::from_ymd_opt(2024, 8, 20)
            .unwrap()
            .and_hms_opt(14, 15, 37)
            .unwrap();
        let payload = Request::WriteSystemDateTime(dt).payload(0).unwrap();
        assert_eq!(payload, vec![0x18, 0x08, 0x14, 0x0E, 0x0F, 0x25]);
        assert_eq!(decode_datetime(&payload).unwrap(), dt);
    }

    #[test]
    fn test_datetime_outside_pack_years_is_rejected() {
        for year in [1999, 2256] {
            let dt = NaiveDate::from_ymd_opt(year, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap();
            assert!(matches!(
                Request::WriteSystemDateTime(dt).payload(0),
                Err(DecodeError::OutOfRange(_))
            ));
        }
        let last = NaiveDate::from_ymd_opt(2255, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        assert_eq!(
            Request::WriteSystemDateTime(last).payload(0).unwrap()[0],
            0xFF
        );
    }

    #[test]
    fn test_datetime_rejects_impossible_dates() {
        assert!(matches!(
            decode_datetime(&[0x18, 13, 1, 0, 0, 0]),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode_datetime(&[0x18, 1]),
            Err(DecodeError::Truncated { expected: 6, actual: 2 })
        ));
    }

    #[test]
    fn test_mosfet_opcodes() {
        let charge = Request::WriteMosfet {
            mosfet: MosfetType::Charge,
            state: MosfetState::Open,
        };
        assert_eq!(charge.cid2(), 0x9A);
        assert_eq!(charge.payload(0).unwrap(), vec![0x00]);
        let discharge = Request::WriteMosfet {
            mosfet: MosfetType::Discharge,
            state: MosfetState::Close,
        };
        assert_eq!(discharge.cid2(), 0x9B);
        assert_eq!(discharge.payload(0).unwrap(), vec![0x01]);
        assert!(discharge.is_write());
        assert!(!Request::ReadSerialNumber.is_write());
    }

    #[test]
    fn test_configuration_requests_use_group_opcodes() {
        let read = Request::ReadConfiguration(ConfigurationKind::Sleep);
        assert_eq!(read.cid2(), 0xA0);
        assert!(!read.is_write());
        assert_eq!(Request::from_parts(0xA0, &[]).unwrap(), read);

        let write = Request::WriteConfiguration(Configuration::ShortCircuitProtection(
            crate::payload::ShortCircuitProtection { delay_us: 300 },
        ));
        assert_eq!(write.cid2(), 0xE4);
        assert!(write.is_write());
        assert_eq!(write.payload(0).unwrap(), vec![0x0C]);
        assert_eq!(Request::from_parts(0xE4, &[0x0C]).unwrap(), write);
    }

    #[test]
    fn test_from_parts_rejects_unknown_command() {
        assert!(Request::from_parts(0x10, &[]).is_err());
        assert!(Request::from_parts(PACE_CID2_WRITE_SWITCH_COMMAND, &[0x42]).is_err());
        assert!(Request::from_parts(PACE_CID2_WRITE_CHARGE_MOSFET, &[]).is_err());
    }
}

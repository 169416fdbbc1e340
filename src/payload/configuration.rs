//! # Protection and System Configuration
//!
//! Each configuration group is read and written with its own CID2 pair. A read
//! response carries the same INFO layout that is written back, with two quirks:
//!
//! - discharge slow over-current thresholds are reported as negative amps but
//!   written as positive amps,
//! - the discharge fast over-current response appends three bytes that are not
//!   part of the written layout.
//!
//! Values are kept in the integer units the pack stores (mV, mA, A, tenths of a
//! degree Celsius). Delays are exposed in real time units and must be a whole
//! number of the group's step size when written.

use nom::number::complete::{be_i16, be_u16, be_u8};
use nom::IResult;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::payload::{decode_temperature, encode_temperature, payload_error};

/// The configuration groups a pack exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationKind {
    CellOverVoltage,
    PackOverVoltage,
    CellUnderVoltage,
    PackUnderVoltage,
    ChargeOverCurrent,
    DischargeSlowOverCurrent,
    DischargeFastOverCurrent,
    ShortCircuitProtection,
    CellBalancing,
    Sleep,
    FullChargeLowCharge,
    ChargeAndDischargeOverTemperature,
    ChargeAndDischargeUnderTemperature,
    ChargeCurrentLimiterStartCurrent,
}

impl ConfigurationKind {
    pub const ALL: [ConfigurationKind; 14] = [
        ConfigurationKind::CellOverVoltage,
        ConfigurationKind::PackOverVoltage,
        ConfigurationKind::CellUnderVoltage,
        ConfigurationKind::PackUnderVoltage,
        ConfigurationKind::ChargeOverCurrent,
        ConfigurationKind::DischargeSlowOverCurrent,
        ConfigurationKind::DischargeFastOverCurrent,
        ConfigurationKind::ShortCircuitProtection,
        ConfigurationKind::CellBalancing,
        ConfigurationKind::Sleep,
        ConfigurationKind::FullChargeLowCharge,
        ConfigurationKind::ChargeAndDischargeOverTemperature,
        ConfigurationKind::ChargeAndDischargeUnderTemperature,
        ConfigurationKind::ChargeCurrentLimiterStartCurrent,
    ];

    /// (read CID2, write CID2)
    fn opcodes(self) -> (u8, u8) {
        match self {
            ConfigurationKind::CellOverVoltage => (0xD1, 0xD0),
            ConfigurationKind::PackOverVoltage => (0xD5, 0xD4),
            ConfigurationKind::CellUnderVoltage => (0xD3, 0xD2),
            ConfigurationKind::PackUnderVoltage => (0xD7, 0xD6),
            ConfigurationKind::ChargeOverCurrent => (0xD9, 0xD8),
            ConfigurationKind::DischargeSlowOverCurrent => (0xDB, 0xDA),
            ConfigurationKind::DischargeFastOverCurrent => (0xE3, 0xE2),
            ConfigurationKind::ShortCircuitProtection => (0xE5, 0xE4),
            ConfigurationKind::CellBalancing => (0xB6, 0xB5),
            ConfigurationKind::Sleep => (0xA0, 0xA8),
            ConfigurationKind::FullChargeLowCharge => (0xAF, 0xAE),
            ConfigurationKind::ChargeAndDischargeOverTemperature => (0xDD, 0xDC),
            ConfigurationKind::ChargeAndDischargeUnderTemperature => (0xDF, 0xDE),
            ConfigurationKind::ChargeCurrentLimiterStartCurrent => (0xED, 0xEE),
        }
    }

    pub fn read_cid2(self) -> u8 {
        self.opcodes().0
    }

    pub fn write_cid2(self) -> u8 {
        self.opcodes().1
    }

    pub fn from_read_cid2(cid2: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.read_cid2() == cid2)
    }

    pub fn from_write_cid2(cid2: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.write_cid2() == cid2)
    }

    pub fn key(self) -> &'static str {
        match self {
            ConfigurationKind::CellOverVoltage => "cell_over_voltage",
            ConfigurationKind::PackOverVoltage => "pack_over_voltage",
            ConfigurationKind::CellUnderVoltage => "cell_under_voltage",
            ConfigurationKind::PackUnderVoltage => "pack_under_voltage",
            ConfigurationKind::ChargeOverCurrent => "charge_over_current",
            ConfigurationKind::DischargeSlowOverCurrent => "discharge_slow_over_current",
            ConfigurationKind::DischargeFastOverCurrent => "discharge_fast_over_current",
            ConfigurationKind::ShortCircuitProtection => "short_circuit_protection",
            ConfigurationKind::CellBalancing => "cell_balancing",
            ConfigurationKind::Sleep => "sleep",
            ConfigurationKind::FullChargeLowCharge => "full_charge_low_charge",
            ConfigurationKind::ChargeAndDischargeOverTemperature => {
                "charge_and_discharge_over_temperature"
            }
            ConfigurationKind::ChargeAndDischargeUnderTemperature => {
                "charge_and_discharge_under_temperature"
            }
            ConfigurationKind::ChargeCurrentLimiterStartCurrent => {
                "charge_current_limiter_start_current"
            }
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }
}

/// Alarm, protection and release thresholds for a cell or pack voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoltageProtection {
    pub alarm_mv: u16,
    pub protection_mv: u16,
    pub release_mv: u16,
    pub delay_ms: u16,
}

/// Alarm and protection thresholds for charge or discharge current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentProtection {
    pub alarm_a: u16,
    pub protection_a: u16,
    pub delay_ms: u16,
}

/// Second-stage discharge over-current protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastCurrentProtection {
    pub protection_a: u8,
    pub delay_ms: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortCircuitProtection {
    pub delay_us: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellBalancing {
    /// Cell voltage above which balancing may start
    pub threshold_mv: u16,
    /// Cell spread that triggers balancing
    pub delta_mv: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sleep {
    pub cell_mv: u16,
    pub delay_minutes: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullChargeLowCharge {
    pub full_charge_mv: u16,
    pub full_charge_ma: u16,
    pub low_charge_alarm_percent: u8,
}

/// Charge and discharge temperature limits, in tenths of a degree Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemperatureProtection {
    pub charge_alarm_dc: i16,
    pub charge_protection_dc: i16,
    pub charge_release_dc: i16,
    pub discharge_alarm_dc: i16,
    pub discharge_protection_dc: i16,
    pub discharge_release_dc: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeCurrentLimiter {
    pub start_current_a: u8,
}

/// One configuration group with its values.
///
/// Serialises as a JSON object tagged with `kind`, so the output of a read can be
/// edited and written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Configuration {
    CellOverVoltage(VoltageProtection),
    PackOverVoltage(VoltageProtection),
    CellUnderVoltage(VoltageProtection),
    PackUnderVoltage(VoltageProtection),
    ChargeOverCurrent(CurrentProtection),
    DischargeSlowOverCurrent(CurrentProtection),
    DischargeFastOverCurrent(FastCurrentProtection),
    ShortCircuitProtection(ShortCircuitProtection),
    CellBalancing(CellBalancing),
    Sleep(Sleep),
    FullChargeLowCharge(FullChargeLowCharge),
    ChargeAndDischargeOverTemperature(TemperatureProtection),
    ChargeAndDischargeUnderTemperature(TemperatureProtection),
    ChargeCurrentLimiterStartCurrent(ChargeCurrentLimiter),
}

const PROTECTION_DELAY_STEP_MS: u16 = 100;
const FAST_DELAY_STEP_MS: u16 = 25;
const SHORT_CIRCUIT_STEP_US: u16 = 25;

fn voltage_protection(input: &[u8]) -> IResult<&[u8], VoltageProtection> {
    let (input, _) = be_u8(input)?;
    let (input, alarm_mv) = be_u16(input)?;
    let (input, protection_mv) = be_u16(input)?;
    let (input, release_mv) = be_u16(input)?;
    let (input, delay) = be_u8(input)?;
    Ok((
        input,
        VoltageProtection {
            alarm_mv,
            protection_mv,
            release_mv,
            delay_ms: delay as u16 * PROTECTION_DELAY_STEP_MS,
        },
    ))
}

fn current_protection(input: &[u8]) -> IResult<&[u8], CurrentProtection> {
    let (input, _) = be_u8(input)?;
    // discharge thresholds come back negative
    let (input, alarm) = be_i16(input)?;
    let (input, protection) = be_i16(input)?;
    let (input, delay) = be_u8(input)?;
    Ok((
        input,
        CurrentProtection {
            alarm_a: alarm.unsigned_abs(),
            protection_a: protection.unsigned_abs(),
            delay_ms: delay as u16 * PROTECTION_DELAY_STEP_MS,
        },
    ))
}

fn fast_current_protection(input: &[u8]) -> IResult<&[u8], FastCurrentProtection> {
    let (input, _) = be_u8(input)?;
    let (input, protection_a) = be_u8(input)?;
    let (input, delay) = be_u8(input)?;
    Ok((
        input,
        FastCurrentProtection {
            protection_a,
            delay_ms: delay as u16 * FAST_DELAY_STEP_MS,
        },
    ))
}

fn temperature(input: &[u8]) -> IResult<&[u8], i16> {
    nom::combinator::map_opt(be_u16, decode_temperature)(input)
}

fn temperature_protection(input: &[u8]) -> IResult<&[u8], TemperatureProtection> {
    let (input, _) = be_u8(input)?;
    let (input, charge_alarm_dc) = temperature(input)?;
    let (input, charge_protection_dc) = temperature(input)?;
    let (input, charge_release_dc) = temperature(input)?;
    let (input, discharge_alarm_dc) = temperature(input)?;
    let (input, discharge_protection_dc) = temperature(input)?;
    let (input, discharge_release_dc) = temperature(input)?;
    Ok((
        input,
        TemperatureProtection {
            charge_alarm_dc,
            charge_protection_dc,
            charge_release_dc,
            discharge_alarm_dc,
            discharge_protection_dc,
            discharge_release_dc,
        },
    ))
}

fn parse_configuration(
    kind: ConfigurationKind,
) -> impl Fn(&[u8]) -> IResult<&[u8], Configuration> {
    move |input| {
        let config = match kind {
            ConfigurationKind::CellOverVoltage => {
                let (input, v) = voltage_protection(input)?;
                (input, Configuration::CellOverVoltage(v))
            }
            ConfigurationKind::PackOverVoltage => {
                let (input, v) = voltage_protection(input)?;
                (input, Configuration::PackOverVoltage(v))
            }
            ConfigurationKind::CellUnderVoltage => {
                let (input, v) = voltage_protection(input)?;
                (input, Configuration::CellUnderVoltage(v))
            }
            ConfigurationKind::PackUnderVoltage => {
                let (input, v) = voltage_protection(input)?;
                (input, Configuration::PackUnderVoltage(v))
            }
            ConfigurationKind::ChargeOverCurrent => {
                let (input, c) = current_protection(input)?;
                (input, Configuration::ChargeOverCurrent(c))
            }
            ConfigurationKind::DischargeSlowOverCurrent => {
                let (input, c) = current_protection(input)?;
                (input, Configuration::DischargeSlowOverCurrent(c))
            }
            ConfigurationKind::DischargeFastOverCurrent => {
                let (input, c) = fast_current_protection(input)?;
                (input, Configuration::DischargeFastOverCurrent(c))
            }
            ConfigurationKind::ShortCircuitProtection => {
                let (input, delay) = be_u8(input)?;
                let delay_us = delay as u16 * SHORT_CIRCUIT_STEP_US;
                (
                    input,
                    Configuration::ShortCircuitProtection(ShortCircuitProtection { delay_us }),
                )
            }
            ConfigurationKind::CellBalancing => {
                let (input, threshold_mv) = be_u16(input)?;
                let (input, delta_mv) = be_u16(input)?;
                (
                    input,
                    Configuration::CellBalancing(CellBalancing {
                        threshold_mv,
                        delta_mv,
                    }),
                )
            }
            ConfigurationKind::Sleep => {
                let (input, cell_mv) = be_u16(input)?;
                let (input, _) = be_u8(input)?;
                let (input, delay_minutes) = be_u8(input)?;
                (
                    input,
                    Configuration::Sleep(Sleep {
                        cell_mv,
                        delay_minutes,
                    }),
                )
            }
            ConfigurationKind::FullChargeLowCharge => {
                let (input, full_charge_mv) = be_u16(input)?;
                let (input, full_charge_ma) = be_u16(input)?;
                let (input, low_charge_alarm_percent) = be_u8(input)?;
                (
                    input,
                    Configuration::FullChargeLowCharge(FullChargeLowCharge {
                        full_charge_mv,
                        full_charge_ma,
                        low_charge_alarm_percent,
                    }),
                )
            }
            ConfigurationKind::ChargeAndDischargeOverTemperature => {
                let (input, t) = temperature_protection(input)?;
                (input, Configuration::ChargeAndDischargeOverTemperature(t))
            }
            ConfigurationKind::ChargeAndDischargeUnderTemperature => {
                let (input, t) = temperature_protection(input)?;
                (input, Configuration::ChargeAndDischargeUnderTemperature(t))
            }
            ConfigurationKind::ChargeCurrentLimiterStartCurrent => {
                let (input, _) = be_u8(input)?;
                let (input, start_current_a) = be_u8(input)?;
                (
                    input,
                    Configuration::ChargeCurrentLimiterStartCurrent(ChargeCurrentLimiter {
                        start_current_a,
                    }),
                )
            }
        };
        Ok(config)
    }
}

/// Converts a delay into the pack's step count.
fn steps(option: &str, value: u16, step: u16) -> Result<u8, DecodeError> {
    if value % step != 0 {
        return Err(DecodeError::OutOfRange(format!(
            "{option} {value} is not a multiple of {step}"
        )));
    }
    u8::try_from(value / step).map_err(|_| {
        DecodeError::OutOfRange(format!(
            "{option} {value} exceeds {}",
            u16::from(u8::MAX) * step
        ))
    })
}

fn temperature_bytes(option: &str, dc: i16) -> Result<[u8; 2], DecodeError> {
    encode_temperature(dc)
        .map(u16::to_be_bytes)
        .ok_or_else(|| DecodeError::OutOfRange(format!("{option} {dc} is below absolute zero")))
}

impl Configuration {
    pub fn kind(&self) -> ConfigurationKind {
        match self {
            Configuration::CellOverVoltage(_) => ConfigurationKind::CellOverVoltage,
            Configuration::PackOverVoltage(_) => ConfigurationKind::PackOverVoltage,
            Configuration::CellUnderVoltage(_) => ConfigurationKind::CellUnderVoltage,
            Configuration::PackUnderVoltage(_) => ConfigurationKind::PackUnderVoltage,
            Configuration::ChargeOverCurrent(_) => ConfigurationKind::ChargeOverCurrent,
            Configuration::DischargeSlowOverCurrent(_) => {
                ConfigurationKind::DischargeSlowOverCurrent
            }
            Configuration::DischargeFastOverCurrent(_) => {
                ConfigurationKind::DischargeFastOverCurrent
            }
            Configuration::ShortCircuitProtection(_) => ConfigurationKind::ShortCircuitProtection,
            Configuration::CellBalancing(_) => ConfigurationKind::CellBalancing,
            Configuration::Sleep(_) => ConfigurationKind::Sleep,
            Configuration::FullChargeLowCharge(_) => ConfigurationKind::FullChargeLowCharge,
            Configuration::ChargeAndDischargeOverTemperature(_) => {
                ConfigurationKind::ChargeAndDischargeOverTemperature
            }
            Configuration::ChargeAndDischargeUnderTemperature(_) => {
                ConfigurationKind::ChargeAndDischargeUnderTemperature
            }
            Configuration::ChargeCurrentLimiterStartCurrent(_) => {
                ConfigurationKind::ChargeCurrentLimiterStartCurrent
            }
        }
    }

    /// Decodes the INFO of a read response (or of a write request) for `kind`.
    pub fn decode(kind: ConfigurationKind, info: &[u8]) -> Result<Self, DecodeError> {
        let (rest, config) =
            parse_configuration(kind)(info).map_err(payload_error("configuration"))?;
        if !rest.is_empty() {
            log::debug!("Ignoring {} trailing {} bytes", rest.len(), kind.key());
        }
        Ok(config)
    }

    /// INFO bytes of the write request.
    pub fn payload(&self) -> Result<Vec<u8>, DecodeError> {
        let mut out = Vec::with_capacity(13);
        match self {
            Configuration::CellOverVoltage(v)
            | Configuration::PackOverVoltage(v)
            | Configuration::CellUnderVoltage(v)
            | Configuration::PackUnderVoltage(v) => {
                out.push(0x01);
                out.extend(v.alarm_mv.to_be_bytes());
                out.extend(v.protection_mv.to_be_bytes());
                out.extend(v.release_mv.to_be_bytes());
                out.push(steps("delay_ms", v.delay_ms, PROTECTION_DELAY_STEP_MS)?);
            }
            Configuration::ChargeOverCurrent(c) | Configuration::DischargeSlowOverCurrent(c) => {
                out.push(0x01);
                out.extend(c.alarm_a.to_be_bytes());
                out.extend(c.protection_a.to_be_bytes());
                out.push(steps("delay_ms", c.delay_ms, PROTECTION_DELAY_STEP_MS)?);
            }
            Configuration::DischargeFastOverCurrent(c) => {
                out.push(0x00);
                out.push(c.protection_a);
                out.push(steps("delay_ms", c.delay_ms, FAST_DELAY_STEP_MS)?);
            }
            Configuration::ShortCircuitProtection(s) => {
                out.push(steps("delay_us", s.delay_us, SHORT_CIRCUIT_STEP_US)?);
            }
            Configuration::CellBalancing(b) => {
                out.extend(b.threshold_mv.to_be_bytes());
                out.extend(b.delta_mv.to_be_bytes());
            }
            Configuration::Sleep(s) => {
                out.extend(s.cell_mv.to_be_bytes());
                out.push(0x00);
                out.push(s.delay_minutes);
            }
            Configuration::FullChargeLowCharge(f) => {
                out.extend(f.full_charge_mv.to_be_bytes());
                out.extend(f.full_charge_ma.to_be_bytes());
                out.push(f.low_charge_alarm_percent);
            }
            Configuration::ChargeAndDischargeOverTemperature(t)
            | Configuration::ChargeAndDischargeUnderTemperature(t) => {
                out.push(0x01);
                for (option, dc) in [
                    ("charge_alarm_dc", t.charge_alarm_dc),
                    ("charge_protection_dc", t.charge_protection_dc),
                    ("charge_release_dc", t.charge_release_dc),
                    ("discharge_alarm_dc", t.discharge_alarm_dc),
                    ("discharge_protection_dc", t.discharge_protection_dc),
                    ("discharge_release_dc", t.discharge_release_dc),
                ] {
                    out.extend(temperature_bytes(option, dc)?);
                }
            }
            Configuration::ChargeCurrentLimiterStartCurrent(l) => {
                out.push(0x00);
                out.push(l.start_current_a);
            }
        }
        Ok(out)
    }
}

/// Remaining, full and design capacity (CID2 0xA6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapacityInformation {
    pub remaining_mah: u32,
    pub full_mah: u32,
    pub design_mah: u32,
}

fn capacity_information(input: &[u8]) -> IResult<&[u8], CapacityInformation> {
    let (input, remaining) = be_u16(input)?;
    let (input, full) = be_u16(input)?;
    let (input, design) = be_u16(input)?;
    Ok((
        input,
        CapacityInformation {
            remaining_mah: remaining as u32 * 10,
            full_mah: full as u32 * 10,
            design_mah: design as u32 * 10,
        },
    ))
}

impl CapacityInformation {
    pub fn decode(info: &[u8]) -> Result<Self, DecodeError> {
        let (_, capacity) =
            capacity_information(info).map_err(payload_error("capacity information"))?;
        Ok(capacity)
    }
}

/// Protocol selection for the pack's CAN and RS-485 ports.
///
/// The codes are kept raw; their meaning depends on the firmware's protocol list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Protocols {
    pub can: u8,
    pub rs485: u8,
    pub protocol_type: u8,
}

impl Protocols {
    pub fn decode(info: &[u8]) -> Result<Self, DecodeError> {
        match info {
            [can, rs485, protocol_type, ..] => Ok(Protocols {
                can: *can,
                rs485: *rs485,
                protocol_type: *protocol_type,
            }),
            _ => Err(DecodeError::Truncated {
                expected: 3,
                actual: info.len(),
            }),
        }
    }

    pub fn payload(&self) -> Vec<u8> {
        vec![self.can, self.rs485, self.protocol_type]
    }
}

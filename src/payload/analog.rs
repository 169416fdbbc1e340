//! # Analog Information (CID2 0x42)
//!
//! Layout of the INFO bytes (all integers big-endian):
//!
//! | field | size |
//! |---|---|
//! | data flag | u8 |
//! | pack address | u8 |
//! | cell count N | u8 |
//! | cell voltages (mV) | N x u16 |
//! | temperature count M | u8 |
//! | temperatures (0.1 K) | M x u16 |
//! | current (10 mA, signed) | i16 |
//! | total voltage (mV) | u16 |
//! | remaining capacity (10 mAh) | u16 |
//! | user-defined item count K | u8 |
//! | full capacity (10 mAh), K >= 2 | u16 |
//! | cycle count, K >= 2 | u16 |
//! | design capacity (10 mAh), K >= 3 | u16 |

use nom::combinator::{map_opt, verify};
use nom::multi::count;
use nom::number::complete::{be_i16, be_u16, be_u8};
use nom::IResult;
use serde::Serialize;

use crate::constants::{PACE_MAX_CELLS, PACE_MAX_TEMPERATURES};
use crate::error::DecodeError;
use crate::payload::{decode_temperature, payload_error};
use crate::sinks::Measurement;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalogInformation {
    pub cell_voltages_mv: Vec<u16>,
    /// Tenths of a degree Celsius
    pub temperatures_dc: Vec<i16>,
    pub current_ma: i32,
    pub total_voltage_mv: u32,
    pub remaining_capacity_mah: u32,
    pub full_capacity_mah: Option<u32>,
    pub cycle_count: Option<u16>,
    pub design_capacity_mah: Option<u32>,
}

fn parse_analog(input: &[u8]) -> IResult<&[u8], AnalogInformation> {
    let (input, _data_flag) = be_u8(input)?;
    let (input, _address) = be_u8(input)?;
    let (input, cells) = verify(be_u8, |n: &u8| *n <= PACE_MAX_CELLS)(input)?;
    let (input, cell_voltages_mv) = count(be_u16, cells as usize)(input)?;
    let (input, temperature_count) = verify(be_u8, |n: &u8| *n <= PACE_MAX_TEMPERATURES)(input)?;
    let (input, temperatures_dc) =
        count(map_opt(be_u16, decode_temperature), temperature_count as usize)(input)?;
    let (input, current) = be_i16(input)?;
    let (input, total_voltage) = be_u16(input)?;
    let (input, remaining) = be_u16(input)?;
    let (mut input, user_defined) = be_u8(input)?;

    let mut full_capacity_mah = None;
    let mut cycle_count = None;
    let mut design_capacity_mah = None;
    if user_defined >= 2 {
        let (rest, full) = be_u16(input)?;
        let (rest, cycles) = be_u16(rest)?;
        full_capacity_mah = Some(full as u32 * 10);
        cycle_count = Some(cycles);
        input = rest;
    }
    if user_defined >= 3 {
        let (rest, design) = be_u16(input)?;
        design_capacity_mah = Some(design as u32 * 10);
        input = rest;
    }

    Ok((
        input,
        AnalogInformation {
            cell_voltages_mv,
            temperatures_dc,
            current_ma: current as i32 * 10,
            total_voltage_mv: total_voltage as u32,
            remaining_capacity_mah: remaining as u32 * 10,
            full_capacity_mah,
            cycle_count,
            design_capacity_mah,
        },
    ))
}

impl AnalogInformation {
    pub fn decode(info: &[u8]) -> Result<Self, DecodeError> {
        let (rest, analog) = parse_analog(info).map_err(payload_error("analog information"))?;
        if !rest.is_empty() {
            log::debug!("Ignoring {} trailing analog information bytes", rest.len());
        }
        Ok(analog)
    }

    pub fn voltage(&self) -> f32 {
        self.total_voltage_mv as f32 / 1000.0
    }

    pub fn current(&self) -> f32 {
        self.current_ma as f32 / 1000.0
    }

    /// Watts; negative while discharging.
    pub fn power(&self) -> f32 {
        self.voltage() * self.current()
    }

    /// Stored energy in Wh: remaining Ah at the present pack voltage.
    pub fn energy(&self) -> f32 {
        self.remaining_capacity_mah as f32 / 1000.0 * self.voltage()
    }

    pub fn state_of_charge(&self) -> Option<f32> {
        self.full_capacity_mah
            .filter(|full| *full > 0)
            .map(|full| self.remaining_capacity_mah as f32 / full as f32 * 100.0)
    }

    /// Full over design capacity, capped at 100 %.
    pub fn state_of_health(&self) -> Option<f32> {
        let full = self.full_capacity_mah?;
        self.design_capacity_mah
            .filter(|design| *design > 0)
            .map(|design| (full as f32 / design as f32 * 100.0).min(100.0))
    }

    pub fn min_cell_voltage_mv(&self) -> Option<u16> {
        self.cell_voltages_mv.iter().copied().min()
    }

    pub fn max_cell_voltage_mv(&self) -> Option<u16> {
        self.cell_voltages_mv.iter().copied().max()
    }

    /// Truncated mean.
    pub fn average_cell_voltage_mv(&self) -> Option<u16> {
        if self.cell_voltages_mv.is_empty() {
            return None;
        }
        let sum: u32 = self.cell_voltages_mv.iter().map(|&mv| mv as u32).sum();
        Some((sum / self.cell_voltages_mv.len() as u32) as u16)
    }

    pub fn max_cell_differential_mv(&self) -> Option<u16> {
        Some(self.max_cell_voltage_mv()? - self.min_cell_voltage_mv()?)
    }

    /// Every value this response yields, in SI units (V, A, W, Wh, Ah, °C, %).
    pub fn measurements(&self) -> Vec<(Measurement, f32)> {
        let power = self.power();
        let mut out = vec![
            (Measurement::Voltage, self.voltage()),
            (Measurement::Current, self.current()),
            (Measurement::Power, power),
            (Measurement::Energy, self.energy()),
            (Measurement::ApparentPower, power.abs()),
            (Measurement::ReactivePower, 0.0),
            (Measurement::PowerFactor, 1.0),
            (
                Measurement::RemainingCapacity,
                self.remaining_capacity_mah as f32 / 1000.0,
            ),
        ];

        let optional = [
            (Measurement::StateOfCharge, self.state_of_charge()),
            (Measurement::StateOfHealth, self.state_of_health()),
            (
                Measurement::FullCapacity,
                self.full_capacity_mah.map(|mah| mah as f32 / 1000.0),
            ),
            (
                Measurement::DesignCapacity,
                self.design_capacity_mah.map(|mah| mah as f32 / 1000.0),
            ),
            (Measurement::CycleCount, self.cycle_count.map(f32::from)),
            (Measurement::MinCellVoltage, self.min_cell_voltage_mv().map(mv_to_v)),
            (Measurement::MaxCellVoltage, self.max_cell_voltage_mv().map(mv_to_v)),
            (
                Measurement::AverageCellVoltage,
                self.average_cell_voltage_mv().map(mv_to_v),
            ),
            (
                Measurement::MaxCellDifferential,
                self.max_cell_differential_mv().map(mv_to_v),
            ),
        ];
        out.extend(
            optional
                .into_iter()
                .filter_map(|(measurement, value)| value.map(|v| (measurement, v))),
        );

        out.extend(
            self.cell_voltages_mv
                .iter()
                .zip(1..=u8::MAX)
                .map(|(&mv, n)| (Measurement::CellVoltage(n), mv_to_v(mv))),
        );
        out.extend(
            self.temperatures_dc
                .iter()
                .zip(1..=u8::MAX)
                .map(|(&dc, n)| (Measurement::Temperature(n), dc as f32 / 10.0)),
        );
        out
    }
}

fn mv_to_v(mv: u16) -> f32 {
    mv as f32 / 1000.0
}

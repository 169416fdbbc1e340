//! # Status Information (CID2 0x44)
//!
//! Warning levels per cell and per temperature sensor, protection/system/fault
//! bit fields and the balancing bitmap, rendered into human-readable text.

use bitflags::bitflags;
use nom::multi::count;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;
use serde::Serialize;

use crate::error::DecodeError;
use crate::payload::payload_error;
use crate::sinks::TextMeasurement;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct WarningStatus1: u8 {
        const CELL_OVER_VOLTAGE = 1 << 0;
        const CELL_UNDER_VOLTAGE = 1 << 1;
        const PACK_OVER_VOLTAGE = 1 << 2;
        const PACK_UNDER_VOLTAGE = 1 << 3;
        const CHARGE_OVER_CURRENT = 1 << 4;
        const DISCHARGE_OVER_CURRENT = 1 << 5;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct WarningStatus2: u8 {
        const CHARGE_HIGH_TEMPERATURE = 1 << 0;
        const DISCHARGE_HIGH_TEMPERATURE = 1 << 1;
        const CHARGE_LOW_TEMPERATURE = 1 << 2;
        const DISCHARGE_LOW_TEMPERATURE = 1 << 3;
        const ENVIRONMENT_HIGH_TEMPERATURE = 1 << 4;
        const ENVIRONMENT_LOW_TEMPERATURE = 1 << 5;
        const MOSFET_HIGH_TEMPERATURE = 1 << 6;
        const LOW_STATE_OF_CHARGE = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct ProtectionStatus1: u8 {
        const CELL_OVER_VOLTAGE = 1 << 0;
        const CELL_UNDER_VOLTAGE = 1 << 1;
        const PACK_OVER_VOLTAGE = 1 << 2;
        const PACK_UNDER_VOLTAGE = 1 << 3;
        const CHARGE_OVER_CURRENT = 1 << 4;
        const DISCHARGE_OVER_CURRENT = 1 << 5;
        const SHORT_CIRCUIT = 1 << 6;
        const CHARGER_OVER_VOLTAGE = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct ProtectionStatus2: u8 {
        const CHARGE_HIGH_TEMPERATURE = 1 << 0;
        const DISCHARGE_HIGH_TEMPERATURE = 1 << 1;
        const CHARGE_LOW_TEMPERATURE = 1 << 2;
        const DISCHARGE_LOW_TEMPERATURE = 1 << 3;
        const MOSFET_HIGH_TEMPERATURE = 1 << 4;
        const ENVIRONMENT_HIGH_TEMPERATURE = 1 << 5;
        const ENVIRONMENT_LOW_TEMPERATURE = 1 << 6;
        const FULLY_CHARGED = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct SystemStatus: u8 {
        const CHARGING = 1 << 0;
        const DISCHARGING = 1 << 1;
        const DISCHARGE_MOSFET_ON = 1 << 2;
        const CHARGE_MOSFET_ON = 1 << 3;
        const CHARGE_CURRENT_LIMITER_ON = 1 << 4;
        const HEATER_ON = 1 << 6;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct ConfigurationStatus: u8 {
        const BUZZER_ALARM_ENABLED = 1 << 0;
        const CHARGE_CURRENT_LIMITER_ENABLED = 1 << 3;
        const LED_ALARM_ENABLED = 1 << 5;
        const CHARGE_CURRENT_LIMITER_LOW_GEAR = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct FaultStatus: u8 {
        const CHARGE_MOSFET_FAULT = 1 << 0;
        const DISCHARGE_MOSFET_FAULT = 1 << 1;
        const TEMPERATURE_SENSOR_FAULT = 1 << 2;
        const CELL_FAULT = 1 << 4;
        const SAMPLING_COMMUNICATION_FAULT = 1 << 5;
    }
}

const WARNING1_TEXT: &[(WarningStatus1, &str)] = &[
    (WarningStatus1::CELL_OVER_VOLTAGE, "Cell Over Voltage"),
    (WarningStatus1::CELL_UNDER_VOLTAGE, "Cell Under Voltage"),
    (WarningStatus1::PACK_OVER_VOLTAGE, "Pack Over Voltage"),
    (WarningStatus1::PACK_UNDER_VOLTAGE, "Pack Under Voltage"),
    (WarningStatus1::CHARGE_OVER_CURRENT, "Charge Over Current"),
    (WarningStatus1::DISCHARGE_OVER_CURRENT, "Discharge Over Current"),
];

const WARNING2_TEXT: &[(WarningStatus2, &str)] = &[
    (WarningStatus2::CHARGE_HIGH_TEMPERATURE, "Charge High Temperature"),
    (WarningStatus2::DISCHARGE_HIGH_TEMPERATURE, "Discharge High Temperature"),
    (WarningStatus2::CHARGE_LOW_TEMPERATURE, "Charge Low Temperature"),
    (WarningStatus2::DISCHARGE_LOW_TEMPERATURE, "Discharge Low Temperature"),
    (WarningStatus2::ENVIRONMENT_HIGH_TEMPERATURE, "Environment High Temperature"),
    (WarningStatus2::ENVIRONMENT_LOW_TEMPERATURE, "Environment Low Temperature"),
    (WarningStatus2::MOSFET_HIGH_TEMPERATURE, "MOSFET High Temperature"),
    (WarningStatus2::LOW_STATE_OF_CHARGE, "Low SOC"),
];

const PROTECTION1_TEXT: &[(ProtectionStatus1, &str)] = &[
    (ProtectionStatus1::CELL_OVER_VOLTAGE, "Cell Over Voltage Protection"),
    (ProtectionStatus1::CELL_UNDER_VOLTAGE, "Cell Under Voltage Protection"),
    (ProtectionStatus1::PACK_OVER_VOLTAGE, "Pack Over Voltage Protection"),
    (ProtectionStatus1::PACK_UNDER_VOLTAGE, "Pack Under Voltage Protection"),
    (ProtectionStatus1::CHARGE_OVER_CURRENT, "Charge Over Current Protection"),
    (ProtectionStatus1::DISCHARGE_OVER_CURRENT, "Discharge Over Current Protection"),
    (ProtectionStatus1::SHORT_CIRCUIT, "Short Circuit Protection"),
    (ProtectionStatus1::CHARGER_OVER_VOLTAGE, "Charger Over Voltage Protection"),
];

const PROTECTION2_TEXT: &[(ProtectionStatus2, &str)] = &[
    (ProtectionStatus2::CHARGE_HIGH_TEMPERATURE, "Charge High Temperature Protection"),
    (ProtectionStatus2::DISCHARGE_HIGH_TEMPERATURE, "Discharge High Temperature Protection"),
    (ProtectionStatus2::CHARGE_LOW_TEMPERATURE, "Charge Low Temperature Protection"),
    (ProtectionStatus2::DISCHARGE_LOW_TEMPERATURE, "Discharge Low Temperature Protection"),
    (ProtectionStatus2::MOSFET_HIGH_TEMPERATURE, "MOSFET High Temperature Protection"),
    (ProtectionStatus2::ENVIRONMENT_HIGH_TEMPERATURE, "Environment High Temperature Protection"),
    (ProtectionStatus2::ENVIRONMENT_LOW_TEMPERATURE, "Environment Low Temperature Protection"),
    (ProtectionStatus2::FULLY_CHARGED, "Fully Charged"),
];

const SYSTEM_TEXT: &[(SystemStatus, &str)] = &[
    (SystemStatus::CHARGING, "Charging"),
    (SystemStatus::DISCHARGING, "Discharging"),
    (SystemStatus::DISCHARGE_MOSFET_ON, "Discharge MOSFET On"),
    (SystemStatus::CHARGE_MOSFET_ON, "Charge MOSFET On"),
    (SystemStatus::CHARGE_CURRENT_LIMITER_ON, "Charge Current Limiter On"),
    (SystemStatus::HEATER_ON, "Heater On"),
];

const CONFIGURATION_TEXT: &[(ConfigurationStatus, &str)] = &[
    (ConfigurationStatus::BUZZER_ALARM_ENABLED, "Buzzer Alarm Enabled"),
    (ConfigurationStatus::CHARGE_CURRENT_LIMITER_ENABLED, "Charge Current Limiter Enabled"),
    (ConfigurationStatus::LED_ALARM_ENABLED, "LED Alarm Enabled"),
    (ConfigurationStatus::CHARGE_CURRENT_LIMITER_LOW_GEAR, "Charge Current Limiter Low Gear"),
];

const FAULT_TEXT: &[(FaultStatus, &str)] = &[
    (FaultStatus::CHARGE_MOSFET_FAULT, "Charge MOSFET Fault"),
    (FaultStatus::DISCHARGE_MOSFET_FAULT, "Discharge MOSFET Fault"),
    (FaultStatus::TEMPERATURE_SENSOR_FAULT, "Temperature Sensor Fault"),
    (FaultStatus::CELL_FAULT, "Cell Fault"),
    (FaultStatus::SAMPLING_COMMUNICATION_FAULT, "Sampling Communication Fault"),
];

const TEXT_SEPARATOR: &str = "; ";

fn describe_flags<F: bitflags::Flags + Copy + 'static>(
    value: F,
    table: &'static [(F, &'static str)],
) -> impl Iterator<Item = String> {
    table
        .iter()
        .filter(move |(flag, _)| value.contains(*flag))
        .map(|(_, text)| text.to_string())
}

/// Text for a per-item warning level byte, `None` when normal.
fn describe_level(level: u8) -> Option<&'static str> {
    match level {
        0x00 => None,
        0x01 => Some("below lower limit"),
        0x02 => Some("above upper limit"),
        0xF0 => Some("other fault"),
        _ => Some("undocumented warning"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusInformation {
    pub cell_warnings: Vec<u8>,
    pub temperature_warnings: Vec<u8>,
    pub charge_current_warning: u8,
    pub total_voltage_warning: u8,
    pub discharge_current_warning: u8,
    pub protection1: ProtectionStatus1,
    pub protection2: ProtectionStatus2,
    pub system: SystemStatus,
    pub configuration: ConfigurationStatus,
    pub fault: FaultStatus,
    /// Bit n set means cell n+1 is balancing
    pub balancing: u16,
    pub warning1: WarningStatus1,
    pub warning2: WarningStatus2,
}

fn parse_status(input: &[u8]) -> IResult<&[u8], StatusInformation> {
    let (input, _data_flag) = be_u8(input)?;
    let (input, _address) = be_u8(input)?;
    let (input, cells) = be_u8(input)?;
    let (input, cell_warnings) = count(be_u8, cells as usize)(input)?;
    let (input, sensors) = be_u8(input)?;
    let (input, temperature_warnings) = count(be_u8, sensors as usize)(input)?;
    let (input, charge_current_warning) = be_u8(input)?;
    let (input, total_voltage_warning) = be_u8(input)?;
    let (input, discharge_current_warning) = be_u8(input)?;
    let (input, protection1) = be_u8(input)?;
    let (input, protection2) = be_u8(input)?;
    let (input, system) = be_u8(input)?;
    let (input, configuration) = be_u8(input)?;
    let (input, fault) = be_u8(input)?;
    let (input, balancing) = be_u16(input)?;
    let (input, warning1) = be_u8(input)?;
    let (input, warning2) = be_u8(input)?;
    Ok((
        input,
        StatusInformation {
            cell_warnings,
            temperature_warnings,
            charge_current_warning,
            total_voltage_warning,
            discharge_current_warning,
            protection1: ProtectionStatus1::from_bits_retain(protection1),
            protection2: ProtectionStatus2::from_bits_retain(protection2),
            system: SystemStatus::from_bits_retain(system),
            configuration: ConfigurationStatus::from_bits_retain(configuration),
            fault: FaultStatus::from_bits_retain(fault),
            balancing,
            warning1: WarningStatus1::from_bits_retain(warning1),
            warning2: WarningStatus2::from_bits_retain(warning2),
        },
    ))
}

impl StatusInformation {
    pub fn decode(info: &[u8]) -> Result<Self, DecodeError> {
        let (_, status) = parse_status(info).map_err(payload_error("status information"))?;
        Ok(status)
    }

    pub fn warning_text(&self) -> String {
        let cells = self
            .cell_warnings
            .iter()
            .enumerate()
            .filter_map(|(i, &level)| describe_level(level).map(|t| format!("Cell {} {t}", i + 1)));
        let temperatures = self
            .temperature_warnings
            .iter()
            .enumerate()
            .filter_map(|(i, &level)| {
                describe_level(level).map(|t| format!("Temperature {} {t}", i + 1))
            });
        let pack = [
            ("Charge current", self.charge_current_warning),
            ("Total voltage", self.total_voltage_warning),
            ("Discharge current", self.discharge_current_warning),
        ]
        .into_iter()
        .filter_map(|(what, level)| describe_level(level).map(|t| format!("{what} {t}")));

        cells
            .chain(temperatures)
            .chain(pack)
            .chain(describe_flags(self.warning1, WARNING1_TEXT))
            .chain(describe_flags(self.warning2, WARNING2_TEXT))
            .collect::<Vec<_>>()
            .join(TEXT_SEPARATOR)
    }

    pub fn balancing_text(&self) -> String {
        (0..16u16)
            .filter(|bit| self.balancing & (1 << bit) != 0)
            .map(|bit| format!("Cell {} balancing", bit + 1))
            .collect::<Vec<_>>()
            .join(TEXT_SEPARATOR)
    }

    pub fn system_text(&self) -> String {
        describe_flags(self.system, SYSTEM_TEXT)
            .collect::<Vec<_>>()
            .join(TEXT_SEPARATOR)
    }

    pub fn configuration_text(&self) -> String {
        describe_flags(self.configuration, CONFIGURATION_TEXT)
            .collect::<Vec<_>>()
            .join(TEXT_SEPARATOR)
    }

    pub fn protection_text(&self) -> String {
        describe_flags(self.protection1, PROTECTION1_TEXT)
            .chain(describe_flags(self.protection2, PROTECTION2_TEXT))
            .collect::<Vec<_>>()
            .join(TEXT_SEPARATOR)
    }

    pub fn fault_text(&self) -> String {
        describe_flags(self.fault, FAULT_TEXT)
            .collect::<Vec<_>>()
            .join(TEXT_SEPARATOR)
    }

    /// Every text value this response yields.
    pub fn text_measurements(&self) -> Vec<(TextMeasurement, String)> {
        vec![
            (TextMeasurement::WarningStatus, self.warning_text()),
            (TextMeasurement::BalancingStatus, self.balancing_text()),
            (TextMeasurement::SystemStatus, self.system_text()),
            (TextMeasurement::ConfigurationStatus, self.configuration_text()),
            (TextMeasurement::ProtectionStatus, self.protection_text()),
            (TextMeasurement::FaultStatus, self.fault_text()),
        ]
    }
}

//! # Configuration
//!
//! A JSON document describing one BMS instance. Every option has a default; the
//! document is validated into [`Settings`] before anything touches the serial
//! port, and an invalid document is fatal.
//!
//! ```json
//! {
//!   "port": "/dev/ttyUSB0",
//!   "flow_control": "rts",
//!   "address": 1,
//!   "protocol_commandset": "0x25",
//!   "request_throttle_ms": 50,
//!   "response_timeout_ms": 200,
//!   "update_interval_ms": 60000,
//!   "sensors": ["voltage", "current", "cell_voltage_1"],
//!   "text_sensors": ["serial_number"]
//! }
//! ```
//!
//! Byte-valued options accept either a JSON number or a string such as `"0x25"`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ConfigError;
use crate::pace::{DeviceIdentity, TransportConfig};
use crate::sinks::{Measurement, SensorSink, SinkRegistry, TextMeasurement, TextSensorSink};

/// A number written either as a JSON number or as a decimal/`0x` hex string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ConfigNumber {
    Number(u64),
    Text(String),
}

impl ConfigNumber {
    fn value(&self, option: &'static str) -> Result<u64, ConfigError> {
        match self {
            ConfigNumber::Number(n) => Ok(*n),
            ConfigNumber::Text(text) => {
                let trimmed = text.trim();
                let parsed = match trimmed
                    .strip_prefix("0x")
                    .or_else(|| trimmed.strip_prefix("0X"))
                {
                    Some(hex) => u64::from_str_radix(hex, 16),
                    None => trimmed.parse(),
                };
                parsed.map_err(|_| ConfigError::InvalidValue {
                    option,
                    value: text.clone(),
                })
            }
        }
    }
}

impl From<u64> for ConfigNumber {
    fn from(n: u64) -> Self {
        ConfigNumber::Number(n)
    }
}

/// The configuration document as written by the user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaceBmsConfig {
    pub port: Option<String>,
    pub flow_control: Option<String>,
    pub address: ConfigNumber,
    pub protocol_commandset: ConfigNumber,
    pub protocol_variant: Option<String>,
    pub protocol_version: Option<ConfigNumber>,
    pub battery_chemistry: Option<ConfigNumber>,
    pub request_throttle_ms: u64,
    pub response_timeout_ms: u64,
    pub update_interval_ms: u64,
    /// Measurement keys to publish; all when absent
    pub sensors: Option<Vec<String>>,
    /// Text measurement keys to publish; all when absent
    pub text_sensors: Option<Vec<String>>,
}

impl Default for PaceBmsConfig {
    fn default() -> Self {
        PaceBmsConfig {
            port: None,
            flow_control: None,
            address: ConfigNumber::Number(PACE_DEFAULT_ADDRESS as u64),
            protocol_commandset: ConfigNumber::Number(PACE_DEFAULT_COMMANDSET as u64),
            protocol_variant: None,
            protocol_version: None,
            battery_chemistry: None,
            request_throttle_ms: PACE_DEFAULT_REQUEST_THROTTLE.as_millis() as u64,
            response_timeout_ms: PACE_DEFAULT_RESPONSE_TIMEOUT.as_millis() as u64,
            update_interval_ms: PACE_DEFAULT_UPDATE_INTERVAL.as_millis() as u64,
            sensors: None,
            text_sensors: None,
        }
    }
}

/// Modem-control line used as the RS-485 direction signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControlLine {
    Rts,
    Dtr,
}

/// A validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub port: Option<String>,
    pub flow_control: Option<FlowControlLine>,
    pub identity: DeviceIdentity,
    pub transport: TransportConfig,
    pub update_interval: Duration,
    pub sensors: Vec<Measurement>,
    pub text_sensors: Vec<TextMeasurement>,
}

fn byte_option(
    option: &'static str,
    value: &ConfigNumber,
    min: u8,
    max: u8,
) -> Result<u8, ConfigError> {
    let raw = value.value(option)?;
    if raw < min as u64 || raw > max as u64 {
        return Err(ConfigError::OutOfRange {
            option,
            value: raw,
            min: min as u64,
            max: max as u64,
        });
    }
    Ok(raw as u8)
}

fn positive_ms(option: &'static str, value: u64) -> Result<Duration, ConfigError> {
    if value == 0 {
        return Err(ConfigError::OutOfRange {
            option,
            value,
            min: 1,
            max: u64::MAX,
        });
    }
    Ok(Duration::from_millis(value))
}

impl PaceBmsConfig {
    /// Reads and parses a configuration file. The result is not yet validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Checks every option and resolves defaults.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let address = byte_option("address", &self.address, 0, PACE_ADDRESS_MAX)?;
        let command_set = byte_option(
            "protocol_commandset",
            &self.protocol_commandset,
            PACE_COMMANDSET_MIN,
            PACE_COMMANDSET_MAX,
        )?;
        let version = self
            .protocol_version
            .as_ref()
            .map(|v| byte_option("protocol_version", v, 0, u8::MAX))
            .transpose()?;
        let chemistry = self
            .battery_chemistry
            .as_ref()
            .map(|v| byte_option("battery_chemistry", v, 0, u8::MAX))
            .transpose()?;
        let identity = DeviceIdentity::new(
            address,
            command_set,
            self.protocol_variant.clone(),
            version,
            chemistry,
        )?;

        let flow_control = match self.flow_control.as_deref() {
            None => None,
            Some(line) => Some(match line.to_ascii_lowercase().as_str() {
                "rts" => FlowControlLine::Rts,
                "dtr" => FlowControlLine::Dtr,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        option: "flow_control",
                        value: line.to_string(),
                    })
                }
            }),
        };

        let transport = TransportConfig {
            request_throttle: Duration::from_millis(self.request_throttle_ms),
            response_timeout: positive_ms("response_timeout_ms", self.response_timeout_ms)?,
        };
        let update_interval = positive_ms("update_interval_ms", self.update_interval_ms)?;

        let sensors = match &self.sensors {
            None => Measurement::all(),
            Some(keys) => keys
                .iter()
                .map(|key| {
                    Measurement::from_key(key).ok_or_else(|| ConfigError::InvalidValue {
                        option: "sensors",
                        value: key.clone(),
                    })
                })
                .collect::<Result<_, _>>()?,
        };
        let text_sensors = match &self.text_sensors {
            None => TextMeasurement::ALL.to_vec(),
            Some(keys) => keys
                .iter()
                .map(|key| {
                    TextMeasurement::from_key(key).ok_or_else(|| ConfigError::InvalidValue {
                        option: "text_sensors",
                        value: key.clone(),
                    })
                })
                .collect::<Result<_, _>>()?,
        };

        if let Some(variant) = identity.variant() {
            log::info!("Protocol variant: {variant}");
        }
        log::debug!(
            "Configured address {address}, command set 0x{command_set:02X}, \
             {} sensors, {} text sensors",
            sensors.len(),
            text_sensors.len()
        );

        Ok(Settings {
            port: self.port.clone(),
            flow_control,
            identity,
            transport,
            update_interval,
            sensors,
            text_sensors,
        })
    }
}

impl Settings {
    /// Serial port from the configuration, unless `override_port` is given.
    pub fn port_or(&self, override_port: Option<&str>) -> Result<String, ConfigError> {
        override_port
            .map(str::to_string)
            .or_else(|| self.port.clone())
            .ok_or(ConfigError::MissingPort)
    }

    /// Binds `sink` to every configured measurement.
    pub fn sink_registry<S>(&self, sink: Arc<S>) -> SinkRegistry
    where
        S: SensorSink + TextSensorSink + 'static,
    {
        let mut registry = SinkRegistry::new();
        for measurement in &self.sensors {
            registry.register(*measurement, sink.clone());
        }
        for measurement in &self.text_sensors {
            registry.register_text(*measurement, sink.clone());
        }
        registry
    }
}

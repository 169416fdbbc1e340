//! # Measurement Sinks
//!
//! Decoded values are published to abstract sinks. Each measurement kind (and
//! each cell/temperature index) has at most one sink; kinds without a sink are decoded
//! but never published.
//!
//! ```rust
//! use std::sync::Arc;
//! use pace_bms_rs::sinks::{LoggingSink, Measurement, SinkRegistry};
//!
//! let mut sinks = SinkRegistry::new();
//! sinks.register(Measurement::Voltage, Arc::new(LoggingSink));
//! assert!(sinks.publish(Measurement::Voltage, 52.43));
//! assert!(!sinks.publish(Measurement::Current, -2.25));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};

use log::{info, warn};
use serde::Serialize;

use crate::constants::{PACE_MAX_CELLS, PACE_MAX_TEMPERATURES};

/// Numeric measurement kinds. Cell and temperature numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Measurement {
    Voltage,
    Current,
    Power,
    Energy,
    ApparentPower,
    ReactivePower,
    PowerFactor,
    StateOfCharge,
    StateOfHealth,
    RemainingCapacity,
    FullCapacity,
    DesignCapacity,
    CycleCount,
    MinCellVoltage,
    MaxCellVoltage,
    AverageCellVoltage,
    MaxCellDifferential,
    CellVoltage(u8),
    Temperature(u8),
}

const SCALAR_MEASUREMENTS: [(Measurement, &str); 17] = [
    (Measurement::Voltage, "voltage"),
    (Measurement::Current, "current"),
    (Measurement::Power, "power"),
    (Measurement::Energy, "energy"),
    (Measurement::ApparentPower, "apparent_power"),
    (Measurement::ReactivePower, "reactive_power"),
    (Measurement::PowerFactor, "power_factor"),
    (Measurement::StateOfCharge, "state_of_charge"),
    (Measurement::StateOfHealth, "state_of_health"),
    (Measurement::RemainingCapacity, "remaining_capacity"),
    (Measurement::FullCapacity, "full_capacity"),
    (Measurement::DesignCapacity, "design_capacity"),
    (Measurement::CycleCount, "cycle_count"),
    (Measurement::MinCellVoltage, "min_cell_voltage"),
    (Measurement::MaxCellVoltage, "max_cell_voltage"),
    (Measurement::AverageCellVoltage, "average_cell_voltage"),
    (Measurement::MaxCellDifferential, "max_cell_differential"),
];

impl Measurement {
    /// Every measurement kind, indexed kinds included.
    pub fn all() -> Vec<Measurement> {
        let mut all: Vec<Measurement> = SCALAR_MEASUREMENTS.iter().map(|(m, _)| *m).collect();
        all.extend((1..=PACE_MAX_CELLS).map(Measurement::CellVoltage));
        all.extend((1..=PACE_MAX_TEMPERATURES).map(Measurement::Temperature));
        all
    }

    /// Configuration key, e.g. `voltage` or `cell_voltage_3`.
    pub fn key(&self) -> String {
        match self {
            Measurement::CellVoltage(n) => format!("cell_voltage_{n}"),
            Measurement::Temperature(n) => format!("temperature_{n}"),
            scalar => SCALAR_MEASUREMENTS
                .iter()
                .find(|(m, _)| m == scalar)
                .map(|(_, key)| key.to_string())
                .unwrap_or_default(),
        }
    }

    pub fn from_key(key: &str) -> Option<Measurement> {
        if let Some(n) = key.strip_prefix("cell_voltage_") {
            return n
                .parse::<u8>()
                .ok()
                .filter(|n| (1..=PACE_MAX_CELLS).contains(n))
                .map(Measurement::CellVoltage);
        }
        if let Some(n) = key.strip_prefix("temperature_") {
            return n
                .parse::<u8>()
                .ok()
                .filter(|n| (1..=PACE_MAX_TEMPERATURES).contains(n))
                .map(Measurement::Temperature);
        }
        SCALAR_MEASUREMENTS
            .iter()
            .find(|(_, k)| *k == key)
            .map(|(m, _)| *m)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Text measurement kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextMeasurement {
    HardwareVersion,
    SerialNumber,
    SystemDateTime,
    WarningStatus,
    BalancingStatus,
    SystemStatus,
    ConfigurationStatus,
    ProtectionStatus,
    FaultStatus,
}

impl TextMeasurement {
    pub const ALL: [TextMeasurement; 9] = [
        TextMeasurement::HardwareVersion,
        TextMeasurement::SerialNumber,
        TextMeasurement::SystemDateTime,
        TextMeasurement::WarningStatus,
        TextMeasurement::BalancingStatus,
        TextMeasurement::SystemStatus,
        TextMeasurement::ConfigurationStatus,
        TextMeasurement::ProtectionStatus,
        TextMeasurement::FaultStatus,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            TextMeasurement::HardwareVersion => "hardware_version",
            TextMeasurement::SerialNumber => "serial_number",
            TextMeasurement::SystemDateTime => "system_date_time",
            TextMeasurement::WarningStatus => "warning_status",
            TextMeasurement::BalancingStatus => "balancing_status",
            TextMeasurement::SystemStatus => "system_status",
            TextMeasurement::ConfigurationStatus => "configuration_status",
            TextMeasurement::ProtectionStatus => "protection_status",
            TextMeasurement::FaultStatus => "fault_status",
        }
    }

    pub fn from_key(key: &str) -> Option<TextMeasurement> {
        Self::ALL.into_iter().find(|t| t.key() == key)
    }

    /// Whether the value comes from the status information response.
    pub fn is_status(&self) -> bool {
        !matches!(
            self,
            TextMeasurement::HardwareVersion
                | TextMeasurement::SerialNumber
                | TextMeasurement::SystemDateTime
        )
    }
}

impl fmt::Display for TextMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Destination for numeric values.
pub trait SensorSink: Send + Sync {
    fn publish(&self, measurement: Measurement, value: f32);
}

/// Destination for text values.
pub trait TextSensorSink: Send + Sync {
    fn publish_text(&self, measurement: TextMeasurement, value: &str);
}

/// Zero-or-one sink per measurement kind, fixed before polling starts.
#[derive(Default, Clone)]
pub struct SinkRegistry {
    sensors: HashMap<Measurement, Arc<dyn SensorSink>>,
    text_sensors: HashMap<TextMeasurement, Arc<dyn TextSensorSink>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `sink` to `measurement`, returning the sink it replaced.
    pub fn register(
        &mut self,
        measurement: Measurement,
        sink: Arc<dyn SensorSink>,
    ) -> Option<Arc<dyn SensorSink>> {
        let previous = self.sensors.insert(measurement, sink);
        if previous.is_some() {
            warn!("Sink for {measurement} registered twice, replacing the previous one");
        }
        previous
    }

    /// Binds `sink` to a text measurement, returning the sink it replaced.
    pub fn register_text(
        &mut self,
        measurement: TextMeasurement,
        sink: Arc<dyn TextSensorSink>,
    ) -> Option<Arc<dyn TextSensorSink>> {
        let previous = self.text_sensors.insert(measurement, sink);
        if previous.is_some() {
            warn!("Text sink for {measurement} registered twice, replacing the previous one");
        }
        previous
    }

    pub fn has(&self, measurement: Measurement) -> bool {
        self.sensors.contains_key(&measurement)
    }

    pub fn has_text(&self, measurement: TextMeasurement) -> bool {
        self.text_sensors.contains_key(&measurement)
    }

    pub fn has_any_sensor(&self) -> bool {
        !self.sensors.is_empty()
    }

    pub fn has_any_status_text(&self) -> bool {
        self.text_sensors.keys().any(TextMeasurement::is_status)
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty() && self.text_sensors.is_empty()
    }

    /// Publishes `value` if a sink is bound. Returns whether it was published.
    pub fn publish(&self, measurement: Measurement, value: f32) -> bool {
        match self.sensors.get(&measurement) {
            Some(sink) => {
                sink.publish(measurement, value);
                true
            }
            None => false,
        }
    }

    /// Publishes a text value if a sink is bound. Returns whether it was published.
    pub fn publish_text(&self, measurement: TextMeasurement, value: &str) -> bool {
        match self.text_sensors.get(&measurement) {
            Some(sink) => {
                sink.publish_text(measurement, value);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sensors: Vec<_> = self.sensors.keys().collect();
        sensors.sort();
        let mut text_sensors: Vec<_> = self.text_sensors.keys().collect();
        text_sensors.sort();
        f.debug_struct("SinkRegistry")
            .field("sensors", &sensors)
            .field("text_sensors", &text_sensors)
            .finish()
    }
}

/// Writes every value to the `log` facade at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl SensorSink for LoggingSink {
    fn publish(&self, measurement: Measurement, value: f32) {
        info!("{measurement}: {value}");
    }
}

impl TextSensorSink for LoggingSink {
    fn publish_text(&self, measurement: TextMeasurement, value: &str) {
        info!("{measurement}: {value:?}");
    }
}

#[derive(Serialize)]
struct JsonLine<'a, V: Serialize> {
    timestamp: chrono::DateTime<chrono::Utc>,
    key: &'a str,
    value: V,
}

/// Writes one JSON object per value, one per line.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesSink {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_line<V: Serialize>(&self, key: &str, value: V) {
        let line = JsonLine {
            timestamp: chrono::Utc::now(),
            key,
            value,
        };
        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = write_json_line(&mut *writer, &line) {
            warn!("Failed to write {key} to JSON sink: {e}");
        }
    }
}

fn write_json_line<W: Write, T: Serialize>(writer: &mut W, value: &T) -> std::io::Result<()> {
    serde_json::to_writer(&mut *writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

impl<W: Write + Send> SensorSink for JsonLinesSink<W> {
    fn publish(&self, measurement: Measurement, value: f32) {
        self.write_line(&measurement.key(), value);
    }
}

impl<W: Write + Send> TextSensorSink for JsonLinesSink<W> {
    fn publish_text(&self, measurement: TextMeasurement, value: &str) {
        self.write_line(measurement.key(), value);
    }
}

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use pace_bms_rs::{
    ConfigError, FlowControlLine, LoggingSink, Measurement, PaceBmsConfig, TextMeasurement,
};
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_document() {
    let file = write_config(
        r#"{
            "port": "/dev/ttyUSB0",
            "flow_control": "RTS",
            "address": 2,
            "protocol_commandset": "0x25",
            "protocol_variant": "PYLON",
            "request_throttle_ms": 100,
            "response_timeout_ms": 500,
            "update_interval_ms": 5000,
            "sensors": ["voltage", "current", "cell_voltage_1", "temperature_6"],
            "text_sensors": ["serial_number"]
        }"#,
    );
    let settings = PaceBmsConfig::load(file.path()).unwrap().validate().unwrap();

    assert_eq!(settings.port.as_deref(), Some("/dev/ttyUSB0"));
    assert_eq!(settings.flow_control, Some(FlowControlLine::Rts));
    assert_eq!(settings.identity.address(), 2);
    assert_eq!(settings.identity.variant(), Some("PYLON"));
    assert_eq!(settings.transport.request_throttle, Duration::from_millis(100));
    assert_eq!(settings.transport.response_timeout, Duration::from_millis(500));
    assert_eq!(settings.update_interval, Duration::from_secs(5));
    assert_eq!(
        settings.sensors,
        vec![
            Measurement::Voltage,
            Measurement::Current,
            Measurement::CellVoltage(1),
            Measurement::Temperature(6)
        ]
    );
    assert_eq!(settings.text_sensors, vec![TextMeasurement::SerialNumber]);

    let registry = settings.sink_registry(Arc::new(LoggingSink));
    assert!(registry.has(Measurement::CellVoltage(1)));
    assert!(!registry.has(Measurement::CellVoltage(2)));
    assert!(registry.has_text(TextMeasurement::SerialNumber));
    assert!(!registry.has_any_status_text());
}

#[test]
fn test_missing_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = PaceBmsConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Read(_)));
}

#[test]
fn test_invalid_json_is_parse_error() {
    let file = write_config("{ \"address\": ");
    assert!(matches!(
        PaceBmsConfig::load(file.path()),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_command_set_outside_supported_range() {
    let file = write_config(r#"{ "protocol_commandset": 38 }"#);
    let err = PaceBmsConfig::load(file.path())
        .unwrap()
        .validate()
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::OutOfRange {
            option: "protocol_commandset",
            value: 38,
            min: 0x20,
            max: 0x25
        }
    ));
}

#[test]
fn test_unknown_text_sensor() {
    let file = write_config(r#"{ "text_sensors": ["firmware"] }"#);
    let err = PaceBmsConfig::load(file.path())
        .unwrap()
        .validate()
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid value for `text_sensors`: firmware");
}

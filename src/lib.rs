//! # pace-bms-rs - A Rust Crate for PACE Battery Management Systems
//!
//! The pace-bms-rs crate talks to lithium battery packs built around a PACE BMS
//! over their RS-232/RS-485 console port. The wire protocol is the ASCII-hex
//! "PACE" framing (`~` ... `\r`) shared by many rack and wall-mount LiFePO4 packs.
//!
//! ## Features
//!
//! - Encode requests and decode responses bit-exactly, including length and frame checksums
//! - One request in flight per line, with a request throttle and an inactivity timeout
//! - Optional RS-485 direction control through RTS, DTR or a user-supplied pin
//! - Decode analog values (cells, temperatures, current, capacity) and status flags
//! - Periodic polling that only asks for what the registered sinks consume
//! - Write commands: switches, MOSFETs, system clock, shutdown
//! - A device simulator for testing without hardware
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pace_bms_rs::{connect, LoggingSink, PaceBmsConfig, PaceBmsPoller};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = PaceBmsConfig::load("pace-bms.json")?.validate()?;
//! let transport = connect(&settings.port_or(None)?, &settings)?;
//! let sinks = settings.sink_registry(Arc::new(LoggingSink));
//! let poller = PaceBmsPoller::new(Arc::new(transport), sinks);
//! poller.run(settings.update_interval, async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod pace;
pub mod payload;
pub mod poller;
pub mod sinks;
pub mod util;

pub use crate::config::{FlowControlLine, PaceBmsConfig, Settings};
pub use crate::error::{ConfigError, DecodeError, PaceBmsError, TransportError};
pub use crate::logging::init_logger;

// Protocol
pub use pace::{
    DeviceIdentity, FlowControl, FlowControlPin, FrameCodec, MockPaceBms, MosfetState,
    MosfetType, PaceTransport, Request, Response, SerialConfig, SerialLine, SwitchCommand,
    TransportConfig,
};

// Decoded data
pub use payload::{AnalogInformation, StatusInformation};

// Polling and sinks
pub use poller::{PaceBmsPoller, TickReport};
pub use sinks::{
    JsonLinesSink, LoggingSink, Measurement, SensorSink, SinkRegistry, TextMeasurement,
    TextSensorSink,
};

/// Opens the serial port and builds a transport for the configured BMS.
///
/// # Arguments
/// * `port` - Serial port path (e.g., "/dev/ttyUSB0" on Linux, "COM3" on Windows)
/// * `settings` - Validated configuration
pub fn connect(
    port: &str,
    settings: &Settings,
) -> Result<PaceTransport<tokio_serial::SerialStream>, PaceBmsError> {
    let stream = pace::serial::open_serial(port, &SerialConfig::default())?;
    let flow_control = match settings.flow_control {
        None => FlowControl::Disabled,
        Some(FlowControlLine::Rts) => FlowControl::Rts,
        Some(FlowControlLine::Dtr) => FlowControl::Dtr,
    };
    Ok(PaceTransport::new(stream, &settings.identity, settings.transport)
        .with_flow_control(flow_control))
}

/// Names of the serial ports present on this machine.
pub fn available_ports() -> Result<Vec<String>, PaceBmsError> {
    pace::serial::list_ports()
}

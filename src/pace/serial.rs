//! # PACE Serial Line
//!
//! The transport talks to anything implementing [`SerialLine`]: a real port
//! opened with `tokio-serial`, an in-memory duplex pipe wired to the device
//! simulator, or a scripted mock in tests. Half-duplex RS-485 adapters need a
//! direction line driven around every transmit; that is modelled by
//! [`FlowControl`].

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::SerialPortBuilderExt;

use crate::constants::PACE_BAUD_RATE;
use crate::error::PaceBmsError;

/// Byte stream to the BMS with optional modem-control lines.
#[async_trait::async_trait]
pub trait SerialLine: AsyncRead + AsyncWrite + Unpin + Send {
    /// Drives the RTS line. Lines without modem control ignore it.
    async fn set_request_to_send(&mut self, _level: bool) -> io::Result<()> {
        Ok(())
    }

    /// Drives the DTR line. Lines without modem control ignore it.
    async fn set_data_terminal_ready(&mut self, _level: bool) -> io::Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl SerialLine for tokio_serial::SerialStream {
    async fn set_request_to_send(&mut self, level: bool) -> io::Result<()> {
        tokio_serial::SerialPort::write_request_to_send(self, level).map_err(io::Error::from)
    }

    async fn set_data_terminal_ready(&mut self, level: bool) -> io::Result<()> {
        tokio_serial::SerialPort::write_data_terminal_ready(self, level).map_err(io::Error::from)
    }
}

impl SerialLine for tokio::io::DuplexStream {}

#[cfg(test)]
impl SerialLine for tokio_test::io::Mock {}

/// A user-supplied transmit-enable output (e.g. a GPIO driving an RS-485 DE pin).
#[async_trait::async_trait]
pub trait FlowControlPin: Send + Sync {
    async fn set_level(&mut self, high: bool) -> io::Result<()>;
}

/// Which line, if any, is asserted while a request is being written.
#[derive(Default)]
pub enum FlowControl {
    #[default]
    Disabled,
    /// The adapter's RTS modem line
    Rts,
    /// The adapter's DTR modem line
    Dtr,
    Pin(Box<dyn FlowControlPin>),
}

impl FlowControl {
    pub(crate) async fn drive<P: SerialLine>(
        &mut self,
        port: &mut P,
        level: bool,
    ) -> io::Result<()> {
        match self {
            FlowControl::Disabled => Ok(()),
            FlowControl::Rts => port.set_request_to_send(level).await,
            FlowControl::Dtr => port.set_data_terminal_ready(level).await,
            FlowControl::Pin(pin) => pin.set_level(level).await,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, FlowControl::Disabled)
    }
}

impl fmt::Debug for FlowControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowControl::Disabled => f.write_str("Disabled"),
            FlowControl::Rts => f.write_str("Rts"),
            FlowControl::Dtr => f.write_str("Dtr"),
            FlowControl::Pin(_) => f.write_str("Pin"),
        }
    }
}

/// Configuration for the serial connection.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baudrate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baudrate: PACE_BAUD_RATE,
        }
    }
}

/// Opens `port_name` as 8N1 at the configured baud rate.
pub fn open_serial(
    port_name: &str,
    config: &SerialConfig,
) -> Result<tokio_serial::SerialStream, PaceBmsError> {
    let port = tokio_serial::new(port_name, config.baudrate)
        .data_bits(tokio_serial::DataBits::Eight)
        .stop_bits(tokio_serial::StopBits::One)
        .parity(tokio_serial::Parity::None)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()?;
    log::info!("Opened {port_name} at {} baud", config.baudrate);
    Ok(port)
}

/// Names of the serial ports present on this machine.
pub fn list_ports() -> Result<Vec<String>, PaceBmsError> {
    let ports = tokio_serial::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingPin(Arc<Mutex<Vec<bool>>>);

    #[async_trait::async_trait]
    impl FlowControlPin for RecordingPin {
        async fn set_level(&mut self, high: bool) -> io::Result<()> {
            self.0.lock().unwrap().push(high);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pin_flow_control_is_driven() {
        let levels = Arc::new(Mutex::new(Vec::new()));
        let mut flow = FlowControl::Pin(Box::new(RecordingPin(levels.clone())));
        let (mut port, _other) = tokio::io::duplex(64);
        flow.drive(&mut port, true).await.unwrap();
        flow.drive(&mut port, false).await.unwrap();
        assert_eq!(*levels.lock().unwrap(), vec![true, false]);
        assert!(flow.is_enabled());
    }

    #[tokio::test]
    async fn test_modem_lines_are_noop_on_pipes() {
        let (mut port, _other) = tokio::io::duplex(64);
        let mut flow = FlowControl::Rts;
        assert!(flow.drive(&mut port, true).await.is_ok());
        assert!(!FlowControl::default().is_enabled());
    }
}

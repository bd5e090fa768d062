use async_trait::async_trait;
use log::{debug, error, info};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::settings::ParityConfig;
use crate::utils::error::ModbusError;

/// Byte pipe between the master and a slave. Implementations add no framing.
#[async_trait]
pub trait Transport: Send {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), ModbusError>;

    /// Reads up to `max_bytes`. A short or empty result is not an error.
    async fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>, ModbusError>;
}

/// Once a response has started, a silent line for this long ends the read.
pub const INTER_BYTE_TIMEOUT: Duration = Duration::from_millis(50);

pub struct SerialTransport {
    port_name: String,
    port: Arc<Mutex<Box<dyn SerialPort>>>,
    read_timeout: Duration,
}

impl SerialTransport {
    /// Opens `port_name` with 8 data bits and 1 stop bit. A single `read`
    /// returns within `read_timeout`.
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        parity: &ParityConfig,
        read_timeout: Duration,
    ) -> Result<Self, ModbusError> {
        info!("🔌 Connecting to Modbus RTU port: {}", port_name);
        info!(
            "⚙️  Configuration: {} baud, 8 data bits, 1 stop bit, {} parity",
            baud_rate, parity
        );

        let serial_parity = match parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };

        let port = serialport::new(port_name, baud_rate)
            .timeout(read_timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serial_parity)
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", port_name, e);
                ModbusError::ConnectionError(format!("Failed to open port: {}", e))
            })?;

        info!("Modbus RTU connection established successfully");
        Ok(Self::from_port(port_name, port, read_timeout))
    }

    /// Wraps an already configured port.
    pub fn from_port(port_name: &str, port: Box<dyn SerialPort>, read_timeout: Duration) -> Self {
        Self {
            port_name: port_name.to_string(),
            port: Arc::new(Mutex::new(port)),
            read_timeout,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), ModbusError> {
        let mut port = self.port.lock().map_err(|_| ModbusError::LockError)?;

        port.write_all(bytes)
            .map_err(|e| ModbusError::CommunicationError(format!("Write failed: {}", e)))?;
        port.flush()
            .map_err(|e| ModbusError::CommunicationError(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    async fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>, ModbusError> {
        let port = Arc::clone(&self.port);
        let deadline = Instant::now() + self.read_timeout;

        // serialport is blocking; keep the runtime free while the port timeout runs.
        tokio::task::spawn_blocking(move || {
            let mut port = port.lock().map_err(|_| ModbusError::LockError)?;
            let mut response = Vec::with_capacity(max_bytes);
            let mut buffer = [0u8; 256];

            while response.len() < max_bytes {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                let wait = if response.is_empty() {
                    remaining
                } else {
                    remaining.min(INTER_BYTE_TIMEOUT)
                };
                port.set_timeout(wait)?;

                let want = (max_bytes - response.len()).min(buffer.len());
                match port.read(&mut buffer[..want]) {
                    Ok(0) => break,
                    Ok(n) => {
                        debug!("📥 Raw data received: {} ({} bytes)", hex::encode(&buffer[..n]), n);
                        response.extend_from_slice(&buffer[..n]);
                    }
                    Err(ref e) if e.kind() == ErrorKind::TimedOut => break,
                    Err(e) => {
                        return Err(ModbusError::CommunicationError(format!("Read failed: {}", e)));
                    }
                }
            }

            Ok(response)
        })
        .await
        .map_err(|e| ModbusError::CommunicationError(format!("Read task failed: {}", e)))?
    }
}

#[derive(Debug, Clone)]
pub struct PortInfo {
    pub name: String,
    pub manufacturer: Option<String>,
    pub serial_number: Option<String>,
}

pub fn list_serial_ports() -> Result<Vec<PortInfo>, ModbusError> {
    let ports = serialport::available_ports()?;

    Ok(ports
        .into_iter()
        .map(|port| match port.port_type {
            serialport::SerialPortType::UsbPort(usb_info) => PortInfo {
                name: port.port_name,
                manufacturer: usb_info.manufacturer,
                serial_number: usb_info.serial_number,
            },
            _ => PortInfo {
                name: port.port_name,
                manufacturer: None,
                serial_number: None,
            },
        })
        .collect())
}


#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::modbus::client::{ExchangeOutcome, ModbusMaster};
    use crate::modbus::protocol::{ModbusRequest, BATTERY_VOLTAGE_REGISTER};
    use crate::utils::error::FrameError;
    use serialport::TTYPort;

    /// Returns the far end of a pseudo-terminal and a transport on the near end.
    fn pty_transport(read_timeout: Duration) -> (TTYPort, SerialTransport) {
        let (far, near) = TTYPort::pair().expect("open pty pair");
        (far, SerialTransport::from_port("pty", Box::new(near), read_timeout))
    }

    #[tokio::test]
    async fn test_read_stops_at_max_bytes() {
        let (mut far, mut transport) = pty_transport(Duration::from_millis(500));
        far.write_all(&[0x01, 0x03, 0x02, 0x2D, 0x42, 0x25, 0x25, 0xAA, 0xBB]).unwrap();

        let first = transport.read(7).await.unwrap();
        assert_eq!(first, vec![0x01, 0x03, 0x02, 0x2D, 0x42, 0x25, 0x25]);

        let rest = transport.read(7).await.unwrap();
        assert_eq!(rest, vec![0xAA, 0xBB]);
    }

    #[tokio::test]
    async fn test_read_returns_partial_frame_after_silence() {
        let (mut far, mut transport) = pty_transport(Duration::from_secs(2));
        far.write_all(&[0x01, 0x03, 0x02, 0x2D, 0x42]).unwrap();

        let started = Instant::now();
        let bytes = transport.read(7).await.unwrap();
        assert_eq!(bytes, vec![0x01, 0x03, 0x02, 0x2D, 0x42]);
        // The inter-byte gap ends the read, not the overall budget.
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_read_with_no_reply_is_empty() {
        let (_far, mut transport) = pty_transport(Duration::from_millis(100));

        let started = Instant::now();
        let bytes = transport.read(7).await.unwrap();
        assert!(bytes.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(90));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_partial_reply_reaches_master_before_its_timeout() {
        let read_timeout = Duration::from_secs(1);
        let (mut far, transport) = pty_transport(read_timeout);
        far.write_all(&[0x01, 0x03, 0x02, 0x2D, 0x42]).unwrap();

        let mut master = ModbusMaster::new(Box::new(transport))
            .with_response_delay(Duration::ZERO)
            .with_read_timeout(read_timeout + Duration::from_millis(250));
        let request = ModbusRequest::read_holding_register(1, BATTERY_VOLTAGE_REGISTER);

        // A timed-out master would report NoResponse and drop the bytes.
        assert_eq!(
            master.read_register(&request, 0.1).await,
            ExchangeOutcome::InvalidFrame(FrameError::Truncated { expected: 7, actual: 5 })
        );
    }

    #[tokio::test]
    async fn test_lenient_exchange_over_serial_line() {
        let (mut far, transport) = pty_transport(Duration::from_millis(500));
        far.write_all(&[0x01, 0x03, 0x02, 0x2D, 0x42]).unwrap();

        let mut master = ModbusMaster::new(Box::new(transport))
            .with_response_delay(Duration::ZERO)
            .with_strict_validation(false);
        let request = ModbusRequest::read_holding_register(1, BATTERY_VOLTAGE_REGISTER);

        let outcome = master.read_register(&request, 0.1).await;
        assert_eq!(outcome.measurement().unwrap().raw_value, 11586);

        far.set_timeout(Duration::from_secs(1)).unwrap();
        let mut sent = [0u8; 8];
        far.read_exact(&mut sent).unwrap();
        assert_eq!(sent, [0x01, 0x03, 0x01, 0x01, 0x00, 0x01, 0xD4, 0x36]);
    }
}

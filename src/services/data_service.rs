use log::{error, info};

use crate::config::Config;
use crate::devices::{BatteryVoltageSensor, Device};
use crate::modbus::{ExchangeOutcome, ModbusMaster, SerialTransport, Transport};
use crate::output::{formatter_for, ConsoleSender, DataFormatter, DataSender};
use crate::utils::error::ModbusError;

/// Wires the configured sensor, master, formatter and senders together.
pub struct DataService {
    config: Config,
    device: BatteryVoltageSensor,
    master: ModbusMaster,
    formatter: Box<dyn DataFormatter>,
    senders: Vec<Box<dyn DataSender>>,
}

impl DataService {
    /// Opens the configured serial port.
    pub fn new(config: Config) -> Result<Self, ModbusError> {
        let transport = SerialTransport::open(
            &config.serial_port,
            config.baud_rate,
            &config.parity,
            config.read_timeout(),
        )?;
        Self::with_transport(config, Box::new(transport))
    }

    pub fn with_transport(config: Config, transport: Box<dyn Transport>) -> Result<Self, ModbusError> {
        info!("🚀 Initializing Data Service");

        let device = BatteryVoltageSensor::from_config(&config.device);
        info!(
            "📋 Registered '{}' [{}] at slave {} register 0x{:04X}",
            device.name(),
            device.device_type(),
            device.address(),
            device.register_address
        );

        let master = ModbusMaster::new(transport)
            .with_response_delay(config.response_delay())
            .with_read_timeout(config.exchange_timeout())
            .with_strict_validation(config.strict_validation);
        let formatter = formatter_for(&config.output.default_format)?;

        Ok(Self {
            config,
            device,
            master,
            formatter,
            senders: vec![Box::new(ConsoleSender)],
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn device(&self) -> &BatteryVoltageSensor {
        &self.device
    }

    pub fn formatter(&self) -> &dyn DataFormatter {
        self.formatter.as_ref()
    }

    pub fn set_formatter(&mut self, formatter: Box<dyn DataFormatter>) {
        self.formatter = formatter;
    }

    pub fn add_sender(&mut self, sender: Box<dyn DataSender>) {
        info!("📤 Adding {} output: {}", sender.sender_type(), sender.destination());
        self.senders.push(sender);
    }

    pub fn clear_senders(&mut self) {
        self.senders.clear();
    }

    /// Runs one exchange with the device.
    pub async fn read_once(&mut self) -> ExchangeOutcome {
        self.device.read_data(&mut self.master).await
    }

    /// Runs one exchange and hands the formatted result to every sender.
    /// Sender failures are logged; they do not change the outcome.
    pub async fn read_and_publish(&mut self) -> ExchangeOutcome {
        let outcome = self.read_once().await;
        let record = self.formatter.format_outcome(&self.device, &outcome);

        for sender in &self.senders {
            if let Err(e) = sender.send(&record).await {
                error!("❌ Failed to send via {} ({}): {}", sender.sender_type(), sender.destination(), e);
            }
        }

        outcome
    }
}

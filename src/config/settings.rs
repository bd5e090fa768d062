use clap::ArgMatches;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::modbus::protocol::{
    ModbusRequest, BATTERY_VOLTAGE_REGISTER, BATTERY_VOLTAGE_SCALE, DEFAULT_SLAVE_ADDRESS,
};
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Connection settings
    pub serial_port: String,
    pub baud_rate: u32,
    pub parity: ParityConfig,
    pub timeout_ms: u64,
    pub response_delay_ms: u64,

    // Frame handling
    pub strict_validation: bool,

    pub device: DeviceConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub address: u8,
    pub name: String,
    pub register_address: u16,
    pub scale_factor: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub default_format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

impl fmt::Display for ParityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParityConfig::None => write!(f, "no"),
            ParityConfig::Even => write!(f, "even"),
            ParityConfig::Odd => write!(f, "odd"),
        }
    }
}

impl FromStr for ParityConfig {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(ParityConfig::None),
            "even" | "e" => Ok(ParityConfig::Even),
            "odd" | "o" => Ok(ParityConfig::Odd),
            other => Err(ModbusError::ConfigError(format!("Unknown parity: {}", other))),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_SLAVE_ADDRESS,
            name: "Battery Voltage".to_string(),
            register_address: BATTERY_VOLTAGE_REGISTER,
            scale_factor: BATTERY_VOLTAGE_SCALE,
            unit: "V".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: "console".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let serial_port = if cfg!(target_os = "windows") {
            "COM1"
        } else if cfg!(target_os = "macos") {
            "/dev/tty.usbserial-0001"
        } else {
            "/dev/ttyUSB0"
        };

        Self {
            serial_port: serial_port.to_string(),
            baud_rate: 9600,
            parity: ParityConfig::None,
            timeout_ms: 1000,
            response_delay_ms: 100,
            strict_validation: true,
            device: DeviceConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Defaults, then `--config <file>`, then individual flags.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ModbusError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(port) = matches.get_one::<String>("port") {
            config.serial_port = port.clone();
        }
        if let Some(baud) = matches.get_one::<String>("baud") {
            config.baud_rate = parse_arg("baud", baud)?;
        }
        if let Some(parity) = matches.get_one::<String>("parity") {
            config.parity = parity.parse()?;
        }
        if let Some(timeout) = matches.get_one::<String>("timeout") {
            config.timeout_ms = parse_arg("timeout", timeout)?;
        }
        if let Some(delay) = matches.get_one::<String>("delay") {
            config.response_delay_ms = parse_arg("delay", delay)?;
        }
        if let Some(slave) = matches.get_one::<String>("slave") {
            config.device.address = parse_arg("slave", slave)?;
        }
        if let Some(register) = matches.get_one::<String>("register") {
            config.device.register_address = parse_register(register)?;
        }
        if let Some(scale) = matches.get_one::<String>("scale") {
            config.device.scale_factor = parse_arg("scale", scale)?;
        }
        if matches.get_flag("lenient") {
            config.strict_validation = false;
        }
        if let Some(format) = matches.get_one::<String>("format") {
            config.output.default_format = format.clone();
        }

        config.validate()?;
        debug!("Effective configuration: {:?}", config);
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModbusError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ModbusError::ConfigError(format!("Cannot read {}: {}", path.as_ref().display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ModbusError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ModbusError> {
        if !(1..=247).contains(&self.device.address) {
            return Err(ModbusError::ConfigError(format!(
                "Invalid slave address: {}. Must be 1-247",
                self.device.address
            )));
        }
        if self.baud_rate == 0 {
            return Err(ModbusError::ConfigError("Baud rate must be positive".to_string()));
        }
        if !self.device.scale_factor.is_finite() {
            return Err(ModbusError::ConfigError(format!(
                "Invalid scale factor: {}",
                self.device.scale_factor
            )));
        }
        Ok(())
    }

    pub fn request(&self) -> ModbusRequest {
        ModbusRequest::read_holding_register(self.device.address, self.device.register_address)
    }

    /// Budget for the serial read itself.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Outer bound on the master's read; leaves the transport room to return
    /// what it collected before `read_timeout` ran out.
    pub fn exchange_timeout(&self) -> Duration {
        self.read_timeout() + EXCHANGE_TIMEOUT_MARGIN
    }

    pub fn response_delay(&self) -> Duration {
        Duration::from_millis(self.response_delay_ms)
    }
}

const EXCHANGE_TIMEOUT_MARGIN: Duration = Duration::from_millis(250);

fn parse_arg<T: FromStr>(name: &str, value: &str) -> Result<T, ModbusError>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ModbusError::ConfigError(format!("Invalid --{} '{}': {}", name, value, e)))
}

/// Accepts decimal or `0x`-prefixed hex.
pub fn parse_register(value: &str) -> Result<u16, ModbusError> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| ModbusError::ConfigError(format!("Invalid register '{}': {}", value, e)))
}

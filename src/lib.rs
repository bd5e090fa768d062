//! Modbus RTU master for reading a single holding register from a serial slave,
//! such as the battery voltage of a solar charge controller.
//!
//! Frames are built and checked here; moving bytes is delegated to a
//! [`modbus::Transport`], with a serial port implementation included.

pub mod cli;
pub mod config;
pub mod devices;
pub mod modbus;
pub mod output;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use devices::{BatteryVoltageSensor, Device};
pub use modbus::{
    build_request, crc16_modbus, decode_response, validate_frame, ExchangeOutcome, Measurement,
    ModbusMaster, ModbusRequest, RequestFrame, Transport,
};
pub use output::{ConsoleFormatter, CsvFormatter, DataFormatter, JsonFormatter};
pub use services::DataService;
pub use utils::error::{FrameError, ModbusError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

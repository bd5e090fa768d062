pub mod client;
pub mod crc;
pub mod decoder;
pub mod protocol;
pub mod transport;

pub use client::{interpret_response, ExchangeOutcome, ExchangeState, ModbusMaster};
pub use crc::{crc16_modbus, crc_bytes};
pub use decoder::{decode_response, validate_frame, Measurement, ValidatedFrame};
pub use protocol::{build_request, ModbusRequest, RequestFrame};
pub use transport::{list_serial_ports, SerialTransport, Transport};

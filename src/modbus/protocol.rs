use std::fmt;

use super::crc::crc16_modbus;

pub const READ_HOLDING_REGISTERS: u8 = 0x03;

/// Battery voltage register on Renogy-style charge controllers.
pub const BATTERY_VOLTAGE_REGISTER: u16 = 0x0101;
pub const DEFAULT_SLAVE_ADDRESS: u8 = 1;
pub const DEFAULT_REGISTER_COUNT: u16 = 1;
pub const BATTERY_VOLTAGE_SCALE: f64 = 0.1;

/// Address + function code + byte count + CRC.
const RESPONSE_OVERHEAD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModbusRequest {
    ReadHoldingRegisters {
        slave_address: u8,
        register_address: u16,
        register_count: u16,
    },
}

impl ModbusRequest {
    pub fn read_holding_register(slave_address: u8, register_address: u16) -> Self {
        ModbusRequest::ReadHoldingRegisters {
            slave_address,
            register_address,
            register_count: DEFAULT_REGISTER_COUNT,
        }
    }

    pub fn slave_address(&self) -> u8 {
        match self {
            ModbusRequest::ReadHoldingRegisters { slave_address, .. } => *slave_address,
        }
    }

    pub fn function_code(&self) -> u8 {
        match self {
            ModbusRequest::ReadHoldingRegisters { .. } => READ_HOLDING_REGISTERS,
        }
    }

    pub fn register_address(&self) -> u16 {
        match self {
            ModbusRequest::ReadHoldingRegisters { register_address, .. } => *register_address,
        }
    }

    /// Byte count the slave must echo in its response.
    pub fn expected_byte_count(&self) -> usize {
        match self {
            ModbusRequest::ReadHoldingRegisters { register_count, .. } => *register_count as usize * 2,
        }
    }

    /// Full length of a well-formed response, CRC included.
    pub fn expected_response_len(&self) -> usize {
        RESPONSE_OVERHEAD + self.expected_byte_count()
    }

    pub fn to_frame(&self) -> RequestFrame {
        match *self {
            ModbusRequest::ReadHoldingRegisters {
                slave_address,
                register_address,
                register_count,
            } => {
                let mut bytes = [
                    slave_address,
                    READ_HOLDING_REGISTERS,
                    (register_address >> 8) as u8,
                    (register_address & 0xFF) as u8,
                    (register_count >> 8) as u8,
                    (register_count & 0xFF) as u8,
                    0,
                    0,
                ];

                let crc = crc16_modbus(&bytes[..6]);
                bytes[6] = (crc & 0xFF) as u8; // CRC low byte
                bytes[7] = (crc >> 8) as u8; // CRC high byte

                RequestFrame(bytes)
            }
        }
    }
}

/// Read Holding Registers (0x03) for a single register.
pub fn build_request(slave_address: u8, register_address: u16) -> RequestFrame {
    ModbusRequest::read_holding_register(slave_address, register_address).to_frame()
}

/// An 8-byte RTU request ready for the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFrame([u8; 8]);

impl RequestFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn crc(&self) -> u16 {
        u16::from_le_bytes([self.0[6], self.0[7]])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for RequestFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for RequestFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|b| format!("{:02X}", b)).collect();
        write!(f, "{}", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_battery_voltage_request() {
        let frame = build_request(1, 0x0101);
        assert_eq!(frame.as_bytes(), &[0x01, 0x03, 0x01, 0x01, 0x00, 0x01, 0xD4, 0x36]);
        assert_eq!(frame.len(), 8);
        assert_eq!(frame.crc(), 0x36D4);
    }

    #[test]
    fn test_build_request_is_deterministic() {
        assert_eq!(build_request(1, 0x0101), build_request(1, 0x0101));
    }

    #[test]
    fn test_build_request_big_endian_address() {
        let frame = build_request(0x11, 0xABCD);
        assert_eq!(&frame.as_bytes()[..6], &[0x11, 0x03, 0xAB, 0xCD, 0x00, 0x01]);
    }

    #[test]
    fn test_general_request_preserves_layout() {
        let request = ModbusRequest::ReadHoldingRegisters {
            slave_address: 1,
            register_address: 0x00F4,
            register_count: 1,
        };
        let frame = request.to_frame();
        assert_eq!(frame.as_bytes(), &[0x01, 0x03, 0x00, 0xF4, 0x00, 0x01, 0xC5, 0xF8]);
        assert_eq!(request.expected_response_len(), 7);
        assert_eq!(request.expected_byte_count(), 2);
    }

    #[test]
    fn test_request_frame_display() {
        let frame = build_request(1, BATTERY_VOLTAGE_REGISTER);
        assert_eq!(frame.to_string(), "01 03 01 01 00 01 D4 36");
        assert_eq!(frame.to_hex(), "010301010001d436");
    }
}

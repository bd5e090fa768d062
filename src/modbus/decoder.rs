use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;

use super::crc::crc16_modbus;
use super::protocol::ModbusRequest;
use crate::utils::error::FrameError;

/// Address, function code, byte count and one register's worth of data.
pub const MIN_RESPONSE_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub slave_address: u8,
    pub raw_value: u16,
    #[serde(rename = "value")]
    pub scaled_value: f64,
    pub scale_factor: f64,
    pub timestamp: DateTime<Utc>,
}

impl Measurement {
    pub fn new(slave_address: u8, raw_value: u16, scale_factor: f64) -> Self {
        Self {
            slave_address,
            raw_value,
            scaled_value: raw_value as f64 * scale_factor,
            scale_factor,
            timestamp: Utc::now(),
        }
    }

    /// Decimals in the shortest form of the scale factor
    /// (0.1 -> 1, 0.25 -> 2, 1.5 -> 1, 2 -> 0).
    pub fn precision(&self) -> usize {
        let scale = self.scale_factor.abs().to_string();
        scale.split_once('.').map_or(0, |(_, decimals)| decimals.len())
    }
}

/// Lenient decode: trusts the byte offsets once at least five bytes arrived.
/// Neither the CRC nor the echoed header is checked.
pub fn decode_response(frame: Option<&[u8]>, scale_factor: f64) -> Option<Measurement> {
    let frame = frame?;
    if frame.len() < MIN_RESPONSE_LEN {
        debug!("Response too short to decode: {} bytes", frame.len());
        return None;
    }

    let raw_value = ((frame[3] as u16) << 8) | frame[4] as u16;
    Some(Measurement::new(frame[0], raw_value, scale_factor))
}

/// A response whose length, CRC and header fields match the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFrame {
    slave_address: u8,
    data: Vec<u8>,
}

impl ValidatedFrame {
    pub fn slave_address(&self) -> u8 {
        self.slave_address
    }

    /// Register payload, big-endian, without header or CRC.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn register_value(&self) -> u16 {
        u16::from_be_bytes([self.data[0], self.data[1]])
    }

    pub fn decode(&self, scale_factor: f64) -> Measurement {
        Measurement::new(self.slave_address, self.register_value(), scale_factor)
    }
}

pub fn validate_frame(frame: &[u8], request: &ModbusRequest) -> Result<ValidatedFrame, FrameError> {
    let expected_len = request.expected_response_len();
    if frame.len() < expected_len {
        return Err(FrameError::Truncated {
            expected: expected_len,
            actual: frame.len(),
        });
    }
    if frame.len() > expected_len {
        warn!(
            "Response carries {} trailing bytes, checking the first {} only",
            frame.len() - expected_len,
            expected_len
        );
    }
    let frame = &frame[..expected_len];

    let data_len = frame.len() - 2;
    let calculated = crc16_modbus(&frame[..data_len]);
    let received = u16::from_le_bytes([frame[data_len], frame[data_len + 1]]);
    if calculated != received {
        return Err(FrameError::CrcMismatch { calculated, received });
    }

    if frame[0] != request.slave_address() {
        return Err(FrameError::AddressMismatch {
            expected: request.slave_address(),
            actual: frame[0],
        });
    }

    if frame[1] != request.function_code() {
        return Err(FrameError::FunctionMismatch {
            expected: request.function_code(),
            actual: frame[1],
        });
    }

    let expected_count = request.expected_byte_count() as u8;
    if frame[2] != expected_count {
        return Err(FrameError::ByteCountMismatch {
            expected: expected_count,
            actual: frame[2],
        });
    }

    Ok(ValidatedFrame {
        slave_address: frame[0],
        data: frame[3..data_len].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::protocol::BATTERY_VOLTAGE_REGISTER;

    const GOOD_RESPONSE: [u8; 7] = [0x01, 0x03, 0x02, 0x2D, 0x42, 0x25, 0x25];

    fn battery_request() -> ModbusRequest {
        ModbusRequest::read_holding_register(1, BATTERY_VOLTAGE_REGISTER)
    }

    #[test]
    fn test_decode_response_scales_raw_value() {
        let m = decode_response(Some(&GOOD_RESPONSE), 0.1).unwrap();
        assert_eq!(m.raw_value, 0x2D42);
        assert_eq!(m.raw_value, 11586);
        assert!((m.scaled_value - 1158.6).abs() < 1e-9);
        assert_eq!(m.slave_address, 1);
    }

    #[test]
    fn test_decode_response_rejects_short_frames() {
        assert!(decode_response(None, 0.1).is_none());
        for len in 0..MIN_RESPONSE_LEN {
            assert!(decode_response(Some(&GOOD_RESPONSE[..len]), 0.1).is_none());
        }
    }

    #[test]
    fn test_decode_response_accepts_five_bytes() {
        let m = decode_response(Some(&GOOD_RESPONSE[..5]), 0.1).unwrap();
        assert_eq!(m.raw_value, 11586);
    }

    #[test]
    fn test_decode_response_ignores_crc() {
        let frame = [0x01, 0x03, 0x02, 0x00, 0xF1, 0x00, 0x00];
        let m = decode_response(Some(&frame), 0.1).unwrap();
        assert!((m.scaled_value - 24.1).abs() < 1e-9);
    }

    #[test]
    fn test_validate_frame_accepts_good_response() {
        let validated = validate_frame(&GOOD_RESPONSE, &battery_request()).unwrap();
        assert_eq!(validated.slave_address(), 1);
        assert_eq!(validated.data(), &[0x2D, 0x42]);
        assert_eq!(validated.register_value(), 11586);

        let m = validated.decode(0.1);
        assert!((m.scaled_value - 1158.6).abs() < 1e-9);
    }

    #[test]
    fn test_validate_frame_rejects_truncated() {
        let err = validate_frame(&GOOD_RESPONSE[..5], &battery_request()).unwrap_err();
        assert_eq!(err, FrameError::Truncated { expected: 7, actual: 5 });

        let err = validate_frame(&[], &battery_request()).unwrap_err();
        assert_eq!(err, FrameError::Truncated { expected: 7, actual: 0 });
    }

    #[test]
    fn test_validate_frame_rejects_bad_crc() {
        let mut frame = GOOD_RESPONSE;
        frame[4] = 0x43;
        let err = validate_frame(&frame, &battery_request()).unwrap_err();
        assert!(matches!(err, FrameError::CrcMismatch { received: 0x2525, .. }));
    }

    #[test]
    fn test_validate_frame_rejects_wrong_address() {
        let frame = [0x02, 0x03, 0x02, 0x2D, 0x42, 0x61, 0x25];
        let err = validate_frame(&frame, &battery_request()).unwrap_err();
        assert_eq!(err, FrameError::AddressMismatch { expected: 1, actual: 2 });
    }

    #[test]
    fn test_validate_frame_rejects_wrong_function_code() {
        let frame = [0x01, 0x04, 0x02, 0x2D, 0x42, 0x24, 0x51];
        let err = validate_frame(&frame, &battery_request()).unwrap_err();
        assert_eq!(err, FrameError::FunctionMismatch { expected: 0x03, actual: 0x04 });
    }

    #[test]
    fn test_validate_frame_rejects_wrong_byte_count() {
        let frame = [0x01, 0x03, 0x04, 0x2D, 0x42, 0xC5, 0x24];
        let err = validate_frame(&frame, &battery_request()).unwrap_err();
        assert_eq!(err, FrameError::ByteCountMismatch { expected: 2, actual: 4 });
    }

    #[test]
    fn test_validate_frame_ignores_trailing_bytes() {
        let mut frame = GOOD_RESPONSE.to_vec();
        frame.push(0xFF);
        let validated = validate_frame(&frame, &battery_request()).unwrap();
        assert_eq!(validated.register_value(), 11586);
    }

    #[test]
    fn test_measurement_precision() {
        assert_eq!(Measurement::new(1, 241, 0.1).precision(), 1);
        assert_eq!(Measurement::new(1, 241, 0.01).precision(), 2);
        assert_eq!(Measurement::new(1, 241, 1.0).precision(), 0);
    }

    #[test]
    fn test_precision_keeps_every_scale_digit() {
        assert_eq!(Measurement::new(1, 1, 0.25).precision(), 2);
        assert_eq!(Measurement::new(1, 1, 0.05).precision(), 2);
        assert_eq!(Measurement::new(1, 1, 1.5).precision(), 1);
        assert_eq!(Measurement::new(1, 1, 2.0).precision(), 0);
        assert_eq!(Measurement::new(1, 1, -0.5).precision(), 1);
    }
}

/// CRC-16/MODBUS: reflected polynomial 0xA001, initial value 0xFFFF, no final XOR.
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    let poly: u16 = 0xA001;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ poly;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// CRC in wire order: low byte first, high byte second.
pub fn crc_bytes(data: &[u8]) -> [u8; 2] {
    crc16_modbus(data).to_le_bytes()
}

use async_trait::async_trait;

use crate::config::DeviceConfig;
use crate::modbus::protocol::{ModbusRequest, BATTERY_VOLTAGE_REGISTER, BATTERY_VOLTAGE_SCALE};

use super::traits::Device;

/// Battery voltage register of a solar charge controller (Renogy Wanderer and similar).
#[derive(Debug, Clone)]
pub struct BatteryVoltageSensor {
    pub address: u8,
    pub name: String,
    pub register_address: u16,
    pub scale_factor: f64,
    pub unit: String,
}

impl BatteryVoltageSensor {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            name: "Battery Voltage".to_string(),
            register_address: BATTERY_VOLTAGE_REGISTER,
            scale_factor: BATTERY_VOLTAGE_SCALE,
            unit: "V".to_string(),
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            address: config.address,
            name: config.name.clone(),
            register_address: config.register_address,
            scale_factor: config.scale_factor,
            unit: config.unit.clone(),
        }
    }
}

#[async_trait]
impl Device for BatteryVoltageSensor {
    fn device_type(&self) -> &str {
        "ChargeController"
    }

    fn address(&self) -> u8 {
        self.address
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn unit(&self) -> &str {
        &self.unit
    }

    fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    fn request(&self) -> ModbusRequest {
        ModbusRequest::read_holding_register(self.address, self.register_address)
    }
}

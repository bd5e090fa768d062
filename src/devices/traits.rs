use async_trait::async_trait;

use crate::modbus::{ExchangeOutcome, ModbusMaster, ModbusRequest};

/// A single-register quantity exposed by a Modbus slave.
#[async_trait]
pub trait Device: Send + Sync {
    fn device_type(&self) -> &str;
    fn address(&self) -> u8;
    fn name(&self) -> &str;
    fn unit(&self) -> &str;
    fn scale_factor(&self) -> f64;
    fn request(&self) -> ModbusRequest;

    async fn read_data(&self, master: &mut ModbusMaster) -> ExchangeOutcome {
        master.read_register(&self.request(), self.scale_factor()).await
    }
}

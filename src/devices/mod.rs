pub mod battery;
pub mod traits;

pub use battery::BatteryVoltageSensor;
pub use traits::Device;

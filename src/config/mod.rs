pub mod settings;

pub use settings::{Config, DeviceConfig, OutputConfig, ParityConfig};

use chrono::Utc;
use log::error;
use serde_json::{json, Value};

use crate::devices::Device;
use crate::modbus::ExchangeOutcome;
use crate::utils::error::ModbusError;

pub trait DataFormatter: Send + Sync {
    fn format_outcome(&self, device: &dyn Device, outcome: &ExchangeOutcome) -> String;

    fn format_header(&self) -> String {
        String::new()
    }
}

pub fn formatter_for(name: &str) -> Result<Box<dyn DataFormatter>, ModbusError> {
    match name {
        "console" => Ok(Box::new(ConsoleFormatter)),
        "json" => Ok(Box::new(JsonFormatter)),
        "csv" => Ok(Box::new(CsvFormatter)),
        other => Err(ModbusError::ConfigError(format!("Unknown output format: {}", other))),
    }
}

fn status(outcome: &ExchangeOutcome) -> &'static str {
    match outcome {
        ExchangeOutcome::Measurement(_) => "ok",
        ExchangeOutcome::NoResponse => "no_response",
        ExchangeOutcome::InvalidFrame(_) => "invalid_frame",
        ExchangeOutcome::TransportError(_) => "transport_error",
    }
}

pub struct ConsoleFormatter;

impl DataFormatter for ConsoleFormatter {
    fn format_outcome(&self, device: &dyn Device, outcome: &ExchangeOutcome) -> String {
        match outcome {
            ExchangeOutcome::Measurement(m) => format!(
                "{} from slave {}: {:.*} {}",
                device.name(),
                device.address(),
                m.precision(),
                m.scaled_value,
                device.unit()
            ),
            other => {
                let mut line = format!(
                    "Failed to read {} from slave {}",
                    device.name().to_lowercase(),
                    device.address()
                );
                if let Some(reason) = other.failure_reason() {
                    line.push_str(&format!(" ({})", reason));
                }
                line
            }
        }
    }
}

pub struct JsonFormatter;

impl JsonFormatter {
    pub fn to_value(&self, device: &dyn Device, outcome: &ExchangeOutcome) -> Value {
        let mut value = json!({
            "slave_address": device.address(),
            "device_type": device.device_type(),
            "parameter": device.name(),
            "unit": device.unit(),
            "status": status(outcome),
        });

        match outcome {
            ExchangeOutcome::Measurement(m) => match serde_json::to_value(m) {
                Ok(Value::Object(fields)) => {
                    if let Some(record) = value.as_object_mut() {
                        record.extend(fields);
                    }
                }
                Ok(other) => error!("❌ Unexpected measurement encoding: {}", other),
                Err(e) => error!("❌ Failed to encode measurement: {}", e),
            },
            other => {
                value["error"] = json!(other.failure_reason());
                value["timestamp"] = json!(Utc::now().to_rfc3339());
            }
        }
        value
    }
}

impl DataFormatter for JsonFormatter {
    fn format_outcome(&self, device: &dyn Device, outcome: &ExchangeOutcome) -> String {
        format!("{:#}", self.to_value(device, outcome))
    }
}

pub struct CsvFormatter;

impl DataFormatter for CsvFormatter {
    fn format_outcome(&self, device: &dyn Device, outcome: &ExchangeOutcome) -> String {
        match outcome {
            ExchangeOutcome::Measurement(m) => format!(
                "{},{},{},{},{},{:.*},{}",
                m.timestamp.to_rfc3339(),
                device.address(),
                device.name(),
                status(outcome),
                m.raw_value,
                m.precision(),
                m.scaled_value,
                device.unit()
            ),
            other => format!(
                "{},{},{},{},,,{}",
                Utc::now().to_rfc3339(),
                device.address(),
                device.name(),
                status(other),
                device.unit()
            ),
        }
    }

    fn format_header(&self) -> String {
        "timestamp,slave_address,parameter,status,raw_value,value,unit".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::BatteryVoltageSensor;
    use crate::modbus::Measurement;
    use crate::utils::error::FrameError;

    #[test]
    fn test_console_success_line() {
        let sensor = BatteryVoltageSensor::new(1);
        let outcome = ExchangeOutcome::Measurement(Measurement::new(1, 241, 0.1));
        assert_eq!(
            ConsoleFormatter.format_outcome(&sensor, &outcome),
            "Battery Voltage from slave 1: 24.1 V"
        );
    }

    #[test]
    fn test_console_rounds_to_scale_precision() {
        let sensor = BatteryVoltageSensor::new(1);
        let outcome = ExchangeOutcome::Measurement(Measurement::new(1, 11586, 0.1));
        assert_eq!(
            ConsoleFormatter.format_outcome(&sensor, &outcome),
            "Battery Voltage from slave 1: 1158.6 V"
        );
    }

    #[test]
    fn test_console_keeps_fine_scale_digits() {
        let sensor = BatteryVoltageSensor::new(1);
        let quarter = ExchangeOutcome::Measurement(Measurement::new(1, 1, 0.25));
        assert_eq!(
            ConsoleFormatter.format_outcome(&sensor, &quarter),
            "Battery Voltage from slave 1: 0.25 V"
        );

        let coarse = ExchangeOutcome::Measurement(Measurement::new(1, 1, 1.5));
        assert_eq!(
            ConsoleFormatter.format_outcome(&sensor, &coarse),
            "Battery Voltage from slave 1: 1.5 V"
        );
    }

    #[test]
    fn test_console_failure_line() {
        let sensor = BatteryVoltageSensor::new(1);
        assert_eq!(
            ConsoleFormatter.format_outcome(&sensor, &ExchangeOutcome::NoResponse),
            "Failed to read battery voltage from slave 1 (no response)"
        );

        let outcome = ExchangeOutcome::InvalidFrame(FrameError::AddressMismatch { expected: 1, actual: 2 });
        assert!(ConsoleFormatter
            .format_outcome(&sensor, &outcome)
            .starts_with("Failed to read battery voltage from slave 1 (unexpected slave address"));
    }

    #[test]
    fn test_json_outcome() {
        let sensor = BatteryVoltageSensor::new(1);
        let outcome = ExchangeOutcome::Measurement(Measurement::new(1, 241, 0.1));
        let value = JsonFormatter.to_value(&sensor, &outcome);
        assert_eq!(value["status"], "ok");
        assert_eq!(value["raw_value"], 241);
        assert_eq!(value["unit"], "V");
        assert_eq!(value["scale_factor"], 0.1);
        assert!((value["value"].as_f64().unwrap() - 24.1).abs() < 1e-9);
        assert!(value["timestamp"].is_string());

        let failed = JsonFormatter.to_value(&sensor, &ExchangeOutcome::TransportError("Write failed".to_string()));
        assert_eq!(failed["status"], "transport_error");
        assert_eq!(failed["error"], "Write failed");
        assert!(failed.get("value").is_none());
    }

    #[test]
    fn test_json_record_is_pretty_printed() {
        let sensor = BatteryVoltageSensor::new(1);
        let outcome = ExchangeOutcome::Measurement(Measurement::new(1, 241, 0.1));
        let text = JsonFormatter.format_outcome(&sensor, &outcome);

        assert!(text.starts_with("{\n"));
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["parameter"], "Battery Voltage");
        assert_eq!(parsed["raw_value"], 241);
    }

    #[test]
    fn test_csv_row_matches_header() {
        let sensor = BatteryVoltageSensor::new(1);
        let outcome = ExchangeOutcome::Measurement(Measurement::new(1, 241, 0.1));
        let row = CsvFormatter.format_outcome(&sensor, &outcome);
        let header = CsvFormatter.format_header();

        assert_eq!(row.split(',').count(), header.split(',').count());
        assert!(row.ends_with(",1,Battery Voltage,ok,241,24.1,V"));

        let failed = CsvFormatter.format_outcome(&sensor, &ExchangeOutcome::NoResponse);
        assert_eq!(failed.split(',').count(), header.split(',').count());
    }

    #[test]
    fn test_formatter_for_unknown_format() {
        assert!(formatter_for("xml").is_err());
        assert!(formatter_for("json").is_ok());
    }
}

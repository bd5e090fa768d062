use clap::{Arg, ArgAction, ArgMatches, Command};
use log::info;

use crate::config::Config;
use crate::devices::BatteryVoltageSensor;
use crate::modbus::{crc16_modbus, interpret_response, list_serial_ports, ExchangeOutcome};
use crate::output::{formatter_for, FileSender};
use crate::services::DataService;
use crate::utils::error::ModbusError;

pub fn build_cli() -> Command {
    Command::new("battery_modbus")
        .version(crate::VERSION)
        .about("Reads battery voltage from a Modbus RTU charge controller")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .global(true)
                .help("Serial port, e.g. /dev/ttyUSB0 or COM3"),
        )
        .arg(
            Arg::new("baud")
                .short('b')
                .long("baud")
                .value_name("RATE")
                .global(true)
                .help("Baud rate [default: 9600]"),
        )
        .arg(
            Arg::new("parity")
                .long("parity")
                .value_name("none|even|odd")
                .global(true)
                .help("Serial parity [default: none]"),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("MS")
                .global(true)
                .help("Read timeout in milliseconds [default: 1000]"),
        )
        .arg(
            Arg::new("delay")
                .long("delay")
                .value_name("MS")
                .global(true)
                .help("Wait between request and read in milliseconds [default: 100]"),
        )
        .arg(
            Arg::new("slave")
                .short('s')
                .long("slave")
                .value_name("ADDR")
                .global(true)
                .help("Slave address 1-247 [default: 1]"),
        )
        .arg(
            Arg::new("register")
                .short('r')
                .long("register")
                .value_name("ADDR")
                .global(true)
                .help("Holding register, decimal or 0x hex [default: 0x0101]"),
        )
        .arg(
            Arg::new("scale")
                .long("scale")
                .value_name("FACTOR")
                .global(true)
                .help("Scale factor applied to the raw value [default: 0.1]"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_parser(["console", "json", "csv"])
                .global(true)
                .help("Output format [default: console]"),
        )
        .arg(
            Arg::new("output-file")
                .short('o')
                .long("output-file")
                .value_name("FILE")
                .global(true)
                .help("Also append results to this file"),
        )
        .arg(
            Arg::new("lenient")
                .long("lenient")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Decode any frame of 5+ bytes without CRC or header checks"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Debug logging, including raw frames"),
        )
        .subcommand(Command::new("read").about("Read the register once (default)"))
        .subcommand(Command::new("ports").about("List available serial ports"))
        .subcommand(Command::new("frame").about("Print the request frame without sending it"))
        .subcommand(
            Command::new("crc")
                .about("Compute CRC-16/MODBUS of hex bytes")
                .arg(Arg::new("hex").required(true).num_args(1..).help("Bytes, e.g. 01 03 01 01 00 01")),
        )
        .subcommand(
            Command::new("decode")
                .about("Decode a captured response frame")
                .arg(Arg::new("hex").required(true).num_args(1..).help("Bytes, e.g. 01 03 02 00 F1 79 C0")),
        )
        .subcommand(
            Command::new("config")
                .about("Configuration file helpers")
                .subcommand_required(true)
                .subcommand(
                    Command::new("init")
                        .about("Write the effective configuration to a TOML file")
                        .arg(Arg::new("path").required(true)),
                ),
        )
}

/// Runs the selected subcommand. Returns whether it produced a usable result.
pub async fn handle_subcommands(matches: &ArgMatches) -> Result<bool, ModbusError> {
    match matches.subcommand() {
        Some(("ports", _)) => {
            print_ports()?;
            Ok(true)
        }
        Some(("frame", sub)) => {
            let config = Config::from_matches(sub)?;
            println!("{}", frame_report(&config));
            Ok(true)
        }
        Some(("crc", sub)) => {
            let bytes = parse_hex_bytes(hex_args(sub))?;
            println!("{}", crc_report(&bytes));
            Ok(true)
        }
        Some(("decode", sub)) => {
            let config = Config::from_matches(sub)?;
            let bytes = parse_hex_bytes(hex_args(sub))?;
            let (report, outcome) = decode_report(&bytes, &config)?;
            println!("{}", report);
            Ok(outcome.is_success())
        }
        Some(("config", sub)) => match sub.subcommand() {
            Some(("init", init)) => {
                let config = Config::from_matches(init)?;
                let path = init
                    .get_one::<String>("path")
                    .ok_or_else(|| ModbusError::ConfigError("Missing path".to_string()))?;
                config.save_to_file(path)?;
                println!("Configuration written to {}", path);
                Ok(true)
            }
            _ => Err(ModbusError::ConfigError("Unknown config subcommand".to_string())),
        },
        Some(("read", sub)) => read(sub).await,
        _ => read(matches).await,
    }
}

async fn read(matches: &ArgMatches) -> Result<bool, ModbusError> {
    let config = Config::from_matches(matches)?;
    info!("🔍 Reading {} from slave {}", config.device.name, config.device.address);

    let mut service = DataService::new(config)?;
    if let Some(path) = matches.get_one::<String>("output-file") {
        let header = service.formatter().format_header();
        service.add_sender(Box::new(FileSender::new(path).with_header(header)));
    }

    let outcome = service.read_and_publish().await;
    Ok(outcome.is_success())
}

fn print_ports() -> Result<(), ModbusError> {
    let ports = list_serial_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }

    println!("Available serial ports:");
    for (index, port) in ports.iter().enumerate() {
        println!("  {}. {}", index + 1, port.name);
        if let Some(manufacturer) = &port.manufacturer {
            println!("     Manufacturer: {}", manufacturer);
        }
        if let Some(serial_number) = &port.serial_number {
            println!("     Serial Number: {}", serial_number);
        }
    }
    Ok(())
}

fn hex_args(matches: &ArgMatches) -> Vec<String> {
    matches
        .get_many::<String>("hex")
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

/// Accepts `0103`, `01 03`, `0x01,0x03` and mixes of them.
pub fn parse_hex_bytes<S: AsRef<str>>(parts: impl IntoIterator<Item = S>) -> Result<Vec<u8>, ModbusError> {
    let mut digits = String::new();
    for part in parts {
        for token in part.as_ref().split(|c: char| c.is_whitespace() || c == ',') {
            let token = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")).unwrap_or(token);
            digits.push_str(token);
        }
    }
    Ok(hex::decode(digits)?)
}

pub fn crc_report(bytes: &[u8]) -> String {
    let crc = crc16_modbus(bytes);
    format!(
        "CRC-16/MODBUS: 0x{:04X} (wire order: {:02X} {:02X})",
        crc,
        crc & 0xFF,
        crc >> 8
    )
}

pub fn frame_report(config: &Config) -> String {
    let frame = config.request().to_frame();
    format!(
        "Request for slave {} register 0x{:04X}: {}",
        config.device.address, config.device.register_address, frame
    )
}

pub fn decode_report(bytes: &[u8], config: &Config) -> Result<(String, ExchangeOutcome), ModbusError> {
    let device = BatteryVoltageSensor::from_config(&config.device);
    let outcome = interpret_response(
        bytes,
        &config.request(),
        config.device.scale_factor,
        config.strict_validation,
    );
    let formatter = formatter_for(&config.output.default_format)?;
    Ok((formatter.format_outcome(&device, &outcome), outcome))
}

use anyhow::Result;
use log::{debug, error};

use battery_modbus::cli::{build_cli, handle_subcommands};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let default_filter = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    debug!("🖥️  battery_modbus {}", battery_modbus::VERSION);

    match handle_subcommands(&matches).await {
        Ok(true) => Ok(()),
        // The reason was already reported on stdout.
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("❌ {}", e);
            Err(e.into())
        }
    }
}

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use clap::{Parser, Subcommand};
use log::{info, warn};
use swell::config::io::ConfigIO;
use swell::config::types::Config;
use swell::device::btle::BtleTransport;
use swell::device::manager::ConnectionManager;
use swell::device::types::{LedCommand, PeripheralRef};
use swell::init_logging;

#[derive(Parser, Debug)]
#[command(author, version)]
#[command(about = "Finds and controls Swell lamps without the GUI.\n\nExample: swell-cli on --name ESP32-LED", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: CliCommand,

    /// How long to scan for peripherals, in milliseconds. Defaults to the value in the config file.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Read settings from this config file instead of the one used by the GUI.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// List nearby bluetooth peripherals that advertise a name
    Scan,
    /// Print the status reported by the lamp
    Status(Target),
    /// Turn the lamp on
    On(Target),
    /// Turn the lamp off
    Off(Target),
}

#[derive(clap::Args, Debug)]
struct Target {
    /// Identifier of the peripheral, as printed by `scan`
    #[arg(long, conflicts_with = "name")]
    device: Option<String>,

    /// Advertised name of the lamp. Defaults to the lamp used most recently.
    #[arg(long)]
    name: Option<String>,
}

fn select_target<'a>(devices: &'a [PeripheralRef], target: &Target, preferred_name: &str) -> Option<&'a PeripheralRef> {
    if let Some(id) = &target.device {
        return devices.iter().find(|p| p.id.0 == *id);
    }

    let name = target.name.as_deref().unwrap_or(preferred_name);
    devices.iter().find(|p| p.name.as_deref() == Some(name))
}

async fn load_config(path: Option<PathBuf>) -> Config {
    let config_io = match path {
        Some(path) => ConfigIO::open(&path),
        None => ConfigIO::new_sync(),
    };

    let result = match config_io {
        Ok(config_io) => config_io.read().await,
        Err(err) => Err(err),
    };

    result.unwrap_or_else(|err| {
        warn!("Failed to load config, using defaults: {}", err);
        Config::default()
    })
}

async fn run_on_target(manager: &ConnectionManager, peripheral: &PeripheralRef, command: &CliCommand) -> Result<(), Box<dyn Error>> {
    match command {
        CliCommand::Status(_) => {
            let status = manager.read_status().await.ok_or("Failed to read the lamp status")?;
            println!("{}", status.0);
        },
        CliCommand::On(_) | CliCommand::Off(_) => {
            let led = LedCommand::from_bool(matches!(command, CliCommand::On(_)));
            if !manager.send_command(led).await {
                return Err(format!("{} did not accept the command", peripheral.display_name()).into());
            }
            println!("{} turned {}", peripheral.display_name(), led.command);
        },
        CliCommand::Scan => {},
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging();
    let args = Args::parse();

    let config = load_config(args.config.clone()).await;
    let timeout = Duration::from_millis(args.timeout_ms.unwrap_or(config.scan_timeout_ms));

    let transport = Arc::new(BtleTransport::new().await?);
    let manager = ConnectionManager::new(transport.clone(), transport);

    let devices = manager.scan(timeout).await;

    let target = match &args.command {
        CliCommand::Scan => {
            for peripheral in &devices {
                let rssi = peripheral.rssi.map(|rssi| format!("{} dBm", rssi)).unwrap_or_default();
                println!("{}\t{}\t{}", peripheral.id, peripheral.display_name(), rssi);
            }
            return Ok(());
        },
        CliCommand::Status(target) | CliCommand::On(target) | CliCommand::Off(target) => target,
    };

    let peripheral = select_target(&devices, target, &config.preferred_device)
        .ok_or("Lamp not found. Is it powered on, and is Bluetooth access allowed?")?;

    info!("Using {} ({})", peripheral.display_name(), peripheral.id);
    if !manager.connect(&peripheral.id).await {
        return Err(format!("Could not connect to {}", peripheral.display_name()).into());
    }

    let result = run_on_target(&manager, peripheral, &args.command).await;
    manager.disconnect().await;
    result
}

#[cfg(test)]
mod tests {
    use swell::device::types::PeripheralId;
    use super::*;

    fn devices() -> Vec<PeripheralRef> {
        vec![
            PeripheralRef { id: "aa".into(), name: Some("OtherDevice".to_string()), rssi: Some(-90) },
            PeripheralRef { id: "bb".into(), name: Some("ESP32-LED".to_string()), rssi: Some(-55) },
        ]
    }

    #[test]
    fn target_by_id_name_and_preference() {
        let devices = devices();

        let by_id = Target { device: Some("aa".to_string()), name: None };
        assert_eq!(select_target(&devices, &by_id, "ESP32-LED").unwrap().id, PeripheralId::from("aa"));

        let by_name = Target { device: None, name: Some("OtherDevice".to_string()) };
        assert_eq!(select_target(&devices, &by_name, "ESP32-LED").unwrap().id, PeripheralId::from("aa"));

        let preferred = Target { device: None, name: None };
        assert_eq!(select_target(&devices, &preferred, "ESP32-LED").unwrap().id, PeripheralId::from("bb"));

        let missing = Target { device: Some("zz".to_string()), name: None };
        assert!(select_target(&devices, &missing, "ESP32-LED").is_none());
    }

    #[test]
    fn parses_arguments() {
        let args = Args::try_parse_from(["swell-cli", "on", "--name", "ESP32-LED", "--timeout-ms", "2000"]).unwrap();
        assert_eq!(args.timeout_ms, Some(2000));
        assert!(matches!(args.command, CliCommand::On(Target { name: Some(_), device: None })));

        assert!(Args::try_parse_from(["swell-cli", "off", "--name", "a", "--device", "b"]).is_err());
    }
}

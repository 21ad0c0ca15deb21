//! rust-usb-msd Host
//!
//! Command-line front end for the mass-storage host library: discovers
//! attached USB mass-storage devices, lists the matched interfaces, and
//! optionally probes them end to end (claim, set up, query Max LUN, release).

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use host::storage::NullBlockFactory;
use host::usb::{DeviceFilter, RusbHost, Session, discover};
use host::{HostConfig, load_config, setup_logging};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "usb-msd-host")]
#[command(
    author,
    version,
    about = "USB mass-storage host - discover and claim storage devices"
)]
#[command(long_about = "
Discovers attached USB mass-storage devices using the bulk-only transport
and manages exclusive access to them.

EXAMPLES:
    # List matched mass-storage interfaces
    usb-msd-host

    # Probe every matched device: claim, set up, query Max LUN, release
    usb-msd-host --probe

    # Probe one device by bus number and address
    usb-msd-host --probe --device 1:4

    # Run with custom config
    usb-msd-host --config /path/to/host.toml

    # Run with debug logging
    usb-msd-host --log-level debug

CONFIGURATION:
    The host looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/rust-usb-msd/host.toml
    3. /etc/rust-usb-msd/host.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Claim and set up each matched device instead of just listing
    #[arg(long)]
    probe: bool,

    /// Only consider the device at BUS:ADDR (e.g., 1:4)
    #[arg(short, long, value_name = "BUS:ADDR")]
    device: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = HostConfig::default();
        let path = HostConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    // Load configuration first (to get log level from config if not specified)
    let config = if let Some(ref path) = args.config {
        load_config(path).context("Failed to load configuration")?
    } else {
        HostConfig::load_or_default()
    };

    // Use CLI log level if specified, otherwise use config value
    let log_level = args.log_level.as_deref().unwrap_or(&config.host.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("rust-usb-msd Host v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let selector = args
        .device
        .as_deref()
        .map(parse_device_selector)
        .transpose()?;

    let host = RusbHost::new().context("Failed to initialize USB host")?;
    let filter = DeviceFilter::new(config.usb.filters.clone());

    let mut sessions = discover(&host, &filter).context("Device discovery failed")?;
    if let Some((bus, address)) = selector {
        sessions.retain(|session| {
            session.device().bus_number == bus && session.device().device_address == address
        });
    }

    if sessions.is_empty() {
        println!("No mass-storage devices found.");
        return Ok(());
    }

    if args.probe {
        probe_devices(&host, sessions, &config)
    } else {
        list_devices(&sessions);
        Ok(())
    }
}

/// Parse a BUS:ADDR device selector
fn parse_device_selector(selector: &str) -> Result<(u8, u8)> {
    let (bus, address) = selector.split_once(':').ok_or_else(|| {
        anyhow!(
            "Invalid device selector '{}', expected BUS:ADDR (e.g., 1:4)",
            selector
        )
    })?;

    let bus = bus
        .parse()
        .with_context(|| format!("Invalid bus number '{}'", bus))?;
    let address = address
        .parse()
        .with_context(|| format!("Invalid device address '{}'", address))?;

    Ok((bus, address))
}

/// Print the matched interfaces without touching the devices
fn list_devices(sessions: &[Session]) {
    println!("Found {} mass-storage interface(s):\n", sessions.len());

    for (i, session) in sessions.iter().enumerate() {
        let device = session.device();
        println!(
            "  [{}] {:04x}:{:04x} - {} {}",
            i,
            device.vendor_id,
            device.product_id,
            device
                .manufacturer
                .as_deref()
                .unwrap_or("Unknown Manufacturer"),
            device.product.as_deref().unwrap_or("Unknown Product")
        );
        println!(
            "      Bus {:03} Device {:03} Interface {} Speed: {:?}",
            device.bus_number,
            device.device_address,
            session.interface().number,
            device.speed
        );
        let endpoints = session.endpoints();
        println!(
            "      Endpoints: IN {:#04x} / OUT {:#04x}",
            endpoints.bulk_in.address, endpoints.bulk_out.address
        );
        if let Some(serial) = &device.serial_number {
            println!("      Serial: {}", serial);
        }
        println!();
    }
}

/// Claim, set up, query and release each session in turn
fn probe_devices(host: &RusbHost, sessions: Vec<Session>, config: &HostConfig) -> Result<()> {
    let block_factory = NullBlockFactory;
    let mut failures = 0;

    for mut session in sessions {
        let device = session.device().clone();
        session.set_force_claim(config.usb.detach_kernel_driver);

        println!(
            "Probing {} (interface {})...",
            device,
            session.interface().number
        );

        match session.init(host, &block_factory) {
            Ok(()) => {
                match session.lun_count() {
                    Ok(count) => println!("  Logical units: {}", count),
                    Err(e) => warn!("Could not read LUN count: {}", e),
                }
                match session.close() {
                    Ok(report) if !report.interface_released => {
                        println!("  Released with warnings (interface release failed).");
                    }
                    Ok(_) => println!("  Released."),
                    Err(e) => warn!("Close failed: {}", e),
                }
            }
            Err(e) => {
                failures += 1;
                println!("  Setup failed: {}", e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} device(s) failed to probe", failures);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_selector() {
        assert_eq!(parse_device_selector("1:4").unwrap(), (1, 4));
        assert_eq!(parse_device_selector("0:127").unwrap(), (0, 127));
    }

    #[test]
    fn test_parse_device_selector_rejects_garbage() {
        assert!(parse_device_selector("14").is_err());
        assert!(parse_device_selector("1:").is_err());
        assert!(parse_device_selector("bus:addr").is_err());
        assert!(parse_device_selector("1:999").is_err()); // Out of u8 range
    }
}

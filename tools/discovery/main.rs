//! Serial port discovery tool.
//!
//! Lists every serial port the OS reports, with USB identification where
//! available, and optionally resolves a device hint to a concrete port the
//! way the acquisition core does at startup.
//!
//! Run this once while setting a rig up, not during an active run: port
//! scanning blocks and causes jitter on anything sharing the bus.

use anyhow::{Context, Result};
use clap::Parser;
use tapdaq::transport::lookup_port;

#[derive(Parser)]
#[command(name = "discovery", about = "List serial ports and resolve device hints")]
struct Args {
    /// Resolve this hint (substring of a port name, USB product, or
    /// manufacturer) to a single port and print only that.
    #[arg(long)]
    find: Option<String>,

    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if args.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    if let Some(hint) = &args.find {
        let port = lookup_port(hint)
            .with_context(|| format!("no port matched hint '{hint}'"))?;
        println!("{port}");
        return Ok(());
    }

    let ports = serialport::available_ports().context("failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports detected.");
        return Ok(());
    }

    for info in ports {
        match info.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                println!(
                    "{}  [usb {:04x}:{:04x}]  {} / {}",
                    info.port_name,
                    usb.vid,
                    usb.pid,
                    usb.manufacturer.as_deref().unwrap_or("?"),
                    usb.product.as_deref().unwrap_or("?"),
                );
            }
            other => println!("{}  [{other:?}]", info.port_name),
        }
    }
    Ok(())
}

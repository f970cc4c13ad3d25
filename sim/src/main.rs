//! Test harness CLI: loads one or more Intel-HEX firmware images onto a
//! single emulated device and drives it to completion on a virtual clock by
//! default. Mirrors the role of `device.py`'s `__main__` entrypoint.

use std::path::PathBuf;

use clap::Parser;
use sim::Network;
use sim_region::RegionKind;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sim", about = "Deterministic LoRaWAN end-device simulator")]
struct Cli {
    /// Drive the scheduler on wall-clock time instead of the default virtual clock.
    #[arg(long)]
    wall_clock: bool,

    /// Intel-HEX firmware images to load. Falls back to `TEST_HEXFILES`
    /// (whitespace-separated paths) when empty.
    hexfiles: Vec<PathBuf>,

    /// Maximum number of cooperative CPU steps before giving up.
    #[arg(long, default_value_t = 10_000)]
    max_steps: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let mut cli = Cli::parse();

    if cli.hexfiles.is_empty() {
        if let Ok(env_list) = std::env::var("TEST_HEXFILES") {
            cli.hexfiles = env_list.split_whitespace().map(PathBuf::from).collect();
        }
    }
    if cli.hexfiles.is_empty() {
        return Err(Box::new(sim::SimError::NoFirmware));
    }
    if cli.wall_clock {
        info!("wall-clock mode requested but unimplemented for the CLI harness; using virtual time");
    }

    let network = Network::new_virtual(vec![RegionKind::Eu868, RegionKind::Us915]);
    let mut device = network.new_device()?;
    for path in &cli.hexfiles {
        info!(path = %path.display(), "loading firmware image");
        device.load_hex(path)?;
    }
    device.reset()?;

    for step in 0..cli.max_steps {
        device.step()?;
        if device.is_waiting_for_interrupt() {
            let Some(next) = network.scheduler.lock().unwrap().next_wakeup() else {
                info!(steps = step, "device idle and no pending scheduler work, stopping");
                break;
            };
            network.advance_to(next);
        }
    }

    Ok(())
}

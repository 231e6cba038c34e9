//! automedia - mounts removable block devices on udev events.
//!
//! Invoked once per add/remove event with the kernel device name, usually
//! from `automedia@.service`. Exits 0 when the event was handled, including
//! skips; exits 1 on fatal errors.

mod logging;

use std::path::{Path, PathBuf};
use std::process;

use automedia_core::config::DEFAULT_CONFIG_PATH;
use automedia_core::{Automounter, Config, HostProbe, Outcome, SystemRunner};
use clap::Parser;

/// Automount removable media under the media root.
#[derive(Debug, Parser)]
#[command(name = "automedia", version)]
#[command(about = "Mount or clean up after a removable block device", long_about = None)]
struct Cli {
    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Configuration file. Must exist when given explicitly.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Kernel device name, e.g. `sdb1`.
    device: String,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.debug);

    if let Err(e) = run(&cli) {
        // stderr only; the journal picks it up from there
        eprintln!("{}", exit_message(&e));
        process::exit(1);
    }
}

fn exit_message(e: &automedia_core::Error) -> String {
    format!("automedia: {}", e)
}

fn run(cli: &Cli) -> automedia_core::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path, true)?,
        None => Config::load(Path::new(DEFAULT_CONFIG_PATH), false)?,
    };

    let runner = SystemRunner::new();
    let probe = HostProbe::new();

    // The library logs each step as it happens; only summarise here.
    match Automounter::new(&config, &runner, &probe).handle(&cli.device)? {
        Outcome::Removed { report, .. } if report.is_noop() => {
            log::debug!("{} removed, no mount directory to clean up", cli.device);
        }
        outcome => log::debug!("{}: {:?}", cli.device, outcome),
    }

    Ok(())
}

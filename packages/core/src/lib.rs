//! automedia-core: Core library for automounting removable block devices.
//!
//! The `automedia` binary is started once per udev add/remove event with a
//! kernel device name. This library decides whether the device is ours to
//! mount, where to mount it, and cleans up mount directories once it is gone.
//!
//! # Modules
//!
//! - [`automount`]: The per-event decision pipeline
//! - [`guard`]: Root, root-filesystem and fstab checks
//! - [`allocator`]: Mount directory naming and allocation
//! - [`mount`]: Mount/unmount via the external tools
//! - [`cleanup`]: Sweep of stale mount directories
//! - [`disk`]: Device metadata using `lsblk`
//! - [`fstab`]: Fstab parsing
//! - [`mtab`]: Live mount table parsing
//! - [`hook`]: Declarative per-filesystem mount hooks
//! - [`notify`]: Best-effort desktop open action
//! - [`executor`]: External command capability
//! - [`probe`]: Filesystem metadata capability
//! - [`config`]: Runtime configuration
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use automedia_core::{Automounter, Config, HostProbe, Outcome, SystemRunner};
//!
//! let config = Config::default();
//! let runner = SystemRunner::new();
//! let probe = HostProbe::new();
//!
//! match Automounter::new(&config, &runner, &probe).handle("sdb1") {
//!     Ok(Outcome::Mounted(dir)) => println!("mounted on {}", dir.display()),
//!     Ok(other) => println!("{:?}", other),
//!     Err(e) => eprintln!("{}", e),
//! }
//! ```

pub mod allocator;
pub mod automount;
pub mod cleanup;
pub mod config;
pub mod disk;
pub mod error;
pub mod executor;
pub mod fstab;
pub mod guard;
pub mod hook;
pub mod mount;
pub mod mtab;
pub mod notify;
pub mod probe;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use automount::{Automounter, Outcome};
pub use cleanup::CleanupReport;
pub use config::Config;
pub use disk::BlockDevice;
pub use error::{Error, Result};
pub use executor::{CommandOutput, CommandRunner, SystemRunner};
pub use fstab::{Fstab, FstabEntry};
pub use guard::SkipReason;
pub use mtab::MountTable;
pub use probe::{HostProbe, SystemProbe};

//! Guard checks: should automedia manage this device at all?
//!
//! Two checks are fatal (not root, device backs `/`) and two are quiet skips
//! (device owned by fstab, no recognised filesystem).

use std::path::Path;
use std::time::Duration;

use crate::disk::BlockDevice;
use crate::error::{Error, Result};
use crate::executor::{CommandRunner, display_command};
use crate::fstab::Fstab;
use crate::probe::SystemProbe;

/// Why a present device is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// An fstab entry names the device by UUID, label or path.
    FstabManaged,
    /// lsblk reported no filesystem type.
    UnknownFilesystem,
    /// The live mount table already lists the device as a source.
    AlreadyMounted,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FstabManaged => write!(f, "managed by fstab"),
            Self::UnknownFilesystem => write!(f, "no recognised filesystem"),
            Self::AlreadyMounted => write!(f, "already mounted"),
        }
    }
}

/// Outcome of the fstab and filesystem checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Mount(BlockDevice),
    Skip(SkipReason),
}

/// Fails unless the process runs as root.
pub fn ensure_privileged(probe: &dyn SystemProbe) -> Result<()> {
    if probe.is_privileged() {
        Ok(())
    } else {
        Err(Error::NotPrivileged)
    }
}

/// Returns the source of the root mount as reported by `findmnt`.
pub fn root_source(runner: &dyn CommandRunner, timeout: Duration) -> Result<String> {
    let args = ["-n", "-o", "SOURCE", "/"];
    let output = runner.run("findmnt", &args, timeout);

    if !output.success() {
        return Err(Error::RootQuery {
            message: format!(
                "'{}' exited with code {}: {}",
                display_command("findmnt", &args),
                output.exit_code,
                output.stderr.trim()
            ),
        });
    }

    let source = output.stdout.trim().to_string();
    if source.is_empty() {
        return Err(Error::RootQuery {
            message: "findmnt printed no source for /".to_string(),
        });
    }
    Ok(source)
}

/// Refuses devices that back the root filesystem.
///
/// A device backs `/` if it is the root source or the disk holding it, so
/// `/dev/sda` and `/dev/sda2` are both refused for a root on `/dev/sda2[/@]`
/// (btrfs subvolume notation). Failing to determine the root source also
/// refuses.
pub fn ensure_not_root_filesystem(
    runner: &dyn CommandRunner,
    device: &Path,
    timeout: Duration,
) -> Result<()> {
    let root_source = root_source(runner, timeout)?;
    let device = device.to_string_lossy();

    if backs_root(&root_source, &device) {
        return Err(Error::RootFilesystem {
            device: device.to_string(),
            root_source,
        });
    }

    log::debug!("root filesystem is {}, {} is not part of it", root_source, device);
    Ok(())
}

/// Returns true if `device` is the root source or the disk it lives on.
///
/// Partition names follow the kernel scheme: `sda` -> `sda2`, and a `p`
/// separator when the disk name ends in a digit (`mmcblk0` -> `mmcblk0p1`).
fn backs_root(root_source: &str, device: &str) -> bool {
    let source = match root_source.find('[') {
        Some(idx) => &root_source[..idx],
        None => root_source,
    }
    .trim();

    let Some(rest) = source.strip_prefix(device) else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }

    let partition = if device.ends_with(|c: char| c.is_ascii_digit()) {
        rest.strip_prefix('p')
    } else {
        Some(rest)
    };
    partition.is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Decides whether a present device should be mounted.
pub fn evaluate(device: BlockDevice, fstab: &Fstab) -> Decision {
    if let Some(entry) = fstab.entry_for_device(&device) {
        log::debug!(
            "{} is managed by fstab entry '{}' on {}",
            device.path.display(),
            entry.fs_spec,
            entry.mount_point.display()
        );
        return Decision::Skip(SkipReason::FstabManaged);
    }

    if !device.has_filesystem() {
        log::debug!("{} has no recognised filesystem", device.path.display());
        return Decision::Skip(SkipReason::UnknownFilesystem);
    }

    Decision::Mount(device)
}

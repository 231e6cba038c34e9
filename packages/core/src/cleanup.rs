//! Cleanup sweep after a device disappears.
//!
//! The sweep covers every managed directory under the media root, not only
//! the one the removed device used, so directories left behind by earlier
//! failures are reclaimed too. A directory is removed only when nothing is
//! mounted on it and fstab does not name it.
//!
//! No lock is taken. Two invocations for different devices may sweep at the
//! same time; the loser of a removal race sees an error from `remove_dir`,
//! which is logged and otherwise ignored.

use std::fs;
use std::path::{Path, PathBuf};

use crate::allocator::{is_active_mount, managed_directories};
use crate::error::Result;
use crate::fstab::Fstab;
use crate::mtab::MountTable;
use crate::probe::SystemProbe;

/// What a sweep did with each managed directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    /// Still mounted; left in place.
    pub kept_mounted: Vec<PathBuf>,
    /// Named as a mount point in fstab; left in place.
    pub kept_fstab: Vec<PathBuf>,
    /// Removal failed (not empty, already gone, permissions).
    pub failed: Vec<PathBuf>,
}

impl CleanupReport {
    /// Returns true if the sweep changed nothing on disk.
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty()
    }
}

/// Removes every managed directory that is unmounted and not in fstab.
pub fn sweep(
    probe: &dyn SystemProbe,
    mounts: &MountTable,
    fstab: &Fstab,
    media_root: &Path,
    prefix: &str,
) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();

    for dir in managed_directories(media_root, prefix)? {
        if is_active_mount(probe, mounts, &dir) {
            log::warn!("{} is still mounted, leaving it in place", dir.display());
            report.kept_mounted.push(dir);
            continue;
        }

        if fstab.references_mount_point(&dir) {
            log::debug!("{} is an fstab mount point, leaving it in place", dir.display());
            report.kept_fstab.push(dir);
            continue;
        }

        match fs::remove_dir(&dir) {
            Ok(()) => {
                log::info!("removed {}", dir.display());
                report.removed.push(dir);
            }
            Err(e) => {
                log::warn!("could not remove {}: {}", dir.display(), e);
                report.failed.push(dir);
            }
        }
    }

    Ok(report)
}

//! Mount directory allocation.
//!
//! Every directory automedia owns sits directly under the media root and is
//! named `<prefix>` or `<prefix>_<N>`. Nothing else under the media root is
//! ever created, counted or removed.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, Result};
use crate::fstab::Fstab;
use crate::mtab::MountTable;
use crate::probe::SystemProbe;

/// Returns true if `name` is `<prefix>` or `<prefix>_<digits>`.
pub fn is_managed_name(name: &str, prefix: &str) -> bool {
    match name.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('_')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())),
        None => false,
    }
}

/// Lists managed directories under `media_root`, sorted by path.
///
/// Only real directories count; symlinks and files with a matching name are
/// ignored. A missing media root has no managed directories.
pub fn managed_directories(media_root: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(media_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).media_root_context(media_root),
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.media_root_context(media_root)?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_managed_name(name, prefix) {
            continue;
        }
        if entry.file_type().is_ok_and(|t| t.is_dir()) {
            dirs.push(entry.path());
        }
    }

    dirs.sort();
    Ok(dirs)
}

/// Returns true if `dir` currently has a filesystem mounted on it.
pub fn is_active_mount(probe: &dyn SystemProbe, mounts: &MountTable, dir: &Path) -> bool {
    probe.is_mount_point(dir) || mounts.is_target_mounted(dir)
}

/// Picks the directory for a new mount. Does not create it.
///
/// The base directory is reused unless something is mounted on it. Otherwise
/// the suffix starts at the number of existing managed directories and moves
/// up past any candidate that is mounted, is not a directory, or is an fstab
/// mount point.
pub fn allocate(
    probe: &dyn SystemProbe,
    mounts: &MountTable,
    fstab: &Fstab,
    media_root: &Path,
    prefix: &str,
) -> Result<PathBuf> {
    let is_free =
        |dir: &Path| !fstab.references_mount_point(dir) && is_unused(probe, mounts, dir);

    let base = media_root.join(prefix);
    if is_free(&base) {
        log::debug!("using base mount directory {}", base.display());
        return Ok(base);
    }

    let mut n = managed_directories(media_root, prefix)?.len();
    loop {
        let candidate = media_root.join(format!("{}_{}", prefix, n));
        if is_free(&candidate) {
            log::debug!(
                "{} is in use, allocated {}",
                base.display(),
                candidate.display()
            );
            return Ok(candidate);
        }
        n += 1;
    }
}

fn is_unused(probe: &dyn SystemProbe, mounts: &MountTable, dir: &Path) -> bool {
    match fs::symlink_metadata(dir) {
        Err(_) => true,
        Ok(meta) => meta.is_dir() && !is_active_mount(probe, mounts, dir),
    }
}

/// Creates a mount point directory if it doesn't exist.
pub fn create_mount_point(path: &Path) -> Result<()> {
    fs::create_dir_all(path).mount_point_context(path)
}

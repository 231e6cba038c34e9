//! Filesystem metadata queries.
//!
//! The decision pipeline asks the host three questions: are we root, is this
//! path a block device, and is this directory a mount point. They sit behind
//! [`SystemProbe`] so the pipeline can be driven by a fake in tests.

use std::path::Path;

use nix::sys::stat::{FileStat, SFlag, lstat};

/// Capability to query privilege and filesystem metadata.
pub trait SystemProbe {
    /// Returns true if the process runs with an effective uid of 0.
    fn is_privileged(&self) -> bool;

    /// Returns true if `path` exists and is a block device node.
    fn is_block_device(&self, path: &Path) -> bool;

    /// Returns true if `path` is the root of a mounted filesystem.
    fn is_mount_point(&self, path: &Path) -> bool;
}

/// Queries the running host through `nix`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProbe;

impl HostProbe {
    pub fn new() -> Self {
        Self
    }
}

impl SystemProbe for HostProbe {
    fn is_privileged(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }

    fn is_block_device(&self, path: &Path) -> bool {
        // stat follows the /dev/disk/by-* style symlinks udev creates
        match nix::sys::stat::stat(path) {
            Ok(st) => file_type(&st) == SFlag::S_IFBLK,
            Err(_) => false,
        }
    }

    fn is_mount_point(&self, path: &Path) -> bool {
        let Ok(st) = lstat(path) else {
            return false;
        };
        if file_type(&st) != SFlag::S_IFDIR {
            return false;
        }
        let Ok(parent) = lstat(path.join("..").as_path()) else {
            return false;
        };
        is_mount_root(&st, &parent)
    }
}

fn file_type(st: &FileStat) -> SFlag {
    SFlag::from_bits_truncate(st.st_mode) & SFlag::S_IFMT
}

/// A directory is a mount root when it lives on a different device than its
/// parent, or when it is its own parent (`/`).
fn is_mount_root(dir: &FileStat, parent: &FileStat) -> bool {
    dir.st_dev != parent.st_dev || dir.st_ino == parent.st_ino
}

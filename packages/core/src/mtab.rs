//! Live mount table parsing.
//!
//! Reads `/etc/mtab` (or any file in the same format, such as
//! `/proc/self/mounts`). Each line is `source target type options dump pass`
//! with the same octal escaping as fstab.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, Result};
use crate::fstab::unescape_fstab_path;

/// Default live mount table path.
pub const MTAB_PATH: &str = "/etc/mtab";

/// A mounted filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// What is mounted (e.g. "/dev/sdb1").
    pub source: String,
    /// Where it is mounted.
    pub target: PathBuf,
}

/// Snapshot of the live mount table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountTable {
    pub entries: Vec<MountEntry>,
}

impl MountTable {
    /// Reads the mount table at `path`. A missing file is an empty table.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("{} does not exist, assuming nothing is mounted", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).mount_table_context(path),
        }
    }

    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let source = fields.next()?;
                let target = fields.next()?;
                Some(MountEntry {
                    source: unescape_fstab_path(source),
                    target: PathBuf::from(unescape_fstab_path(target)),
                })
            })
            .collect();
        Self { entries }
    }

    /// Returns true if `device` is the source of any mount.
    pub fn is_source_mounted(&self, device: &Path) -> bool {
        self.entries
            .iter()
            .any(|entry| Path::new(&entry.source) == device)
    }

    /// Returns true if something is mounted on `dir`.
    pub fn is_target_mounted(&self, dir: &Path) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.target.components().eq(dir.components()))
    }

    /// Returns the mount targets of `device`.
    pub fn targets_of(&self, device: &Path) -> Vec<&Path> {
        self.entries
            .iter()
            .filter(|entry| Path::new(&entry.source) == device)
            .map(|entry| entry.target.as_path())
            .collect()
    }
}

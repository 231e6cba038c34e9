//! Block device metadata using lsblk.
//!
//! automedia needs three attributes of the device it was invoked for: UUID,
//! LABEL and filesystem TYPE. They come from `lsblk --json`, run through the
//! injected [`CommandRunner`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::executor::{CommandRunner, display_command};

/// Represents a block device (partition) on the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    /// Device name (e.g., "sdb1", "mmcblk0p1").
    pub name: String,
    /// Volume label, if set.
    pub label: Option<String>,
    /// Filesystem UUID (case-sensitive, as returned by blkid).
    pub uuid: Option<String>,
    /// Filesystem type (e.g., "vfat", "exfat").
    pub fstype: Option<String>,
    /// Full device path (e.g., "/dev/sdb1").
    pub path: PathBuf,
}

impl BlockDevice {
    /// Creates a device with no known metadata.
    pub fn unprobed(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            name,
            label: None,
            uuid: None,
            fstype: None,
            path,
        }
    }

    /// Returns true if lsblk recognised a filesystem on this device.
    pub fn has_filesystem(&self) -> bool {
        self.fstype.is_some()
    }
}

/// Raw JSON structure from lsblk output.
#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    fstype: Option<String>,
}

const LSBLK_COLUMNS: &str = "NAME,LABEL,UUID,FSTYPE";

/// Queries UUID, LABEL and TYPE of the device at `path`.
///
/// A failing lsblk is not fatal: the device is returned without metadata,
/// which the guard treats as an unknown filesystem and leaves alone.
pub fn query_block_device(
    runner: &dyn CommandRunner,
    path: &Path,
    timeout: Duration,
) -> Result<BlockDevice> {
    let path_str = path.to_string_lossy().into_owned();
    let args = ["--json", "--nodeps", "--output", LSBLK_COLUMNS, path_str.as_str()];
    let output = runner.run("lsblk", &args, timeout);

    if !output.success() {
        log::warn!(
            "'{}' failed with code {}: {}",
            display_command("lsblk", &args),
            output.exit_code,
            output.stderr.trim()
        );
        return Ok(BlockDevice::unprobed(path));
    }

    parse_lsblk(&output.stdout, path)
}

/// Parses lsblk JSON output for a single device.
fn parse_lsblk(stdout: &str, path: &Path) -> Result<BlockDevice> {
    let lsblk_output: LsblkOutput = serde_json::from_str(stdout).map_err(|e| Error::LsblkParse {
        message: e.to_string(),
    })?;

    let Some(dev) = lsblk_output.blockdevices.into_iter().next() else {
        return Err(Error::LsblkParse {
            message: format!("no entry for {}", path.display()),
        });
    };

    Ok(BlockDevice {
        name: dev.name,
        label: non_empty(dev.label),
        uuid: non_empty(dev.uuid),
        fstype: non_empty(dev.fstype),
        path: path.to_path_buf(),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

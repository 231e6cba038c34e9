//! Fstab parsing module.
//!
//! automedia only ever reads `/etc/fstab`. A device or directory that shows up
//! in an active entry belongs to the administrator: it is never mounted,
//! unmounted or removed by this tool.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::Error;
use crate::disk::BlockDevice;
use crate::error::{IoResultExt, Result};

/// Default fstab path.
pub const FSTAB_PATH: &str = "/etc/fstab";

/// Represents a single fstab entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    /// The device identifier (e.g., "UUID=xxx", "LABEL=xxx" or "/dev/sda1").
    pub fs_spec: String,
    /// Mount point path.
    pub mount_point: PathBuf,
    /// Filesystem type (e.g., "ext4", "vfat").
    pub vfs_type: String,
    /// Mount options.
    pub mount_options: Vec<String>,
    /// This field is used by dump(8) to determine which filesystems need to be dumped.
    pub dump: u8,
    /// This field is used by fsck(8) to determine the order in which filesystem
    /// checks are done at boot time.
    pub fsck_order: u16,
}

impl FstabEntry {
    /// Parses a single fstab line into an entry.
    ///
    /// Returns None for comments and empty lines. The dump and fsck fields are
    /// optional, as fstab(5) allows.
    pub fn from_line(line: &str) -> Result<Option<Self>> {
        let line = line.trim();

        // Skip comments and empty lines
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if !(4..=6).contains(&parts.len()) {
            return Err(Error::FstabParse {
                message: format!("expected 4 to 6 fields in line '{}'", line),
            });
        }

        let mount_options: Vec<String> = parts[3].split(',').map(|s| s.to_string()).collect();
        let dump = match parts.get(4) {
            Some(field) => field.parse::<u8>().map_err(|e| Error::FstabParse {
                message: format!("failed to parse dump field of line {}: {}", line, e),
            })?,
            None => 0,
        };
        let fsck_order = match parts.get(5) {
            Some(field) => field.parse::<u16>().map_err(|e| Error::FstabParse {
                message: format!("failed to parse fsck_order of line {}: {}", line, e),
            })?,
            None => 0,
        };

        Ok(Some(Self {
            fs_spec: unescape_fstab_path(parts[0]),
            mount_point: PathBuf::from(unescape_fstab_path(parts[1])),
            vfs_type: parts[2].to_string(),
            mount_options,
            dump,
            fsck_order,
        }))
    }

    /// Returns true if this entry's fs_spec designates `device`.
    ///
    /// Matches `UUID=`, `LABEL=` (values optionally quoted), the
    /// `/dev/disk/by-uuid` and `/dev/disk/by-label` links, and the plain
    /// device path.
    pub fn designates(&self, device: &BlockDevice) -> bool {
        let spec = self.fs_spec.as_str();

        if let Some(uuid) = device.uuid.as_deref().filter(|u| !u.is_empty())
            && (tag_value(spec, "UUID=") == Some(uuid)
                || spec.strip_prefix("/dev/disk/by-uuid/") == Some(uuid))
        {
            return true;
        }

        if let Some(label) = device.label.as_deref().filter(|l| !l.is_empty())
            && (tag_value(spec, "LABEL=") == Some(label)
                || spec.strip_prefix("/dev/disk/by-label/") == Some(label))
        {
            return true;
        }

        Path::new(spec) == device.path
    }
}

/// Returns the value of a `TAG=value` spec, without one pair of matching
/// surrounding quotes.
fn tag_value<'a>(spec: &'a str, tag: &str) -> Option<&'a str> {
    let value = spec.strip_prefix(tag)?;
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return Some(inner);
        }
    }
    Some(value)
}

/// Unescapes octal sequences in fstab paths.
///
/// Handles sequences such as space (\040), tab (\011) and backslash (\134).
/// Escaped bytes are reassembled before UTF-8 decoding, so multi-byte
/// characters written as octal survive.
pub(crate) fn unescape_fstab_path(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\'
            && let Some(digits) = bytes.get(i + 1..i + 4)
            && digits.iter().all(|b| (b'0'..=b'7').contains(b))
            && let Ok(digits) = std::str::from_utf8(digits)
            && let Ok(byte) = u8::from_str_radix(digits, 8)
        {
            result.push(byte);
            i += 4;
            continue;
        }
        result.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&result).into_owned()
}

/// Active entries of an fstab file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fstab {
    pub entries: Vec<FstabEntry>,
}

impl Fstab {
    /// Reads and parses the fstab at `path`.
    ///
    /// A missing file is treated as empty. Malformed lines are logged and
    /// skipped so that one bad line cannot hide the rest of the file.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("{} does not exist, treating as empty", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).fstab_read_context(path),
        }
    }

    /// Parses fstab content.
    pub fn parse(content: &str) -> Self {
        let mut entries = Vec::new();
        for line in content.lines() {
            match FstabEntry::from_line(line) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) => log::warn!("ignoring fstab line: {}", e),
            }
        }
        Self { entries }
    }

    /// Returns the entry that owns `device`, if any.
    pub fn entry_for_device(&self, device: &BlockDevice) -> Option<&FstabEntry> {
        self.entries.iter().find(|entry| entry.designates(device))
    }

    /// Returns true if `dir` is the mount point of an fstab entry.
    pub fn references_mount_point(&self, dir: &Path) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.mount_point.components().eq(dir.components()))
    }
}

//! Runtime configuration.
//!
//! Every path and policy knob lives here so that tests can point the whole
//! pipeline at a temporary directory. The on-disk format is JSON; missing
//! keys fall back to the defaults below.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use snafu::ResultExt;

use crate::error::{ConfigParseSnafu, ConfigReadSnafu, Result};

/// Default location of the optional configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/automedia/config.json";

/// Default mount directory name under the media root.
pub const DEFAULT_MOUNT_DIR_NAME: &str = "automedia";

/// Default mount options handed to `mount -o`.
pub const DEFAULT_MOUNT_OPTIONS: &str = "users";

/// Default timeout for every external command (seconds).
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding device nodes.
    pub dev_dir: PathBuf,
    /// Directory under which mount directories are created.
    pub media_root: PathBuf,
    /// Name prefix of every mount directory this tool owns.
    pub mount_dir_name: String,
    pub fstab_path: PathBuf,
    /// Live mount table (`/etc/mtab` or `/proc/self/mounts`).
    pub mtab_path: PathBuf,
    /// Directory of per-filesystem-type mount hooks (`<type>.json`).
    pub hook_dir: PathBuf,
    /// Filesystem type passed to `mount -t`.
    pub mount_fstype: String,
    /// Options passed to `mount -o`.
    pub mount_options: String,
    pub command_timeout_secs: u64,
    /// Open the new mount in the desktop user's file manager.
    pub open_on_mount: bool,
    /// Program (and leading arguments) used to open the mount directory.
    pub open_command: Vec<String>,
    /// Process names that indicate an active desktop session.
    pub session_processes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dev_dir: PathBuf::from("/dev"),
            media_root: PathBuf::from("/media"),
            mount_dir_name: DEFAULT_MOUNT_DIR_NAME.to_string(),
            fstab_path: PathBuf::from(crate::fstab::FSTAB_PATH),
            mtab_path: PathBuf::from(crate::mtab::MTAB_PATH),
            hook_dir: PathBuf::from("/etc/automedia/fs.d"),
            mount_fstype: "auto".to_string(),
            mount_options: DEFAULT_MOUNT_OPTIONS.to_string(),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            open_on_mount: true,
            open_command: vec!["xdg-open".to_string()],
            session_processes: [
                "gnome-session-b",
                "gnome-shell",
                "plasmashell",
                "xfce4-session",
                "lxsession",
                "mate-session",
                "cinnamon-sessio",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Config {
    /// Loads the configuration from `path`.
    ///
    /// When `required` is false a missing file yields the defaults; any other
    /// read or parse failure is an error.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound && !required => {
                log::debug!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e).context(ConfigReadSnafu { path }),
        };

        Self::from_json(&content).context(ConfigParseSnafu { path })
    }

    /// Parses a JSON configuration document.
    pub fn from_json(content: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Returns the device node path for a kernel device name.
    pub fn device_path(&self, name: &str) -> PathBuf {
        self.dev_dir.join(name)
    }
}

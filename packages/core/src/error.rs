//! Unified error types for the automedia-core library.
//!
//! Uses SNAFU for context-rich error handling, especially useful when the same
//! underlying error type (like `std::io::Error`) appears in different contexts.
//!
//! Only the fatal outcomes of an invocation are errors. Skips (fstab-managed
//! device, unknown filesystem, absent device) are [`crate::automount::Outcome`]
//! values, and best-effort failures are logged where they happen.

use snafu::{ResultExt, Snafu};
use std::path::PathBuf;

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all core library operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The tool was started without root privileges.
    #[snafu(display("automedia must be run as root"))]
    NotPrivileged,

    /// The target device backs the root filesystem.
    #[snafu(display("refusing to touch {device}: it backs the root filesystem ({root_source})"))]
    RootFilesystem { device: String, root_source: String },

    /// The root filesystem could not be determined.
    #[snafu(display("cannot determine the root filesystem: {message}"))]
    RootQuery { message: String },

    /// Failed to execute a system command.
    #[snafu(display("failed to execute command '{command}'"))]
    CommandExecution {
        command: String,
        source: std::io::Error,
    },

    /// Failed to parse lsblk JSON output.
    #[snafu(display("failed to parse lsblk output: {message}"))]
    LsblkParse { message: String },

    /// Fstab file cannot be read.
    #[snafu(display("failed to read fstab at {}", path.display()))]
    FstabRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse fstab entry.
    #[snafu(display("failed to parse fstab entry: {message}"))]
    FstabParse { message: String },

    /// Live mount table cannot be read.
    #[snafu(display("failed to read mount table at {}", path.display()))]
    MountTableRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Media root cannot be listed.
    #[snafu(display("failed to list media root {}", path.display()))]
    MediaRootRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Mount point creation failed.
    #[snafu(display("failed to create mount point at {}", path.display()))]
    MountPointCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The mount command returned a non-zero exit code.
    #[snafu(display("'{command}' exited with code {code}: {stderr}"))]
    MountFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// Configuration file cannot be read.
    #[snafu(display("failed to read config at {}", path.display()))]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration file is not valid.
    #[snafu(display("invalid config at {}", path.display()))]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Filesystem hook file cannot be read.
    #[snafu(display("failed to read filesystem hook at {}", path.display()))]
    HookRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Filesystem hook file does not match the hook schema.
    #[snafu(display("invalid filesystem hook at {}", path.display()))]
    HookParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Device name given on the command line is not a plain basename.
    #[snafu(display("invalid device name '{name}'"))]
    InvalidDeviceName { name: String },
}

/// Extension trait for adding context to io::Error results.
pub trait IoResultExt<T> {
    /// Add context for command execution errors.
    fn command_context(self, command: impl Into<String>) -> Result<T>;

    /// Add context for fstab read errors.
    fn fstab_read_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for mount table read errors.
    fn mount_table_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for media root listing errors.
    fn media_root_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for mount point creation errors.
    fn mount_point_context(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn command_context(self, command: impl Into<String>) -> Result<T> {
        self.context(CommandExecutionSnafu {
            command: command.into(),
        })
    }

    fn fstab_read_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(FstabReadSnafu { path: path.into() })
    }

    fn mount_table_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(MountTableReadSnafu { path: path.into() })
    }

    fn media_root_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(MediaRootReadSnafu { path: path.into() })
    }

    fn mount_point_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(MountPointCreationSnafu { path: path.into() })
    }
}

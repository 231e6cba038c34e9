//! Per-filesystem mount hooks.
//!
//! A hook is `<hook_dir>/<fstype>.json` and may override the type and options
//! handed to `mount`:
//!
//! ```json
//! { "fstype": "exfat", "options": "users,uid=1000,gid=1000" }
//! ```
//!
//! Hooks are data only. Their contents are never run as a command.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use snafu::ResultExt;

use crate::error::{HookParseSnafu, HookReadSnafu, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountHook {
    /// Replaces the `-t` argument.
    #[serde(default)]
    pub fstype: Option<String>,
    /// Replaces the `-o` argument.
    #[serde(default)]
    pub options: Option<String>,
}

/// Type and options for one `mount` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    pub fstype: String,
    pub options: String,
}

impl MountHook {
    /// Applies the overrides to `spec`.
    pub fn apply(&self, spec: MountSpec) -> MountSpec {
        MountSpec {
            fstype: self.fstype.clone().unwrap_or(spec.fstype),
            options: self.options.clone().unwrap_or(spec.options),
        }
    }
}

/// Path of the hook for a detected filesystem type.
///
/// Types that could escape the hook directory get no hook.
pub fn hook_path(hook_dir: &Path, fstype: &str) -> Option<PathBuf> {
    let valid = !fstype.is_empty()
        && fstype
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid.then(|| hook_dir.join(format!("{}.json", fstype)))
}

/// Loads the hook for `fstype`, if one exists.
pub fn load_hook(hook_dir: &Path, fstype: &str) -> Result<Option<MountHook>> {
    let Some(path) = hook_path(hook_dir, fstype) else {
        return Ok(None);
    };

    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).context(HookReadSnafu { path }),
    };

    let hook = serde_json::from_str(&content).context(HookParseSnafu { path: &path })?;
    log::debug!("loaded mount hook {}", path.display());
    Ok(Some(hook))
}

/// Resolves the mount spec for `fstype`, falling back to `default` when the
/// hook is missing or broken.
pub fn resolve_mount_spec(hook_dir: &Path, fstype: &str, default: MountSpec) -> MountSpec {
    match load_hook(hook_dir, fstype) {
        Ok(Some(hook)) => hook.apply(default),
        Ok(None) => default,
        Err(e) => {
            log::warn!("ignoring mount hook for {}: {}", fstype, e);
            default
        }
    }
}

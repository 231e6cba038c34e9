//! Mount operations module.
//!
//! This module runs `mount` and `umount` through the injected runner and
//! rolls back the mount directory when a mount fails.

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::executor::{CommandRunner, display_command};
use crate::hook::MountSpec;

/// Mounts `device` on `mount_point` with the given type and options.
///
/// On failure the mount point is removed again (it was created for this
/// mount and nothing else may be using it) and [`Error::MountFailed`] is
/// returned.
pub fn mount_device(
    runner: &dyn CommandRunner,
    device: &Path,
    mount_point: &Path,
    spec: &MountSpec,
    timeout: Duration,
) -> Result<()> {
    let device_str = device.to_string_lossy().into_owned();
    let mount_point_str = mount_point.to_string_lossy().into_owned();
    let args = [
        "-t",
        spec.fstype.as_str(),
        "-o",
        spec.options.as_str(),
        device_str.as_str(),
        mount_point_str.as_str(),
    ];
    let command = display_command("mount", &args);

    let output = runner.run("mount", &args, timeout);
    if !output.success() {
        log::error!("'{}' failed with code {}", command, output.exit_code);
        rollback_mount_point(mount_point);
        return Err(Error::MountFailed {
            command,
            code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }

    log::info!("mounted {} on {}", device.display(), mount_point.display());
    Ok(())
}

/// Unmounts `device`.
///
/// Returns true on success. A failure is logged and reported through the
/// return value only; the caller carries on with cleanup either way.
pub fn unmount_device(runner: &dyn CommandRunner, device: &Path, timeout: Duration) -> bool {
    let device_str = device.to_string_lossy().into_owned();
    let args = [device_str.as_str()];

    let output = runner.run("umount", &args, timeout);
    if !output.success() {
        log::error!(
            "'{}' failed with code {}: {}",
            display_command("umount", &args),
            output.exit_code,
            output.stderr.trim()
        );
        return false;
    }

    log::info!("unmounted {}", device.display());
    true
}

/// Removes a mount point left behind by a failed mount.
fn rollback_mount_point(mount_point: &Path) {
    match fs::remove_dir(mount_point) {
        Ok(()) => log::debug!("removed {}", mount_point.display()),
        Err(e) => log::warn!("could not remove {}: {}", mount_point.display(), e),
    }
}

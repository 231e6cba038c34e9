//! The per-event decision pipeline.
//!
//! ```text
//! ROOT_CHECK -> ROOTFS_CHECK -> device present?
//!   no:  unmount if still in the mount table -> cleanup sweep -> exit 0
//!   yes: fstab/type checks -> allocate dir -> mount -> exit 0 or 1
//! ```
//!
//! All OS state (fstab, mount table, media root) is read fresh on every call.

use std::path::{Path, PathBuf};

use crate::allocator::{allocate, create_mount_point};
use crate::cleanup::{CleanupReport, sweep};
use crate::config::Config;
use crate::disk::{BlockDevice, query_block_device};
use crate::error::{Error, Result};
use crate::executor::CommandRunner;
use crate::fstab::Fstab;
use crate::guard::{
    Decision, SkipReason, ensure_not_root_filesystem, ensure_privileged, evaluate,
};
use crate::hook::{MountSpec, resolve_mount_spec};
use crate::mount::{mount_device, unmount_device};
use crate::mtab::MountTable;
use crate::notify::open_for_session_user;
use crate::probe::SystemProbe;

/// Non-fatal result of handling one device event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The device was mounted on this directory.
    Mounted(PathBuf),
    /// The device is present but not ours to mount.
    Skipped(SkipReason),
    /// The device is gone; the sweep ran.
    Removed {
        /// Whether `umount` was attempted, and whether it succeeded.
        unmounted: Option<bool>,
        report: CleanupReport,
    },
}

/// Handles add/remove events for one device at a time.
pub struct Automounter<'a> {
    config: &'a Config,
    runner: &'a dyn CommandRunner,
    probe: &'a dyn SystemProbe,
}

impl<'a> Automounter<'a> {
    pub fn new(
        config: &'a Config,
        runner: &'a dyn CommandRunner,
        probe: &'a dyn SystemProbe,
    ) -> Self {
        Self {
            config,
            runner,
            probe,
        }
    }

    /// Runs the pipeline for the kernel device `name` (e.g. "sdb1").
    pub fn handle(&self, name: &str) -> Result<Outcome> {
        validate_device_name(name)?;
        ensure_privileged(self.probe)?;

        let device = self.config.device_path(name);
        let timeout = self.config.command_timeout();
        ensure_not_root_filesystem(self.runner, &device, timeout)?;

        if self.probe.is_block_device(&device) {
            self.handle_present(&device)
        } else {
            log::debug!("{} is not a block device, cleaning up", device.display());
            self.handle_removed(&device)
        }
    }

    fn handle_present(&self, device: &Path) -> Result<Outcome> {
        let fstab = Fstab::load(&self.config.fstab_path)?;
        let mounts = MountTable::load(&self.config.mtab_path)?;

        if mounts.is_source_mounted(device) {
            log::info!(
                "{} is already mounted on {:?}",
                device.display(),
                mounts.targets_of(device)
            );
            return Ok(Outcome::Skipped(SkipReason::AlreadyMounted));
        }

        let timeout = self.config.command_timeout();
        let block_device = query_block_device(self.runner, device, timeout)?;
        let block_device = match evaluate(block_device, &fstab) {
            Decision::Mount(block_device) => block_device,
            Decision::Skip(reason) => {
                log::info!("skipping {}: {}", device.display(), reason);
                return Ok(Outcome::Skipped(reason));
            }
        };

        let mount_point = allocate(
            self.probe,
            &mounts,
            &fstab,
            &self.config.media_root,
            &self.config.mount_dir_name,
        )?;
        create_mount_point(&mount_point)?;

        let spec = self.mount_spec(&block_device);
        mount_device(self.runner, device, &mount_point, &spec, timeout)?;

        if self.config.open_on_mount {
            open_for_session_user(
                self.runner,
                &mount_point,
                &self.config.open_command,
                &self.config.session_processes,
                timeout,
            );
        }

        Ok(Outcome::Mounted(mount_point))
    }

    fn handle_removed(&self, device: &Path) -> Result<Outcome> {
        let timeout = self.config.command_timeout();
        let mut mounts = MountTable::load(&self.config.mtab_path)?;

        let unmounted = if mounts.is_source_mounted(device) {
            let ok = unmount_device(self.runner, device, timeout);
            mounts = MountTable::load(&self.config.mtab_path)?;
            Some(ok)
        } else {
            None
        };

        let fstab = Fstab::load(&self.config.fstab_path)?;
        let report = sweep(
            self.probe,
            &mounts,
            &fstab,
            &self.config.media_root,
            &self.config.mount_dir_name,
        )?;

        Ok(Outcome::Removed { unmounted, report })
    }

    fn mount_spec(&self, device: &BlockDevice) -> MountSpec {
        let default = MountSpec {
            fstype: self.config.mount_fstype.clone(),
            options: self.config.mount_options.clone(),
        };
        match device.fstype.as_deref() {
            Some(fstype) => resolve_mount_spec(&self.config.hook_dir, fstype, default),
            None => default,
        }
    }
}

/// Accepts a kernel device name such as `sdb1`; rejects anything that would
/// resolve outside the device directory.
fn validate_device_name(name: &str) -> Result<()> {
    let valid = !name.is_empty() && name != "." && name != ".." && !name.contains('/');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidDeviceName {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutput;
    use crate::testing::{FakeProbe, FakeRunner};
    use std::fs;
    use tempfile::TempDir;

    const LSBLK_KEY: &str = r#"{"blockdevices": [{"name": "sdb1", "label": "KEY",
        "uuid": "1234-ABCD", "fstype": "vfat"}]}"#;

    /// A throwaway host: media root, fstab, mtab and hook dir under one tempdir.
    struct Host {
        _dir: TempDir,
        config: Config,
    }

    impl Host {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = Config {
                dev_dir: PathBuf::from("/dev"),
                media_root: dir.path().join("media"),
                fstab_path: dir.path().join("fstab"),
                mtab_path: dir.path().join("mtab"),
                hook_dir: dir.path().join("fs.d"),
                open_on_mount: false,
                ..Config::default()
            };
            fs::create_dir(&config.media_root).unwrap();
            fs::write(&config.fstab_path, "UUID=abc-123 / ext4 defaults 0 1\n").unwrap();
            fs::write(&config.mtab_path, "/dev/sda2 / ext4 rw 0 0\n").unwrap();
            Self { _dir: dir, config }
        }

        fn media(&self, name: &str) -> PathBuf {
            self.config.media_root.join(name)
        }

        fn append_fstab(&self, line: &str) {
            let mut content = fs::read_to_string(&self.config.fstab_path).unwrap();
            content.push_str(line);
            content.push('\n');
            fs::write(&self.config.fstab_path, content).unwrap();
        }

        fn append_mtab(&self, line: &str) {
            let mut content = fs::read_to_string(&self.config.mtab_path).unwrap();
            content.push_str(line);
            content.push('\n');
            fs::write(&self.config.mtab_path, content).unwrap();
        }

        fn media_entries(&self) -> Vec<String> {
            let mut names: Vec<String> = fs::read_dir(&self.config.media_root)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                .collect();
            names.sort();
            names
        }

        fn run(&self, runner: &FakeRunner, probe: &FakeProbe, name: &str) -> Result<Outcome> {
            Automounter::new(&self.config, runner, probe).handle(name)
        }
    }

    fn present_sdb1() -> FakeProbe {
        FakeProbe::new().with_block_device("/dev/sdb1")
    }

    fn root_on_sda2() -> FakeRunner {
        FakeRunner::new().respond("findmnt", CommandOutput::ok("/dev/sda2\n"))
    }

    #[test]
    fn test_mounts_new_vfat_device() {
        let host = Host::new();
        let runner = root_on_sda2().respond("lsblk", CommandOutput::ok(LSBLK_KEY));

        let outcome = host.run(&runner, &present_sdb1(), "sdb1").unwrap();

        let dir = host.media("automedia");
        assert_eq!(outcome, Outcome::Mounted(dir.clone()));
        assert!(dir.is_dir());
        assert_eq!(
            runner.calls_to("mount"),
            vec![format!("mount -t auto -o users /dev/sdb1 {}", dir.display())]
        );
    }

    #[test]
    fn test_root_device_is_fatal() {
        let host = Host::new();
        let runner = FakeRunner::new().respond("findmnt", CommandOutput::ok("/dev/sdb1\n"));

        let err = host.run(&runner, &present_sdb1(), "sdb1").unwrap_err();

        assert!(matches!(err, Error::RootFilesystem { .. }));
        assert!(runner.calls_to("mount").is_empty());
        assert!(host.media_entries().is_empty());
    }

    #[test]
    fn test_unprivileged_is_fatal() {
        let host = Host::new();
        let runner = root_on_sda2();

        let err = host
            .run(&runner, &present_sdb1().unprivileged(), "sdb1")
            .unwrap_err();

        assert!(matches!(err, Error::NotPrivileged));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_removed_device_is_unmounted_and_cleaned_up() {
        let host = Host::new();
        let dir = host.media("automedia");
        fs::create_dir(&dir).unwrap();
        host.append_mtab(&format!("/dev/sdb1 {} vfat rw 0 0", dir.display()));
        let mtab = host.config.mtab_path.clone();
        let runner = root_on_sda2().on_run("umount", move || {
            let content = fs::read_to_string(&mtab).unwrap();
            let kept: String = content
                .lines()
                .filter(|line| !line.starts_with("/dev/sdb1 "))
                .map(|line| format!("{line}\n"))
                .collect();
            fs::write(&mtab, kept).unwrap();
        });

        let outcome = host.run(&runner, &FakeProbe::new(), "sdb1").unwrap();

        assert_eq!(runner.calls_to("umount"), vec!["umount /dev/sdb1"]);
        match outcome {
            Outcome::Removed { unmounted, report } => {
                assert_eq!(unmounted, Some(true));
                assert_eq!(report.removed, vec![dir.clone()]);
                assert!(report.kept_mounted.is_empty());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!dir.exists());
    }

    #[test]
    fn test_removed_device_still_listed_after_umount_is_kept() {
        let host = Host::new();
        let dir = host.media("automedia");
        fs::create_dir(&dir).unwrap();
        host.append_mtab(&format!("/dev/sdb1 {} vfat rw 0 0", dir.display()));
        let runner = root_on_sda2();

        let outcome = host.run(&runner, &FakeProbe::new(), "sdb1").unwrap();

        // umount reported success but the table still lists the mount
        match outcome {
            Outcome::Removed { unmounted, report } => {
                assert_eq!(unmounted, Some(true));
                assert_eq!(report.kept_mounted, vec![dir.clone()]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(dir.is_dir());
    }

    #[test]
    fn test_removed_device_sweeps_unmounted_directories() {
        let host = Host::new();
        fs::create_dir(host.media("automedia")).unwrap();
        fs::create_dir(host.media("automedia_1")).unwrap();
        fs::create_dir(host.media("cdrom")).unwrap();
        let runner = root_on_sda2();

        let outcome = host.run(&runner, &FakeProbe::new(), "sdb1").unwrap();

        assert!(runner.calls_to("umount").is_empty());
        assert!(matches!(
            outcome,
            Outcome::Removed {
                unmounted: None,
                ..
            }
        ));
        assert_eq!(host.media_entries(), vec!["cdrom"]);
    }

    #[test]
    fn test_unmount_failure_still_sweeps() {
        let host = Host::new();
        fs::create_dir(host.media("automedia_1")).unwrap();
        host.append_mtab("/dev/sdb1 /somewhere/else vfat rw 0 0");
        let runner = root_on_sda2().respond("umount", CommandOutput::failed(32, "target is busy"));

        let outcome = host.run(&runner, &FakeProbe::new(), "sdb1").unwrap();

        match outcome {
            Outcome::Removed { unmounted, report } => {
                assert_eq!(unmounted, Some(false));
                assert_eq!(report.removed, vec![host.media("automedia_1")]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_fstab_uuid_device_is_skipped() {
        let host = Host::new();
        host.append_fstab("UUID=1234-ABCD /mnt/key vfat noauto 0 0");
        let runner = root_on_sda2().respond("lsblk", CommandOutput::ok(LSBLK_KEY));

        let outcome = host.run(&runner, &present_sdb1(), "sdb1").unwrap();

        assert_eq!(outcome, Outcome::Skipped(SkipReason::FstabManaged));
        assert!(host.media_entries().is_empty());
        assert!(runner.calls_to("mount").is_empty());
    }

    #[test]
    fn test_fstab_device_never_touches_media_root() {
        let host = Host::new();
        fs::create_dir(host.media("automedia")).unwrap();
        host.append_fstab("/dev/sdb1 /mnt/key vfat noauto 0 0");
        let runner = root_on_sda2().respond("lsblk", CommandOutput::ok(LSBLK_KEY));

        let outcome = host.run(&runner, &present_sdb1(), "sdb1").unwrap();

        assert_eq!(outcome, Outcome::Skipped(SkipReason::FstabManaged));
        assert_eq!(host.media_entries(), vec!["automedia"]);
    }

    #[test]
    fn test_unknown_filesystem_is_skipped() {
        let host = Host::new();
        let runner = root_on_sda2().respond(
            "lsblk",
            CommandOutput::ok(r#"{"blockdevices": [{"name": "sdb1", "fstype": null}]}"#),
        );

        let outcome = host.run(&runner, &present_sdb1(), "sdb1").unwrap();

        assert_eq!(outcome, Outcome::Skipped(SkipReason::UnknownFilesystem));
        assert!(host.media_entries().is_empty());
    }

    #[test]
    fn test_already_mounted_device_is_skipped() {
        let host = Host::new();
        host.append_mtab("/dev/sdb1 /mnt/elsewhere vfat rw 0 0");
        let runner = root_on_sda2().respond("lsblk", CommandOutput::ok(LSBLK_KEY));

        let outcome = host.run(&runner, &present_sdb1(), "sdb1").unwrap();

        assert_eq!(outcome, Outcome::Skipped(SkipReason::AlreadyMounted));
        assert!(runner.calls_to("mount").is_empty());
    }

    #[test]
    fn test_mount_failure_removes_directory() {
        let host = Host::new();
        let runner = root_on_sda2()
            .respond("lsblk", CommandOutput::ok(LSBLK_KEY))
            .respond("mount", CommandOutput::failed(32, "wrong fs type"));

        let err = host.run(&runner, &present_sdb1(), "sdb1").unwrap_err();

        assert!(matches!(err, Error::MountFailed { code: 32, .. }));
        assert!(host.media_entries().is_empty());
    }

    #[test]
    fn test_busy_base_gets_numeric_suffix() {
        let host = Host::new();
        let base = host.media("automedia");
        fs::create_dir(&base).unwrap();
        host.append_mtab(&format!("/dev/sdc1 {} vfat rw 0 0", base.display()));
        let runner = root_on_sda2().respond("lsblk", CommandOutput::ok(LSBLK_KEY));

        let outcome = host.run(&runner, &present_sdb1(), "sdb1").unwrap();

        assert_eq!(outcome, Outcome::Mounted(host.media("automedia_1")));
        assert_eq!(host.media_entries(), vec!["automedia", "automedia_1"]);
    }

    #[test]
    fn test_hook_overrides_mount_options() {
        let host = Host::new();
        fs::create_dir(&host.config.hook_dir).unwrap();
        fs::write(
            host.config.hook_dir.join("vfat.json"),
            r#"{"options": "users,utf8"}"#,
        )
        .unwrap();
        let runner = root_on_sda2().respond("lsblk", CommandOutput::ok(LSBLK_KEY));

        host.run(&runner, &present_sdb1(), "sdb1").unwrap();

        assert_eq!(
            runner.calls_to("mount"),
            vec![format!(
                "mount -t auto -o users,utf8 /dev/sdb1 {}",
                host.media("automedia").display()
            )]
        );
    }

    #[test]
    fn test_open_on_mount_runs_for_session_user() {
        let mut host = Host::new();
        host.config.open_on_mount = true;
        host.config.session_processes = vec!["plasmashell".to_string()];
        let runner = root_on_sda2()
            .respond("lsblk", CommandOutput::ok(LSBLK_KEY))
            .respond("ps", CommandOutput::ok("alice plasmashell\n"));

        host.run(&runner, &present_sdb1(), "sdb1").unwrap();

        assert_eq!(
            runner.calls_to("runuser"),
            vec![format!(
                "runuser -u alice -- xdg-open {}",
                host.media("automedia").display()
            )]
        );
    }

    #[test]
    fn test_invalid_device_name() {
        let host = Host::new();
        let runner = root_on_sda2();
        for name in ["", "..", "../etc/passwd", "sdb1/x"] {
            assert!(matches!(
                host.run(&runner, &present_sdb1(), name),
                Err(Error::InvalidDeviceName { .. })
            ));
        }
        assert!(runner.calls().is_empty());
    }
}

//! Best-effort "open the new mount" for the desktop user.
//!
//! Nothing here can fail an invocation: every problem is logged and dropped.

use std::path::Path;
use std::time::Duration;

use crate::executor::{CommandRunner, display_command};

/// Finds the user owning a desktop session process in `ps -eo user:32=,comm=`
/// output. root-owned processes do not count.
pub fn find_session_user(ps_output: &str, session_processes: &[String]) -> Option<String> {
    ps_output.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let user = fields.next()?;
        let comm = fields.next()?;
        let is_session = session_processes.iter().any(|p| p == comm);
        (is_session && user != "root").then(|| user.to_string())
    })
}

/// Opens `dir` as the active desktop user with `open_command`.
///
/// Returns true if the open command was launched successfully.
pub fn open_for_session_user(
    runner: &dyn CommandRunner,
    dir: &Path,
    open_command: &[String],
    session_processes: &[String],
    timeout: Duration,
) -> bool {
    let Some((program, program_args)) = open_command.split_first() else {
        log::debug!("no open command configured");
        return false;
    };

    let ps = runner.run("ps", &["-eo", "user:32=,comm="], timeout);
    if !ps.success() {
        log::warn!("ps exited with code {}: {}", ps.exit_code, ps.stderr.trim());
        return false;
    }

    let Some(user) = find_session_user(&ps.stdout, session_processes) else {
        log::debug!("no desktop session found, not opening {}", dir.display());
        return false;
    };

    let dir = dir.to_string_lossy();
    let mut args = vec!["-u", user.as_str(), "--", program.as_str()];
    args.extend(program_args.iter().map(String::as_str));
    args.push(&dir);

    let output = runner.run_detached("runuser", &args, timeout);
    if !output.success() {
        log::warn!(
            "'{}' exited with code {}",
            display_command("runuser", &args),
            output.exit_code
        );
        return false;
    }

    log::info!("opened {} for {}", dir, user);
    true
}

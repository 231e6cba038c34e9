//! Command execution abstraction.
//!
//! Every external program automedia talks to (`findmnt`, `lsblk`, `mount`,
//! `umount`, `ps`, `runuser`) goes through a [`CommandRunner`]. The real
//! implementation is [`SystemRunner`]; tests substitute a scripted fake.
//!
//! A runner never returns an error: spawn failures and timeouts come back as
//! a failed [`CommandOutput`] so callers inspect one status code path.
//!
//! The timeout bounds the whole call. Each command runs in its own process
//! group; on timeout the group is killed, and output pipes still held open by
//! background descendants are abandoned at the deadline.

use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use wait_timeout::ChildExt;

use crate::error::{IoResultExt, Result};

/// Exit code reported when a command could not be spawned or timed out.
pub const FAILED_TO_RUN: i32 = -1;

/// How long to wait for pipe readers once the command has exited or been
/// killed, if the deadline has already passed.
const PIPE_GRACE: Duration = Duration::from_millis(100);

/// Captured result of an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code, or [`FAILED_TO_RUN`].
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Creates a successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Creates a failed output with the given code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Capability to run an external program with a bounded timeout.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> CommandOutput;

    /// Runs a program whose output nobody reads, such as a desktop launcher
    /// that may leave a long-lived process behind. Only the exit code is
    /// meaningful in the result.
    fn run_detached(&self, program: &str, args: &[&str], timeout: Duration) -> CommandOutput {
        self.run(program, args, timeout)
    }
}

/// Formats a command line for log messages.
pub fn display_command(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Runs commands on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> CommandOutput {
        let line = display_command(program, args);
        log::debug!("running '{}' (timeout {}s)", line, timeout.as_secs());

        match run_with_timeout(program, args, timeout, true) {
            Ok(output) => output,
            Err(e) => {
                log::debug!("'{}' could not be run: {}", line, e);
                CommandOutput::failed(FAILED_TO_RUN, e.to_string())
            }
        }
    }

    fn run_detached(&self, program: &str, args: &[&str], timeout: Duration) -> CommandOutput {
        let line = display_command(program, args);
        log::debug!("running '{}' detached (timeout {}s)", line, timeout.as_secs());

        match run_with_timeout(program, args, timeout, false) {
            Ok(output) => output,
            Err(e) => {
                log::debug!("'{}' could not be run: {}", line, e);
                CommandOutput::failed(FAILED_TO_RUN, e.to_string())
            }
        }
    }
}

/// Spawns the command in a new process group and waits at most `timeout`.
///
/// stdout and stderr are drained on helper threads so a chatty child cannot
/// block on a full pipe while we wait. The readers are joined only until the
/// deadline: a background descendant keeping a pipe open must not hold us.
fn run_with_timeout(
    program: &str,
    args: &[&str],
    timeout: Duration,
    capture: bool,
) -> Result<CommandOutput> {
    let deadline = Instant::now() + timeout;
    let output_mode = || if capture { Stdio::piped() } else { Stdio::null() };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(output_mode())
        .stderr(output_mode())
        .process_group(0)
        .spawn()
        .command_context(program)?;

    let stdout = drain_in_background(child.stdout.take());
    let stderr = drain_in_background(child.stderr.take());

    let status = child.wait_timeout(timeout).command_context(program)?;

    let Some(status) = status else {
        kill_group(&mut child);
        return Ok(CommandOutput::failed(
            FAILED_TO_RUN,
            format!("{} timed out after {}s", program, timeout.as_secs()),
        ));
    };

    Ok(CommandOutput {
        exit_code: status.code().unwrap_or(FAILED_TO_RUN),
        stdout: collect(stdout, deadline),
        stderr: collect(stderr, deadline),
    })
}

/// Kills the child's whole process group and reaps the child.
fn kill_group(child: &mut Child) {
    match i32::try_from(child.id()) {
        Ok(pgid) => {
            if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                log::debug!("killpg({}) failed: {}", pgid, e);
                let _ = child.kill();
            }
        }
        Err(_) => {
            let _ = child.kill();
        }
    }
    let _ = child.wait();
}

fn drain_in_background(pipe: Option<impl Read + Send + 'static>) -> Option<Receiver<Vec<u8>>> {
    let mut pipe = pipe?;
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    Some(rx)
}

/// Waits for a reader until the deadline and decodes what it read.
///
/// A reader still blocked at the deadline is left behind; its thread ends
/// when the last holder of the pipe exits.
fn collect(reader: Option<Receiver<Vec<u8>>>, deadline: Instant) -> String {
    let Some(reader) = reader else {
        return String::new();
    };
    let wait = deadline
        .saturating_duration_since(Instant::now())
        .max(PIPE_GRACE);
    match reader.recv_timeout(wait) {
        Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => {
            log::debug!("output pipe still open at deadline, not waiting for it");
            String::new()
        }
    }
}

//! Scripted stand-ins for the host capabilities, used by unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::{CommandOutput, CommandRunner, display_command};
use crate::probe::SystemProbe;

type Effect = Box<dyn Fn()>;

/// Replays canned outputs per program and records every call.
///
/// Responses for a program are consumed in order; the last one repeats.
/// Programs without a script succeed with empty output. An effect registered
/// with [`FakeRunner::on_run`] runs before the program's response is returned,
/// standing in for what the real program would change on disk.
#[derive(Default)]
pub struct FakeRunner {
    responses: RefCell<HashMap<String, VecDeque<CommandOutput>>>,
    effects: HashMap<String, Effect>,
    calls: RefCell<Vec<String>>,
    detached: RefCell<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, program: &str, output: CommandOutput) -> Self {
        self.responses
            .borrow_mut()
            .entry(program.to_string())
            .or_default()
            .push_back(output);
        self
    }

    pub fn on_run(mut self, program: &str, effect: impl Fn() + 'static) -> Self {
        self.effects.insert(program.to_string(), Box::new(effect));
        self
    }

    /// Command lines run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Command lines run so far for `program`.
    pub fn calls_to(&self, program: &str) -> Vec<String> {
        let prefix = format!("{} ", program);
        self.calls
            .borrow()
            .iter()
            .filter(|line| line.starts_with(&prefix) || line.as_str() == program)
            .cloned()
            .collect()
    }

    /// Command lines that went through `run_detached`.
    pub fn detached_calls(&self) -> Vec<String> {
        self.detached.borrow().clone()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, program: &str, args: &[&str], _timeout: Duration) -> CommandOutput {
        self.calls
            .borrow_mut()
            .push(display_command(program, args));

        if let Some(effect) = self.effects.get(program) {
            effect();
        }

        let mut responses = self.responses.borrow_mut();
        match responses.get_mut(program) {
            Some(queue) if queue.len() > 1 => {
                queue.pop_front().unwrap_or_else(|| CommandOutput::ok(""))
            }
            Some(queue) => queue.front().cloned().unwrap_or_else(|| CommandOutput::ok("")),
            None => CommandOutput::ok(""),
        }
    }

    fn run_detached(&self, program: &str, args: &[&str], timeout: Duration) -> CommandOutput {
        self.detached
            .borrow_mut()
            .push(display_command(program, args));
        self.run(program, args, timeout)
    }
}

/// Answers metadata queries from fixed sets.
#[derive(Debug, Clone)]
pub struct FakeProbe {
    pub privileged: bool,
    pub block_devices: HashSet<PathBuf>,
    pub mount_points: HashSet<PathBuf>,
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self {
            privileged: true,
            block_devices: HashSet::new(),
            mount_points: HashSet::new(),
        }
    }
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unprivileged(mut self) -> Self {
        self.privileged = false;
        self
    }

    pub fn with_block_device(mut self, path: impl Into<PathBuf>) -> Self {
        self.block_devices.insert(path.into());
        self
    }

    pub fn with_mount_point(mut self, path: impl Into<PathBuf>) -> Self {
        self.mount_points.insert(path.into());
        self
    }
}

impl SystemProbe for FakeProbe {
    fn is_privileged(&self) -> bool {
        self.privileged
    }

    fn is_block_device(&self, path: &Path) -> bool {
        self.block_devices.contains(path)
    }

    fn is_mount_point(&self, path: &Path) -> bool {
        self.mount_points.contains(path)
    }
}

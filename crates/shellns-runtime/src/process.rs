//! Session process launching and supervision.
//!
//! The terminal layer that normally owns the process is abstracted behind
//! [`ProcessLauncher`]; [`NativeLauncher`] spawns a plain child process with
//! inherited stdio.

use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::{Duration, Instant};

use serde::Serialize;
use shellns_common::constants::TERMINATE_GRACE;
use shellns_common::error::{Result, ShellnsError};

use crate::command::Invocation;

/// Everything needed to start a session process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments after the program.
    pub args: Vec<String>,
    /// Working directory.
    pub working_dir: PathBuf,
    /// Complete environment as `KEY=VALUE` pairs.
    pub env: Vec<String>,
}

impl LaunchSpec {
    /// Combines an invocation with a session environment.
    #[must_use]
    pub fn new(invocation: &Invocation, env: Vec<String>) -> Self {
        Self {
            program: invocation.program.clone(),
            args: invocation.args.clone(),
            working_dir: invocation.working_dir.clone(),
            env,
        }
    }
}

/// A running session process.
pub trait SessionProcess: Send {
    /// Host pid of the process.
    fn pid(&self) -> u32;

    /// Whether the process has exited. Reaps it if so.
    fn has_exited(&mut self) -> bool;

    /// Stops the process if it is still running.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be signalled or reaped.
    fn terminate(&mut self) -> Result<()>;
}

/// Starts session processes.
pub trait ProcessLauncher: Send + Sync {
    /// Launches `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`ShellnsError::PermissionDenied`] if the program is not
    /// executable, or [`ShellnsError::Spawn`] for any other launch failure.
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn SessionProcess>>;
}

/// Spawns sessions as direct children of this process.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeLauncher;

impl ProcessLauncher for NativeLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn SessionProcess>> {
        let mut cmd = Command::new(&spec.program);
        let _ = cmd.args(&spec.args).env_clear();
        for pair in &spec.env {
            if let Some((key, value)) = pair.split_once('=') {
                let _ = cmd.env(key, value);
            }
        }
        if spec.working_dir.is_dir() {
            let _ = cmd.current_dir(&spec.working_dir);
        } else {
            tracing::warn!(dir = %spec.working_dir.display(), "working directory missing, inheriting");
        }

        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => ShellnsError::PermissionDenied {
                message: format!("cannot execute {}: {e}", spec.program),
            },
            _ => ShellnsError::Spawn {
                program: spec.program.clone(),
                source: e,
            },
        })?;
        tracing::info!(program = %spec.program, pid = child.id(), "session process started");
        Ok(Box::new(ChildProcess::new(child)))
    }
}

/// A [`SessionProcess`] backed by [`std::process::Child`].
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    grace: Duration,
    exited: bool,
}

impl ChildProcess {
    /// Wraps a spawned child with the default termination grace period.
    #[must_use]
    pub const fn new(child: Child) -> Self {
        Self {
            child,
            grace: TERMINATE_GRACE,
            exited: false,
        }
    }

    /// Blocks until the process exits and returns its exit code.
    ///
    /// # Errors
    ///
    /// Returns [`ShellnsError::Spawn`] if waiting fails.
    pub fn wait(&mut self) -> Result<Option<i32>> {
        let status = self.child.wait().map_err(|e| self.wait_error(e))?;
        self.exited = true;
        Ok(status.code())
    }

    fn wait_error(&self, source: std::io::Error) -> ShellnsError {
        ShellnsError::Spawn {
            program: format!("pid {}", self.child.id()),
            source,
        }
    }

    /// Polls for exit until `deadline`.
    fn exited_before(&mut self, deadline: Instant) -> bool {
        loop {
            if self.has_exited() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

impl SessionProcess for ChildProcess {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn has_exited(&mut self) -> bool {
        if !self.exited {
            self.exited = matches!(self.child.try_wait(), Ok(Some(_)));
        }
        self.exited
    }

    fn terminate(&mut self) -> Result<()> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        if self.has_exited() {
            return Ok(());
        }
        let pid = self.pid();
        let Ok(raw) = i32::try_from(pid) else {
            return Err(ShellnsError::Invocation {
                message: format!("pid {pid} out of range"),
            });
        };

        if kill(Pid::from_raw(raw), Signal::SIGTERM).is_ok() {
            tracing::info!(pid, "sent SIGTERM");
            if self.exited_before(Instant::now() + self.grace) {
                return Ok(());
            }
        }

        self.child.kill().map_err(|e| self.wait_error(e))?;
        tracing::info!(pid, "sent SIGKILL");
        let _ = self.wait()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(program: &str, args: &[&str]) -> LaunchSpec {
        LaunchSpec {
            program: program.into(),
            args: args.iter().map(|a| (*a).to_owned()).collect(),
            working_dir: PathBuf::from("/"),
            env: vec!["SHELLNS_TEST=1".into()],
        }
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = NativeLauncher
            .launch(&spec("/nonexistent/shellns-helper", &[]))
            .err()
            .unwrap();
        assert!(matches!(err, ShellnsError::Spawn { .. }));
    }

    #[test]
    fn exited_process_is_detected() {
        let mut process = NativeLauncher.launch(&spec("/bin/sh", &["-c", "exit 0"])).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !process.has_exited() {
            assert!(Instant::now() < deadline, "process never exited");
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(process.terminate().is_ok());
    }

    #[test]
    fn terminate_stops_running_process() {
        let mut process = NativeLauncher.launch(&spec("/bin/sh", &["-c", "sleep 30"])).unwrap();
        assert!(!process.has_exited());

        process.terminate().unwrap();

        assert!(process.has_exited());
    }
}

//! Execution of short-lived helper commands.
//!
//! Mounts and privileged liveness probes shell out to host tools. They go
//! through [`CommandRunner`] so callers can substitute a recording fake.

use std::process::Command;

use shellns_common::error::{Result, ShellnsError};

/// Result of a helper command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the command exited with status zero.
    pub success: bool,
    /// Exit code, if the command was not killed by a signal.
    pub code: Option<i32>,
    /// Combined stdout and stderr, lossily decoded.
    pub output: String,
}

/// Runs a helper command and waits for it.
pub trait CommandRunner: Send + Sync {
    /// Runs `argv[0]` with the remaining arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if `argv` is empty or the program cannot be started.
    fn run(&self, argv: &[String]) -> Result<CommandOutput>;
}

/// Runs commands on the host with [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        let (program, args) = argv.split_first().ok_or_else(|| ShellnsError::Invocation {
            message: "empty command".into(),
        })?;

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| ShellnsError::Spawn {
                program: program.clone(),
                source: e,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        tracing::trace!(cmd = ?argv, code = ?output.status.code(), "helper finished");

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            output: combined,
        })
    }
}

//! Process liveness probing for namespace owners.
//!
//! A probe answers one question: does this pid still name a process? Every
//! failure mode (bad pid, signal error, privilege tool missing or refusing)
//! answers "no", so a doubtful owner is reclaimed and recreated rather than
//! joined.

use std::sync::Arc;

use shellns_common::config::HostTools;

use crate::runner::{CommandRunner, SystemRunner};

/// Capability to check whether a process exists.
pub trait ProcessLivenessChecker: Send + Sync {
    /// Returns `true` only if `pid` names a live process.
    fn is_alive(&self, pid: u32) -> bool;
}

/// Converts a pid into a signal target, rejecting 0 and out-of-range values.
///
/// Signalling pid 0 would address the caller's own process group.
fn signal_target(pid: u32) -> Option<nix::unistd::Pid> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Some(nix::unistd::Pid::from_raw(raw)),
        _ => None,
    }
}

/// Probes with `kill(pid, 0)` from the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProbe;

impl ProcessLivenessChecker for SignalProbe {
    fn is_alive(&self, pid: u32) -> bool {
        let Some(target) = signal_target(pid) else {
            return false;
        };
        match nix::sys::signal::kill(target, None) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(pid, error = %e, "liveness probe failed");
                false
            }
        }
    }
}

/// Probes with `<su> -c "kill -0 <pid>"`, for owners running as root.
pub struct PrivilegedProbe {
    su: String,
    runner: Arc<dyn CommandRunner>,
}

impl PrivilegedProbe {
    /// Creates a probe that elevates through `su`.
    #[must_use]
    pub fn new(su: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            su: su.into(),
            runner,
        }
    }
}

impl std::fmt::Debug for PrivilegedProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivilegedProbe").field("su", &self.su).finish_non_exhaustive()
    }
}

impl ProcessLivenessChecker for PrivilegedProbe {
    fn is_alive(&self, pid: u32) -> bool {
        if signal_target(pid).is_none() {
            return false;
        }
        let argv = [self.su.clone(), "-c".to_owned(), format!("kill -0 {pid}")];
        match self.runner.run(&argv) {
            Ok(out) => out.success,
            Err(e) => {
                tracing::warn!(pid, error = %e, "privileged liveness probe could not run");
                false
            }
        }
    }
}

/// Returns the probe matching the configured privilege level.
#[must_use]
pub fn liveness_checker(elevated: bool, tools: &HostTools) -> Arc<dyn ProcessLivenessChecker> {
    if elevated {
        Arc::new(PrivilegedProbe::new(tools.su.clone(), Arc::new(SystemRunner)))
    } else {
        Arc::new(SignalProbe)
    }
}

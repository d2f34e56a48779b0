//! Bind mounts between the host and a container root.
//!
//! Mounting is best-effort: some host paths do not exist on every device, so
//! a failed mount is logged and skipped and never aborts session creation.
//! Targets already present in the mount table are skipped, which makes
//! [`MountManager::setup_mounts`] safe to call once per session.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shellns_common::config::HostTools;
use shellns_common::constants::CHROOT_BIND_PATHS;

use crate::privilege;
use crate::runner::CommandRunner;

/// Default mount table consulted before mounting.
pub const PROC_MOUNTS: &str = "/proc/self/mounts";

/// A host directory bound into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    /// Host path.
    pub source: PathBuf,
    /// Absolute mount point on the host, inside the container root.
    pub target: PathBuf,
}

/// Returns `root` joined with an absolute guest path.
#[must_use]
pub fn guest_path(root: &Path, guest: &str) -> PathBuf {
    root.join(guest.trim_start_matches('/'))
}

/// The ordered bind set for a chroot container rooted at `root`.
#[must_use]
pub fn chroot_bind_mounts(root: &Path) -> Vec<BindMount> {
    CHROOT_BIND_PATHS
        .iter()
        .map(|host| BindMount {
            source: PathBuf::from(host),
            target: guest_path(root, host),
        })
        .collect()
}

/// Decodes the octal escapes (`\040` and friends) used in mount tables.
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = std::str::from_utf8(&bytes[i + 1..i + 4]).unwrap_or("");
            if let Ok(value) = u8::from_str_radix(digits, 8) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parses the mount points out of a `/proc/mounts`-style table.
fn parse_mount_points(table: &str) -> HashSet<PathBuf> {
    table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(|field| PathBuf::from(unescape_mount_field(field)))
        .collect()
}

/// Applies and removes bind mounts through external `mount`/`umount`.
pub struct MountManager {
    runner: Arc<dyn CommandRunner>,
    tools: HostTools,
    mount_table: PathBuf,
}

impl std::fmt::Debug for MountManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountManager")
            .field("tools", &self.tools)
            .field("mount_table", &self.mount_table)
            .finish_non_exhaustive()
    }
}

impl MountManager {
    /// Creates a manager that consults [`PROC_MOUNTS`].
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, tools: HostTools) -> Self {
        Self {
            runner,
            tools,
            mount_table: PathBuf::from(PROC_MOUNTS),
        }
    }

    /// Uses a different mount table, e.g. a fixture file.
    #[must_use]
    pub fn with_mount_table(mut self, path: impl Into<PathBuf>) -> Self {
        self.mount_table = path.into();
        self
    }

    fn mounted_targets(&self) -> HashSet<PathBuf> {
        match std::fs::read_to_string(&self.mount_table) {
            Ok(table) => parse_mount_points(&table),
            Err(e) => {
                tracing::debug!(
                    table = %self.mount_table.display(),
                    error = %e,
                    "mount table unreadable, assuming nothing mounted"
                );
                HashSet::new()
            }
        }
    }

    /// Runs one helper command, logging instead of failing.
    fn run_best_effort(&self, argv: Vec<String>, elevated: bool) -> bool {
        let argv = if elevated {
            match privilege::elevate(&self.tools.su, &argv) {
                Ok(wrapped) => wrapped,
                Err(e) => {
                    tracing::warn!(cmd = ?argv, error = %e, "cannot elevate mount command");
                    return false;
                }
            }
        } else {
            argv
        };

        match self.runner.run(&argv) {
            Ok(out) if out.success => true,
            Ok(out) => {
                tracing::warn!(cmd = ?argv, code = ?out.code, output = %out.output.trim(), "command failed");
                false
            }
            Err(e) => {
                tracing::warn!(cmd = ?argv, error = %e, "command could not run");
                false
            }
        }
    }

    /// Bind-mounts the chroot bind set into `root`.
    ///
    /// Returns whether every mount is in place afterwards. Callers treat
    /// `false` as informational only.
    pub fn setup_mounts(&self, root: &Path, elevated: bool) -> bool {
        let mounted = self.mounted_targets();
        let mut all_ok = true;

        for bind in chroot_bind_mounts(root) {
            if mounted.contains(&bind.target) {
                tracing::debug!(mount_point = %bind.target.display(), "already mounted");
                continue;
            }
            if let Err(e) = std::fs::create_dir_all(&bind.target) {
                tracing::debug!(mount_point = %bind.target.display(), error = %e, "cannot create mount point");
            }

            let argv = vec![
                self.tools.mount.clone(),
                "--bind".to_owned(),
                bind.source.to_string_lossy().into_owned(),
                bind.target.to_string_lossy().into_owned(),
            ];
            if self.run_best_effort(argv, elevated) {
                tracing::debug!(
                    source = %bind.source.display(),
                    mount_point = %bind.target.display(),
                    "bind mounted"
                );
            } else {
                all_ok = false;
            }
        }

        tracing::info!(root = %root.display(), complete = all_ok, "container mounts set up");
        all_ok
    }

    /// Mounts a fresh procfs at `<root>/proc`.
    pub fn mount_proc(&self, root: &Path, elevated: bool) -> bool {
        let target = guest_path(root, "/proc");
        let argv = vec![
            self.tools.mount.clone(),
            "-t".to_owned(),
            "proc".to_owned(),
            "proc".to_owned(),
            target.to_string_lossy().into_owned(),
        ];
        self.run_best_effort(argv, elevated)
    }

    /// Unmounts proc and the chroot bind set from `root`, ignoring failures.
    pub fn cleanup_mounts(&self, root: &Path, elevated: bool) {
        let targets = std::iter::once(guest_path(root, "/proc"))
            .chain(chroot_bind_mounts(root).into_iter().map(|b| b.target));

        let mut failed = 0_usize;
        for target in targets {
            let argv = vec![self.tools.umount.clone(), target.to_string_lossy().into_owned()];
            if !self.run_best_effort(argv, elevated) {
                failed += 1;
            }
        }
        tracing::info!(root = %root.display(), failed, "container mounts cleaned up");
    }
}

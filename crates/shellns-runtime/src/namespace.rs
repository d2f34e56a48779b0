//! Shared namespace coordination.
//!
//! The registry tracks at most one [`NamespaceRecord`] per [`NamespaceType`]
//! together with the number of sessions attached to it. Every operation
//! takes the same lock for its whole duration, liveness probes and marker
//! I/O included, so "is there a namespace?" and "attach to it" can never be
//! split by a concurrent session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use shellns_common::types::NamespaceType;
use shellns_core::liveness::ProcessLivenessChecker;
use shellns_core::marker::MarkerFile;

/// A live shared namespace and its attachments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceRecord {
    /// Host pid of the process that owns the namespace.
    pub owner_pid: u32,
    /// Marker file that advertises `owner_pid`.
    pub marker_path: PathBuf,
    /// Sessions currently attached.
    pub attached_sessions: u32,
    /// When the record was installed or recovered.
    pub created_at: DateTime<Utc>,
}

impl NamespaceRecord {
    fn new(owner_pid: u32, marker_path: &Path, attached_sessions: u32) -> Self {
        Self {
            owner_pid,
            marker_path: marker_path.to_path_buf(),
            attached_sessions,
            created_at: Utc::now(),
        }
    }
}

/// Point-in-time statistics for one namespace slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceStats {
    /// Slot key.
    pub namespace: String,
    /// Owner pid.
    pub owner_pid: u32,
    /// Sessions currently attached.
    pub attached_sessions: u32,
    /// Seconds since the record was installed.
    pub uptime_secs: i64,
}

/// Reference-counted registry of shared namespaces.
pub struct NamespaceRegistry {
    records: Mutex<HashMap<NamespaceType, NamespaceRecord>>,
    liveness: Arc<dyn ProcessLivenessChecker>,
}

impl std::fmt::Debug for NamespaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceRegistry")
            .field("records", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl NamespaceRegistry {
    /// Creates an empty registry probing owners with `liveness`.
    #[must_use]
    pub fn new(liveness: Arc<dyn ProcessLivenessChecker>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            liveness,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<NamespaceType, NamespaceRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attaches a session to the namespace of `ty`, if one is live.
    ///
    /// With no in-memory record, the marker at `marker_path` is consulted:
    /// a live owner is adopted, a dead or unreadable one has its marker
    /// deleted. Returns `None` when the caller must create the namespace
    /// itself, and always `None` for a type that is not shared.
    pub fn register_session(&self, ty: &NamespaceType, marker_path: &Path) -> Option<NamespaceRecord> {
        if !ty.is_shared() {
            tracing::debug!(namespace = %ty, "namespace sharing inactive, skipping registration");
            return None;
        }

        let mut records = self.lock();
        if !records.contains_key(ty) {
            if let Some(recovered) = self.recover(ty, marker_path) {
                let _ = records.insert(*ty, recovered);
            }
        }

        match records.get_mut(ty) {
            Some(record) => {
                record.attached_sessions += 1;
                tracing::info!(
                    namespace = %ty,
                    pid = record.owner_pid,
                    attached = record.attached_sessions,
                    "session attached to existing namespace"
                );
                Some(record.clone())
            }
            None => {
                tracing::info!(namespace = %ty, "no live namespace, caller creates one");
                None
            }
        }
    }

    /// Rebuilds a record from the marker file, deleting stale markers.
    fn recover(&self, ty: &NamespaceType, marker_path: &Path) -> Option<NamespaceRecord> {
        let marker = MarkerFile::new(marker_path);
        match marker.read_pid() {
            Ok(None) => None,
            Ok(Some(pid)) if self.liveness.is_alive(pid) => {
                tracing::info!(namespace = %ty, pid, "recovered namespace from marker");
                Some(NamespaceRecord::new(pid, marker_path, 0))
            }
            Ok(Some(pid)) => {
                tracing::info!(namespace = %ty, pid, "marker points at dead owner");
                discard_marker(&marker);
                None
            }
            Err(e) => {
                tracing::warn!(namespace = %ty, error = %e, "unreadable marker");
                discard_marker(&marker);
                None
            }
        }
    }

    /// Installs `pid` as the owner of `ty` with one attached session.
    ///
    /// Replaces any previous record for the type.
    pub fn notify_namespace_created(&self, ty: &NamespaceType, pid: u32, marker_path: &Path) {
        if !ty.is_shared() {
            return;
        }
        let previous = self
            .lock()
            .insert(*ty, NamespaceRecord::new(pid, marker_path, 1));
        if let Some(old) = previous {
            tracing::warn!(namespace = %ty, old_pid = old.owner_pid, pid, "namespace owner replaced");
        } else {
            tracing::info!(namespace = %ty, pid, "namespace created");
        }
    }

    /// Detaches one session from `ty`.
    ///
    /// At zero attachments the record is forgotten. The owner process and
    /// its marker are left alone: the owner lives until its init exits.
    pub fn unregister_session(&self, ty: &NamespaceType) {
        if !ty.is_shared() {
            return;
        }
        let mut records = self.lock();
        let Some(record) = records.get_mut(ty) else {
            tracing::debug!(namespace = %ty, "unregister without a record");
            return;
        };

        record.attached_sessions = record.attached_sessions.saturating_sub(1);
        tracing::info!(
            namespace = %ty,
            pid = record.owner_pid,
            attached = record.attached_sessions,
            "session detached"
        );
        if record.attached_sessions == 0 {
            if let Some(removed) = records.remove(ty) {
                tracing::info!(namespace = %ty, pid = removed.owner_pid, "namespace released");
            }
        }
    }

    /// Returns a snapshot of the record for `ty`.
    pub fn namespace_info(&self, ty: &NamespaceType) -> Option<NamespaceRecord> {
        if !ty.is_shared() {
            return None;
        }
        self.lock().get(ty).cloned()
    }

    /// Drops every record whose owner is dead and deletes its marker.
    ///
    /// Returns the number of namespaces reclaimed.
    pub fn cleanup_stale_namespaces(&self) -> usize {
        let mut records = self.lock();
        let before = records.len();
        records.retain(|ty, record| {
            if self.liveness.is_alive(record.owner_pid) {
                return true;
            }
            tracing::info!(namespace = %ty, pid = record.owner_pid, "reclaiming stale namespace");
            discard_marker(&MarkerFile::new(&record.marker_path));
            false
        });
        before - records.len()
    }

    /// Per-slot statistics, sorted by slot key.
    pub fn stats(&self) -> Vec<NamespaceStats> {
        let now = Utc::now();
        let mut stats: Vec<_> = self
            .lock()
            .iter()
            .map(|(ty, record)| NamespaceStats {
                namespace: ty.slug(),
                owner_pid: record.owner_pid,
                attached_sessions: record.attached_sessions,
                uptime_secs: (now - record.created_at).num_seconds(),
            })
            .collect();
        stats.sort_by(|a, b| a.namespace.cmp(&b.namespace));
        stats
    }

    /// Forgets every record. Markers and owner processes are untouched.
    pub fn shutdown(&self) {
        let mut records = self.lock();
        let dropped = records.len();
        records.clear();
        tracing::info!(dropped, "namespace registry shut down");
    }
}

fn discard_marker(marker: &MarkerFile) {
    if let Err(e) = marker.remove() {
        tracing::warn!(path = %marker.path().display(), error = %e, "cannot delete stale marker");
    }
}

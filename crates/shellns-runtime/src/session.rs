//! Live session tracking.
//!
//! [`SessionRegistry`] owns every running session process and keeps the
//! [`NamespaceRegistry`] attachment counts in step with them. Namespace
//! bookkeeping that may block (polling a new owner's marker, releasing an
//! attachment) is queued to a single worker task on the tokio runtime, so
//! the events for one namespace are applied in the order they happened.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shellns_common::config::SessionConfig;
use shellns_common::constants::{MARKER_POLL_ATTEMPTS, MARKER_POLL_INTERVAL};
use shellns_common::error::{Result, ShellnsError};
use shellns_common::types::{LaunchMode, NamespaceType, SessionId};
use shellns_core::filesystem::mount::MountManager;
use shellns_core::marker::MarkerFile;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::command::{NamespaceDecision, build_command};
use crate::env::{session_environment, session_tmp_dir};
use crate::namespace::NamespaceRegistry;
use crate::process::{LaunchSpec, ProcessLauncher, SessionProcess};
use crate::setup::apply_host_setup;

/// Public view of a live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Session identifier.
    pub id: SessionId,
    /// Host pid of the session process.
    pub pid: u32,
    /// Launch strategy used.
    pub mode: LaunchMode,
    /// Shared-namespace decision taken at creation.
    pub namespace: NamespaceDecision,
    /// Launch time.
    pub created_at: DateTime<Utc>,
}

struct Session {
    info: SessionInfo,
    process: Box<dyn SessionProcess>,
}

#[derive(Default)]
struct SessionTable {
    live: HashMap<SessionId, Session>,
    starting: HashSet<SessionId>,
}

/// How long to wait for a new owner to write its marker.
#[derive(Debug, Clone, Copy)]
struct OwnerPoll {
    attempts: u32,
    interval: Duration,
}

enum NamespaceEvent {
    OwnerLaunched {
        namespace: NamespaceType,
        marker_path: PathBuf,
        launched_pid: u32,
        poll: OwnerPoll,
    },
    Detached {
        namespace: NamespaceType,
    },
    Flush(oneshot::Sender<()>),
}

/// Maps session ids to running processes.
pub struct SessionRegistry {
    table: Mutex<SessionTable>,
    namespaces: Arc<NamespaceRegistry>,
    mounts: MountManager,
    launcher: Arc<dyn ProcessLauncher>,
    events: mpsc::UnboundedSender<NamespaceEvent>,
    owner_poll: OwnerPoll,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .field("namespaces", &self.namespaces)
            .finish_non_exhaustive()
    }
}

/// Releases a join attachment unless the session was recorded.
struct Attachment<'a> {
    namespaces: &'a NamespaceRegistry,
    namespace: Option<NamespaceType>,
}

impl Attachment<'_> {
    fn disarm(mut self) {
        self.namespace = None;
    }
}

impl Drop for Attachment<'_> {
    fn drop(&mut self) {
        if let Some(namespace) = self.namespace.take() {
            tracing::debug!(%namespace, "session start failed, releasing attachment");
            self.namespaces.unregister_session(&namespace);
        }
    }
}

/// Frees a reserved id unless the session was recorded.
struct Reservation<'a> {
    table: &'a Mutex<SessionTable>,
    id: Option<SessionId>,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            let _ = lock(self.table).starting.remove(&id);
        }
    }
}

fn lock(table: &Mutex<SessionTable>) -> MutexGuard<'_, SessionTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionRegistry {
    /// Creates a registry whose namespace bookkeeping runs on `runtime`.
    #[must_use]
    pub fn new(
        namespaces: Arc<NamespaceRegistry>,
        mounts: MountManager,
        launcher: Arc<dyn ProcessLauncher>,
        runtime: &Handle,
    ) -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        drop(runtime.spawn(namespace_worker(rx, Arc::clone(&namespaces))));
        Self {
            table: Mutex::new(SessionTable::default()),
            namespaces,
            mounts,
            launcher,
            events,
            owner_poll: OwnerPoll {
                attempts: MARKER_POLL_ATTEMPTS,
                interval: MARKER_POLL_INTERVAL,
            },
        }
    }

    /// Overrides how long a new owner's marker is polled.
    #[must_use]
    pub fn with_owner_poll(mut self, attempts: u32, interval: Duration) -> Self {
        self.owner_poll = OwnerPoll { attempts, interval };
        self
    }

    /// The namespace registry sessions are counted in.
    #[must_use]
    pub const fn namespaces(&self) -> &Arc<NamespaceRegistry> {
        &self.namespaces
    }

    fn table(&self) -> MutexGuard<'_, SessionTable> {
        lock(&self.table)
    }

    fn send(&self, event: NamespaceEvent) {
        if self.events.send(event).is_err() {
            tracing::error!("namespace worker is gone, event dropped");
        }
    }

    /// Starts a session for `config` under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ShellnsError::AlreadyExists`] for a live or starting
    /// duplicate id, or the construction, setup, or launch error. A failed
    /// start never leaves a namespace attachment behind.
    pub fn create_session(&self, id: SessionId, config: &SessionConfig) -> Result<SessionInfo> {
        let _reservation = self.reserve(&id)?;

        let invocation = build_command(config, &self.namespaces)?;
        let attachment = Attachment {
            namespaces: &self.namespaces,
            namespace: match &invocation.namespace {
                NamespaceDecision::Join { namespace, .. } => Some(*namespace),
                _ => None,
            },
        };

        apply_host_setup(&invocation.host_setup, &self.mounts)?;
        let scratch = session_tmp_dir(config, &id);
        if let Err(e) = std::fs::create_dir_all(&scratch) {
            tracing::warn!(dir = %scratch.display(), error = %e, "cannot create session scratch dir");
        }

        let spec = LaunchSpec::new(&invocation, session_environment(config, &id));
        let process = self.launcher.launch(&spec)?;
        let pid = process.pid();
        attachment.disarm();

        if let NamespaceDecision::Create {
            namespace,
            marker_path,
        } = &invocation.namespace
        {
            self.send(NamespaceEvent::OwnerLaunched {
                namespace: *namespace,
                marker_path: marker_path.clone(),
                launched_pid: pid,
                poll: self.owner_poll,
            });
        }

        let info = SessionInfo {
            id: id.clone(),
            pid,
            mode: invocation.mode,
            namespace: invocation.namespace,
            created_at: Utc::now(),
        };
        tracing::info!(session = %id, pid, mode = %info.mode, "session created");

        let mut table = self.table();
        let _ = table.starting.remove(&id);
        let _ = table.live.insert(
            id,
            Session {
                info: info.clone(),
                process,
            },
        );
        Ok(info)
    }

    fn reserve(&self, id: &SessionId) -> Result<Reservation<'_>> {
        let mut table = self.table();
        if table.live.contains_key(id) || !table.starting.insert(id.clone()) {
            return Err(ShellnsError::AlreadyExists {
                kind: "session",
                id: id.to_string(),
            });
        }
        Ok(Reservation {
            table: &self.table,
            id: Some(id.clone()),
        })
    }

    /// Stops a session's process and releases its namespace attachment.
    ///
    /// Returns `false` if no such session is live.
    pub fn terminate_session(&self, id: &SessionId) -> bool {
        let Some(session) = self.table().live.remove(id) else {
            tracing::debug!(session = %id, "terminate for unknown session");
            return false;
        };
        self.finish(session, true);
        true
    }

    /// Stops every session. Returns how many were stopped.
    pub fn terminate_all(&self) -> usize {
        let sessions: Vec<Session> = self.table().live.drain().map(|(_, s)| s).collect();
        let count = sessions.len();
        for session in sessions {
            self.finish(session, true);
        }
        tracing::info!(count, "all sessions terminated");
        count
    }

    /// Forgets sessions whose process has exited on its own.
    pub fn reap_exited(&self) -> Vec<SessionId> {
        let exited: Vec<Session> = {
            let mut table = self.table();
            let ids: Vec<SessionId> = table
                .live
                .iter_mut()
                .filter_map(|(id, s)| s.process.has_exited().then(|| id.clone()))
                .collect();
            ids.iter().filter_map(|id| table.live.remove(id)).collect()
        };

        exited
            .into_iter()
            .map(|session| {
                let id = session.info.id.clone();
                self.finish(session, false);
                id
            })
            .collect()
    }

    fn finish(&self, mut session: Session, stop: bool) {
        let id = &session.info.id;
        if stop {
            if let Err(e) = session.process.terminate() {
                tracing::warn!(session = %id, error = %e, "session process did not stop cleanly");
            }
        }
        if let Some(namespace) = session.info.namespace.attached() {
            self.send(NamespaceEvent::Detached { namespace });
        }
        tracing::info!(session = %id, pid = session.info.pid, "session ended");
    }

    /// Snapshot of one session.
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<SessionInfo> {
        self.table().live.get(id).map(|s| s.info.clone())
    }

    /// Snapshot of every live session, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<_> = self.table().live.values().map(|s| s.info.clone()).collect();
        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        sessions
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table().live.len()
    }

    /// Whether no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits until every namespace event queued so far has been applied.
    pub async fn settle(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(NamespaceEvent::Flush(tx));
        if rx.await.is_err() {
            tracing::warn!("namespace worker stopped before settling");
        }
    }
}

async fn namespace_worker(
    mut events: mpsc::UnboundedReceiver<NamespaceEvent>,
    namespaces: Arc<NamespaceRegistry>,
) {
    while let Some(event) = events.recv().await {
        if let NamespaceEvent::Flush(ack) = event {
            let _ = ack.send(());
            continue;
        }
        let namespaces = Arc::clone(&namespaces);
        if let Err(e) = tokio::task::spawn_blocking(move || apply_event(&namespaces, event)).await {
            tracing::error!(error = %e, "namespace event task failed");
        }
    }
    tracing::debug!("namespace worker stopped");
}

fn apply_event(namespaces: &NamespaceRegistry, event: NamespaceEvent) {
    match event {
        NamespaceEvent::OwnerLaunched {
            namespace,
            marker_path,
            launched_pid,
            poll,
        } => {
            // The launched pid is a wrapper outside the new namespace, so it
            // is never recorded as the owner.
            match wait_for_owner(&MarkerFile::new(&marker_path), poll) {
                Some(pid) => namespaces.notify_namespace_created(&namespace, pid, &marker_path),
                None => tracing::warn!(
                    %namespace,
                    launched_pid,
                    marker = %marker_path.display(),
                    "owner never wrote its marker, namespace not recorded"
                ),
            }
        }
        NamespaceEvent::Detached { namespace } => namespaces.unregister_session(&namespace),
        NamespaceEvent::Flush(ack) => {
            let _ = ack.send(());
        }
    }
}

fn wait_for_owner(marker: &MarkerFile, poll: OwnerPoll) -> Option<u32> {
    for attempt in 0..poll.attempts {
        match marker.read_pid() {
            Ok(Some(pid)) => return Some(pid),
            Ok(None) => {}
            Err(e) => tracing::debug!(attempt, error = %e, "marker not ready"),
        }
        std::thread::sleep(poll.interval);
    }
    None
}

//! Domain primitive types used across the shellns workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a shell session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a new session ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random session ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a session reaches its container root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerMode {
    /// Re-exec into the root through a user-space isolation helper (proot).
    #[default]
    PlainRoot,
    /// Enter the root with `chroot`, optionally inside fresh namespaces.
    Chroot,
}

impl fmt::Display for ContainerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlainRoot => write!(f, "plain-root"),
            Self::Chroot => write!(f, "chroot"),
        }
    }
}

/// Key identifying one shareable namespace slot.
///
/// Derived from container mode, namespace isolation, and sharing. Only the
/// chroot + isolation + sharing combination names a slot that sessions can
/// attach to; every other key is inert for the namespace registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceType {
    mode: ContainerMode,
    isolated: bool,
    shared: bool,
}

impl NamespaceType {
    /// Builds a key, forcing `shared` off when `isolated` is off.
    #[must_use]
    pub const fn new(mode: ContainerMode, isolated: bool, shared: bool) -> Self {
        Self {
            mode,
            isolated,
            shared: isolated && shared,
        }
    }

    /// Key of the single shared chroot namespace slot.
    #[must_use]
    pub const fn shared_chroot() -> Self {
        Self::new(ContainerMode::Chroot, true, true)
    }

    /// Whether sessions with this key attach to a shared namespace.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.mode == ContainerMode::Chroot && self.isolated && self.shared
    }

    /// Stable, filesystem-safe name for this key.
    #[must_use]
    pub fn slug(&self) -> String {
        let isolation = if self.isolated { "isolated" } else { "host" };
        let sharing = if self.shared { "shared" } else { "private" };
        format!("{}-{isolation}-{sharing}", self.mode)
    }

    /// Name of the marker file recording this slot's owner pid.
    #[must_use]
    pub fn marker_file_name(&self) -> String {
        format!(".ns-{}.pid", self.slug())
    }
}

impl fmt::Display for NamespaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.slug())
    }
}

/// The launch strategy selected by a session configuration.
///
/// Each variant corresponds to one row of the command decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    /// proot re-exec into the container root.
    PlainRoot,
    /// chroot on the host's namespaces, mounts done beforehand on the host.
    Chroot,
    /// chroot inside a private set of namespaces, one per session.
    ChrootIsolated,
    /// chroot inside a namespace shared by every session.
    ChrootShared,
}

impl fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlainRoot => write!(f, "plain-root"),
            Self::Chroot => write!(f, "chroot"),
            Self::ChrootIsolated => write!(f, "chroot-isolated"),
            Self::ChrootShared => write!(f, "chroot-shared"),
        }
    }
}

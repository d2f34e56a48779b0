//! Persisted namespace-owner markers.
//!
//! A marker is a plain-text file holding the decimal pid of the process that
//! owns a shared namespace. The owner writes it right after the namespace
//! exists; joiners read it; stale-namespace cleanup deletes it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use shellns_common::error::{Result, ShellnsError};

/// Handle to one marker file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerFile {
    path: PathBuf,
}

impl MarkerFile {
    /// Creates a handle; nothing is touched on disk.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the marker.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file a new pid is written to before being renamed into place.
    #[must_use]
    pub fn staging_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }

    /// Whether the marker currently exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads the recorded pid.
    ///
    /// Returns `Ok(None)` when no marker exists.
    ///
    /// # Errors
    ///
    /// Returns [`ShellnsError::Io`] if the marker cannot be read and
    /// [`ShellnsError::CorruptMarker`] if it does not hold a positive pid.
    pub fn read_pid(&self) -> Result<Option<u32>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ShellnsError::Io {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };
        let trimmed = content.trim();
        match trimmed.parse::<u32>() {
            Ok(pid) if pid > 0 => Ok(Some(pid)),
            _ => Err(ShellnsError::CorruptMarker {
                path: self.path.clone(),
                content: trimmed.to_owned(),
            }),
        }
    }

    /// Creates the directory the marker lives in.
    ///
    /// # Errors
    ///
    /// Returns [`ShellnsError::Io`] if the directory cannot be created.
    pub fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ShellnsError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Records `pid`, replacing any previous owner.
    ///
    /// Written to a sibling file and renamed so readers never see a partial
    /// pid.
    ///
    /// # Errors
    ///
    /// Returns [`ShellnsError::Io`] if the marker cannot be written.
    pub fn write_pid(&self, pid: u32) -> Result<()> {
        self.ensure_parent()?;
        let tmp = self.staging_path();
        std::fs::write(&tmp, format!("{pid}\n")).map_err(|e| ShellnsError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| ShellnsError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        tracing::debug!(path = %self.path.display(), pid, "marker written");
        Ok(())
    }

    /// Deletes the marker. Returns whether a file was removed.
    ///
    /// # Errors
    ///
    /// Returns [`ShellnsError::Io`] for any failure other than the marker
    /// already being gone.
    pub fn remove(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "marker removed");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ShellnsError::Io {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}

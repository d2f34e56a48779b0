//! Session configuration model.
//!
//! Settings are owned by the embedding application; shellns only reads them.
//! A [`SessionConfig`] is normalised on construction from a file so that
//! namespace sharing can never be requested without namespace isolation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, ShellnsError};
use crate::types::{ContainerMode, LaunchMode, NamespaceType};

/// External helpers invoked by the command builder and mount manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostTools {
    /// Privilege elevation tool, called as `<su> -c <command line>`.
    pub su: String,
    /// Namespace creation helper.
    pub unshare: String,
    /// Namespace entry helper.
    pub nsenter: String,
    /// Root switching helper.
    pub chroot: String,
    /// Mount helper.
    pub mount: String,
    /// Unmount helper.
    pub umount: String,
    /// Host shell used to run in-namespace setup scripts.
    pub host_shell: String,
    /// Dynamic linker used to start the proot helper.
    pub linker: String,
}

impl Default for HostTools {
    fn default() -> Self {
        Self {
            su: "su".into(),
            unshare: "unshare".into(),
            nsenter: "nsenter".into(),
            chroot: "chroot".into(),
            mount: "mount".into(),
            umount: "umount".into(),
            host_shell: "/system/bin/sh".into(),
            linker: constants::LINKER64.into(),
        }
    }
}

/// Container-mode settings for one session.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How the session reaches its container root.
    #[serde(default)]
    pub container_mode: ContainerMode,
    /// Run chroot sessions inside fresh namespaces.
    #[serde(default)]
    pub use_namespace_isolation: bool,
    /// Let later sessions join the first session's namespace.
    #[serde(default)]
    pub share_namespace: bool,
    /// Wrap every invocation in the privilege tool.
    #[serde(default)]
    pub use_elevated_privilege: bool,
    /// Exported to the shell as `SECCOMP=1`; not interpreted here.
    #[serde(default)]
    pub seccomp: bool,
    /// Root filesystem of the container.
    pub container_root_dir: PathBuf,
    /// Directory holding native helper libraries (proot).
    pub native_lib_dir: PathBuf,
    /// Application prefix; local state lives under `<prefix>/local`.
    pub prefix_dir: PathBuf,
    /// Helper binaries.
    #[serde(default)]
    pub tools: HostTools,
}

impl SessionConfig {
    /// Creates a configuration with every switch off.
    #[must_use]
    pub fn new(
        container_mode: ContainerMode,
        container_root_dir: impl Into<PathBuf>,
        native_lib_dir: impl Into<PathBuf>,
        prefix_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            container_mode,
            use_namespace_isolation: false,
            share_namespace: false,
            use_elevated_privilege: false,
            seccomp: false,
            container_root_dir: container_root_dir.into(),
            native_lib_dir: native_lib_dir.into(),
            prefix_dir: prefix_dir.into(),
            tools: HostTools::default(),
        }
    }

    /// Loads a configuration from a JSON file, normalised and validated.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// names relative directories.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ShellnsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Forces `share_namespace` off when namespace isolation is off.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if !self.use_namespace_isolation {
            self.share_namespace = false;
        }
        self
    }

    /// Checks that every directory is absolute.
    ///
    /// Paths end up inside shell scripts executed from other working
    /// directories, so relative paths would silently point elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`ShellnsError::Config`] naming the first relative directory.
    pub fn validate(&self) -> Result<()> {
        for (name, dir) in [
            ("container_root_dir", &self.container_root_dir),
            ("native_lib_dir", &self.native_lib_dir),
            ("prefix_dir", &self.prefix_dir),
        ] {
            if !dir.is_absolute() {
                return Err(ShellnsError::Config {
                    message: format!("{name} must be absolute, got {}", dir.display()),
                });
            }
        }
        Ok(())
    }

    /// Row of the decision table this configuration selects.
    #[must_use]
    pub const fn launch_mode(&self) -> LaunchMode {
        match self.container_mode {
            ContainerMode::PlainRoot => LaunchMode::PlainRoot,
            ContainerMode::Chroot if !self.use_namespace_isolation => LaunchMode::Chroot,
            ContainerMode::Chroot if self.share_namespace => LaunchMode::ChrootShared,
            ContainerMode::Chroot => LaunchMode::ChrootIsolated,
        }
    }

    /// Namespace slot key for this configuration.
    #[must_use]
    pub const fn namespace_type(&self) -> NamespaceType {
        NamespaceType::new(
            self.container_mode,
            self.use_namespace_isolation,
            self.share_namespace,
        )
    }

    /// Local-state directory (`<prefix>/local`).
    #[must_use]
    pub fn local_dir(&self) -> PathBuf {
        constants::local_dir(&self.prefix_dir)
    }

    /// Helper binary directory (`<prefix>/local/bin`).
    #[must_use]
    pub fn bin_dir(&self) -> PathBuf {
        constants::local_bin_dir(&self.prefix_dir)
    }

    /// Marker file for this configuration's namespace slot.
    #[must_use]
    pub fn marker_path(&self) -> PathBuf {
        self.local_dir()
            .join(self.namespace_type().marker_file_name())
    }

    /// Host path of the container's home directory.
    #[must_use]
    pub fn guest_home_on_host(&self) -> PathBuf {
        self.container_root_dir
            .join(constants::GUEST_HOME.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chroot() -> SessionConfig {
        SessionConfig::new(
            ContainerMode::Chroot,
            "/data/alpine",
            "/data/app/lib",
            "/data/files/usr",
        )
    }

    #[test]
    fn normalisation_drops_sharing_without_isolation() {
        let mut cfg = chroot();
        cfg.share_namespace = true;
        let cfg = cfg.normalized();
        assert!(!cfg.share_namespace);
        assert_eq!(cfg.launch_mode(), LaunchMode::Chroot);
    }

    #[test]
    fn launch_mode_follows_switches() {
        let mut cfg = chroot();
        assert_eq!(cfg.launch_mode(), LaunchMode::Chroot);
        cfg.use_namespace_isolation = true;
        assert_eq!(cfg.launch_mode(), LaunchMode::ChrootIsolated);
        cfg.share_namespace = true;
        assert_eq!(cfg.launch_mode(), LaunchMode::ChrootShared);
        cfg.container_mode = ContainerMode::PlainRoot;
        assert_eq!(cfg.launch_mode(), LaunchMode::PlainRoot);
    }

    #[test]
    fn marker_lives_in_local_dir() {
        let mut cfg = chroot();
        cfg.use_namespace_isolation = true;
        cfg.share_namespace = true;
        assert_eq!(
            cfg.marker_path(),
            PathBuf::from("/data/files/usr/local/.ns-chroot-isolated-shared.pid")
        );
    }

    #[test]
    fn guest_home_is_under_root() {
        assert_eq!(chroot().guest_home_on_host(), PathBuf::from("/data/alpine/root"));
    }

    #[test]
    fn validate_rejects_relative_dirs() {
        let mut cfg = chroot();
        cfg.prefix_dir = PathBuf::from("usr");
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("prefix_dir"));
    }

    #[test]
    fn load_normalises_and_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "container_mode": "chroot",
                "share_namespace": true,
                "container_root_dir": "/data/alpine",
                "native_lib_dir": "/data/app/lib",
                "prefix_dir": "/data/files/usr"
            }"#,
        )
        .unwrap();

        let cfg = SessionConfig::load(&path).unwrap();
        assert!(!cfg.share_namespace);
        assert!(!cfg.use_elevated_privilege);
        assert_eq!(cfg.tools, HostTools::default());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = SessionConfig::load(Path::new("/nonexistent/settings.json")).unwrap_err();
        assert!(matches!(err, ShellnsError::Io { .. }));
    }
}

//! Session settings from a JSON file or command-line flags.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, ValueEnum};
use shellns_common::config::SessionConfig;
use shellns_common::types::ContainerMode;
use shellns_core::tools::detect_host_tools;

/// Container mode as spelled on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    /// proot into the container root.
    PlainRoot,
    /// chroot into the container root.
    Chroot,
}

impl From<ModeArg> for ContainerMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::PlainRoot => Self::PlainRoot,
            ModeArg::Chroot => Self::Chroot,
        }
    }
}

/// Flags describing the session configuration.
#[allow(clippy::struct_excessive_bools)]
#[derive(Args, Debug, Clone)]
pub struct SettingsArgs {
    /// JSON settings file. Flags below are ignored when given, except
    /// `--detect-tools`.
    #[arg(long, global = true, env = "SHELLNS_CONFIG")]
    pub config: Option<PathBuf>,

    /// How the session reaches the container root.
    #[arg(long, global = true, value_enum, default_value = "plain-root", env = "SHELLNS_MODE")]
    pub mode: ModeArg,

    /// Run chroot sessions inside fresh namespaces.
    #[arg(long, global = true)]
    pub isolate: bool,

    /// Let later sessions join the first session's namespace.
    #[arg(long, global = true)]
    pub share: bool,

    /// Wrap every helper invocation in `su -c`.
    #[arg(long, global = true)]
    pub elevated: bool,

    /// Export `SECCOMP=1` to the session.
    #[arg(long, global = true)]
    pub seccomp: bool,

    /// Container root filesystem.
    #[arg(long, global = true, env = "SHELLNS_ROOT")]
    pub root: Option<PathBuf>,

    /// Directory holding bundled native helpers.
    #[arg(long, global = true, env = "SHELLNS_NATIVE_LIB_DIR")]
    pub native_lib_dir: Option<PathBuf>,

    /// Application prefix; state lives under `<prefix>/local`.
    #[arg(long, global = true, env = "SHELLNS_PREFIX")]
    pub prefix: Option<PathBuf>,

    /// Resolve helper binaries on `$PATH` instead of using bare names.
    #[arg(long, global = true)]
    pub detect_tools: bool,
}

impl SettingsArgs {
    /// Builds a validated, normalised configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file cannot be loaded, a required
    /// directory flag is missing, or a directory is not absolute.
    pub fn resolve(&self) -> anyhow::Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load(path)
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => self.from_flags()?,
        };
        if self.detect_tools {
            config.tools = detect_host_tools();
        }
        tracing::debug!(?config, "settings resolved");
        Ok(config)
    }

    fn from_flags(&self) -> anyhow::Result<SessionConfig> {
        let required = |value: &Option<PathBuf>, flag: &str| {
            value
                .clone()
                .with_context(|| format!("--{flag} is required without --config"))
        };

        let mut config = SessionConfig::new(
            self.mode.into(),
            required(&self.root, "root")?,
            required(&self.native_lib_dir, "native-lib-dir")?,
            required(&self.prefix, "prefix")?,
        );
        config.use_namespace_isolation = self.isolate;
        config.share_namespace = self.share;
        config.use_elevated_privilege = self.elevated;
        config.seccomp = self.seccomp;

        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }
}

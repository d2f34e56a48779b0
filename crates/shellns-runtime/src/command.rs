//! Command construction for every container launch mode.
//!
//! [`build_command`] is the single decision table: it maps a
//! [`SessionConfig`] to an [`Invocation`] describing the program to start,
//! what must happen on the host before it starts, and which steps run inside
//! a fresh namespace. Only the shared-namespace row consults the
//! [`NamespaceRegistry`].
//!
//! Argument vectors are kept structured until the very end. The only
//! strings handed to a shell are the in-namespace script and the elevated
//! command line, and both are produced by the shell-word quoter.

use std::path::{Path, PathBuf};

use serde::Serialize;
use shellns_common::config::SessionConfig;
use shellns_common::constants::{
    CHROOT_BIND_PATHS, GUEST_HOME, GUEST_INIT, GUEST_LOGIN, GUEST_SHELL, PROOT_BINARY,
    PROOT_DEVICE_BINDS, PROOT_EXTRA_BIND_PATHS, PROOT_LIBRARY, STAT_SHIM, STAT_SHIM_NAME,
    VMSTAT_SHIM, VMSTAT_SHIM_NAME,
};
use shellns_common::error::{Result, ShellnsError};
use shellns_common::types::{LaunchMode, NamespaceType};
use shellns_core::filesystem::mount::{chroot_bind_mounts, guest_path};
use shellns_core::marker::MarkerFile;
use shellns_core::namespace::NamespaceSelection;
use shellns_core::privilege::{elevate, quote};

use crate::namespace::NamespaceRegistry;

/// Shell command a joining session runs inside the shared namespace.
///
/// The shell is detached into its own session so it never becomes a
/// dependent child of the namespace's init.
pub const DETACHED_LOGIN: &str =
    "cd /root && (setsid /bin/sh </dev/null >/dev/null 2>&1 &) && sleep 0.1";

/// Work done on the host before the session process starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum HostSetup {
    /// Bind-mount the chroot bind set into `root` (best-effort).
    BindMounts {
        /// Container root.
        root: PathBuf,
        /// Mount through the privilege tool.
        elevated: bool,
    },
    /// Create a directory; failure aborts the session.
    EnsureDir {
        /// Directory to create.
        path: PathBuf,
    },
    /// Copy a helper binary into place and make it executable.
    StageHelper {
        /// Bundled helper.
        source: PathBuf,
        /// Executable location.
        dest: PathBuf,
    },
    /// Write a static file unless it already exists; failure aborts the
    /// session.
    WriteShim {
        /// File to create.
        path: PathBuf,
        /// Contents written when the file is missing.
        contents: String,
    },
}

/// One command of the script run inside a freshly unshared namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Record the wrapping shell's host pid in the marker file, or end the
    /// script if it cannot.
    PersistOwnerPid {
        /// Marker file.
        marker: PathBuf,
    },
    /// Mount procfs at `<root>/proc`.
    MountProc {
        /// Container root.
        root: PathBuf,
    },
    /// Bind-mount a host path.
    BindMount {
        /// Host path.
        source: PathBuf,
        /// Mount point inside the root.
        target: PathBuf,
    },
    /// Replace the shell with the container's init.
    ExecInit {
        /// Container root.
        root: PathBuf,
    },
    /// Start the container's init in the background and wait for it.
    RunInitAndWait {
        /// Container root.
        root: PathBuf,
    },
}

impl ScriptStep {
    /// Renders the step as one shell command line.
    ///
    /// Mount steps swallow their own failure so one missing host path
    /// cannot stop the script. The marker is staged and renamed so a reader
    /// never sees it half-written; if that fails the script exits before
    /// init starts.
    ///
    /// # Errors
    ///
    /// Returns [`ShellnsError::Invocation`] if a path is not UTF-8 or cannot
    /// be quoted.
    pub fn render(&self, config: &SessionConfig) -> Result<String> {
        let tools = &config.tools;
        let q = |p: &Path| -> Result<String> { quote(&path_arg(p)?) };
        Ok(match self {
            Self::PersistOwnerPid { marker } => {
                let staged = q(&MarkerFile::new(marker).staging_path())?;
                format!(
                    "{{ read -r shellns_owner _ < /proc/self/stat && echo \"$shellns_owner\" > {staged} && mv -f {staged} {}; }} || exit 1",
                    q(marker)?
                )
            }
            Self::MountProc { root } => format!(
                "{} -t proc proc {} 2>/dev/null || true",
                quote(&tools.mount)?,
                q(&guest_path(root, "/proc"))?
            ),
            Self::BindMount { source, target } => format!(
                "{} --bind {} {} 2>/dev/null || true",
                quote(&tools.mount)?,
                q(source)?,
                q(target)?
            ),
            Self::ExecInit { root } => {
                format!("exec {} {} {GUEST_INIT}", quote(&tools.chroot)?, q(root)?)
            }
            Self::RunInitAndWait { root } => {
                format!("{} {} {GUEST_INIT} &\nwait", quote(&tools.chroot)?, q(root)?)
            }
        })
    }
}

/// Renders script steps into one newline-separated shell script.
///
/// # Errors
///
/// Returns [`ShellnsError::Invocation`] if a step cannot be rendered.
pub fn render_script(steps: &[ScriptStep], config: &SessionConfig) -> Result<String> {
    let lines = steps
        .iter()
        .map(|step| step.render(config))
        .collect::<Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}

/// What the session does with the shared namespace slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NamespaceDecision {
    /// The session does not take part in namespace sharing.
    Unmanaged,
    /// The session becomes the owner of a new shared namespace.
    Create {
        /// Slot being created.
        namespace: NamespaceType,
        /// Marker the owner writes its pid to.
        marker_path: PathBuf,
    },
    /// The session enters an existing shared namespace. The registry has
    /// already counted this attachment.
    Join {
        /// Slot being joined.
        namespace: NamespaceType,
        /// Owner whose namespaces are entered.
        owner_pid: u32,
    },
}

impl NamespaceDecision {
    /// Slot this session is attached to once launched.
    #[must_use]
    pub const fn attached(&self) -> Option<NamespaceType> {
        match self {
            Self::Unmanaged => None,
            Self::Create { namespace, .. } | Self::Join { namespace, .. } => Some(*namespace),
        }
    }
}

/// Fully resolved process launch for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    /// Decision-table row that produced this invocation.
    pub mode: LaunchMode,
    /// Program to execute.
    pub program: String,
    /// Arguments after the program.
    pub args: Vec<String>,
    /// Working directory for the process.
    pub working_dir: PathBuf,
    /// Host work before the process starts.
    pub host_setup: Vec<HostSetup>,
    /// Steps the process runs inside its new namespace, in order.
    pub in_namespace: Vec<ScriptStep>,
    /// Shared-namespace decision.
    pub namespace: NamespaceDecision,
}

impl Invocation {
    /// Program followed by its arguments.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// An invocation before privilege wrapping.
struct Draft {
    mode: LaunchMode,
    argv: Vec<String>,
    host_setup: Vec<HostSetup>,
    in_namespace: Vec<ScriptStep>,
    namespace: NamespaceDecision,
}

impl Draft {
    fn new(mode: LaunchMode, argv: Vec<String>) -> Self {
        Self {
            mode,
            argv,
            host_setup: Vec::new(),
            in_namespace: Vec::new(),
            namespace: NamespaceDecision::Unmanaged,
        }
    }

    fn finish(self, config: &SessionConfig) -> Result<Invocation> {
        let argv = if config.use_elevated_privilege {
            elevate(&config.tools.su, &self.argv)?
        } else {
            self.argv
        };
        let Some((program, args)) = argv.split_first() else {
            return Err(ShellnsError::Invocation {
                message: "empty argv".into(),
            });
        };
        Ok(Invocation {
            mode: self.mode,
            program: program.clone(),
            args: args.to_vec(),
            working_dir: config.guest_home_on_host(),
            host_setup: self.host_setup,
            in_namespace: self.in_namespace,
            namespace: self.namespace,
        })
    }
}

/// A path as one argv word. Non-UTF-8 paths are rejected rather than
/// rewritten.
fn path_arg(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| ShellnsError::Invocation {
            message: format!("path is not valid UTF-8: {}", path.display()),
        })
}

/// Produces the process to execute for `config`.
///
/// In shared-namespace mode this registers the session with `namespaces`.
/// A [`NamespaceDecision::Join`] result carries that attachment; if the
/// invocation cannot be built after registering, the attachment is released
/// before the error is returned.
///
/// # Errors
///
/// Returns [`ShellnsError::Invocation`] if the invocation cannot be
/// constructed, e.g. a path is not UTF-8 or contains a NUL byte.
pub fn build_command(config: &SessionConfig, namespaces: &NamespaceRegistry) -> Result<Invocation> {
    let mode = config.launch_mode();
    tracing::debug!(%mode, elevated = config.use_elevated_privilege, "building session command");
    match mode {
        LaunchMode::PlainRoot => plain_root(config)?.finish(config),
        LaunchMode::Chroot => basic_chroot(config)?.finish(config),
        LaunchMode::ChrootIsolated => isolated_chroot(config)?.finish(config),
        LaunchMode::ChrootShared => shared_chroot(config, namespaces),
    }
}

fn plain_root(config: &SessionConfig) -> Result<Draft> {
    let proot = config.bin_dir().join(PROOT_BINARY);
    let local = config.local_dir();
    let shims = [
        (local.join(STAT_SHIM_NAME), "/proc/stat", STAT_SHIM),
        (local.join(VMSTAT_SHIM_NAME), "/proc/vmstat", VMSTAT_SHIM),
    ];
    let mut shim_binds = Vec::with_capacity(shims.len());
    for (host, guest, _) in &shims {
        shim_binds.push((path_arg(host)?, *guest));
    }

    let mut argv = vec![
        config.tools.linker.clone(),
        path_arg(&proot)?,
        "-r".to_owned(),
        path_arg(&config.container_root_dir)?,
    ];
    let mut bind = |host: String, guest: &str| {
        argv.push("-b".to_owned());
        argv.push(format!("{host}:{guest}"));
    };
    for path in CHROOT_BIND_PATHS.iter().chain(PROOT_EXTRA_BIND_PATHS) {
        bind((*path).to_owned(), *path);
    }
    for (host, guest) in shim_binds {
        bind(host, guest);
    }
    for (host, guest) in PROOT_DEVICE_BINDS {
        bind((*host).to_owned(), *guest);
    }
    argv.extend(
        ["-w", GUEST_HOME, GUEST_SHELL, "-c", GUEST_LOGIN]
            .into_iter()
            .map(str::to_owned),
    );

    let mut draft = Draft::new(LaunchMode::PlainRoot, argv);
    draft.host_setup.push(HostSetup::StageHelper {
        source: config.native_lib_dir.join(PROOT_LIBRARY),
        dest: proot,
    });
    draft
        .host_setup
        .extend(shims.into_iter().map(|(path, _, contents)| HostSetup::WriteShim {
            path,
            contents: contents.to_owned(),
        }));
    Ok(draft)
}

fn basic_chroot(config: &SessionConfig) -> Result<Draft> {
    let argv = vec![
        config.tools.chroot.clone(),
        path_arg(&config.container_root_dir)?,
        GUEST_SHELL.to_owned(),
        "-c".to_owned(),
        GUEST_LOGIN.to_owned(),
    ];
    let mut draft = Draft::new(LaunchMode::Chroot, argv);
    // Nothing isolates these mounts, so they are made on the host up front.
    draft.host_setup.push(HostSetup::BindMounts {
        root: config.container_root_dir.clone(),
        elevated: config.use_elevated_privilege,
    });
    Ok(draft)
}

/// Proc and bind mounts, as run inside a new mount namespace.
fn namespace_mounts(config: &SessionConfig) -> Vec<ScriptStep> {
    let root = &config.container_root_dir;
    std::iter::once(ScriptStep::MountProc { root: root.clone() })
        .chain(
            chroot_bind_mounts(root)
                .into_iter()
                .map(|b| ScriptStep::BindMount {
                    source: b.source,
                    target: b.target,
                }),
        )
        .collect()
}

/// `unshare <all namespaces> -f <sh> -c <script>`.
fn unshare_argv(config: &SessionConfig, steps: &[ScriptStep]) -> Result<Vec<String>> {
    let mut argv = vec![config.tools.unshare.clone()];
    argv.extend(NamespaceSelection::all().unshare_args());
    argv.push(config.tools.host_shell.clone());
    argv.push("-c".to_owned());
    argv.push(render_script(steps, config)?);
    Ok(argv)
}

fn isolated_chroot(config: &SessionConfig) -> Result<Draft> {
    let mut steps = namespace_mounts(config);
    steps.push(ScriptStep::ExecInit {
        root: config.container_root_dir.clone(),
    });

    let mut draft = Draft::new(LaunchMode::ChrootIsolated, unshare_argv(config, &steps)?);
    draft.in_namespace = steps;
    Ok(draft)
}

fn shared_chroot(config: &SessionConfig, namespaces: &NamespaceRegistry) -> Result<Invocation> {
    let namespace = config.namespace_type();
    let marker_path = config.marker_path();

    match namespaces.register_session(&namespace, &marker_path) {
        Some(record) => {
            let built = join_shared(config, namespace, record.owner_pid);
            if built.is_err() {
                namespaces.unregister_session(&namespace);
            }
            built
        }
        None => create_shared(config, namespace, marker_path)?.finish(config),
    }
}

fn create_shared(
    config: &SessionConfig,
    namespace: NamespaceType,
    marker_path: PathBuf,
) -> Result<Draft> {
    let mut steps = vec![ScriptStep::PersistOwnerPid {
        marker: marker_path.clone(),
    }];
    steps.extend(namespace_mounts(config));
    steps.push(ScriptStep::RunInitAndWait {
        root: config.container_root_dir.clone(),
    });

    let mut draft = Draft::new(LaunchMode::ChrootShared, unshare_argv(config, &steps)?);
    draft.host_setup.push(HostSetup::EnsureDir {
        path: config.local_dir(),
    });
    draft.in_namespace = steps;
    draft.namespace = NamespaceDecision::Create {
        namespace,
        marker_path,
    };
    Ok(draft)
}

fn join_shared(config: &SessionConfig, namespace: NamespaceType, owner_pid: u32) -> Result<Invocation> {
    let mut argv = vec![config.tools.nsenter.clone()];
    argv.extend(NamespaceSelection::joinable().nsenter_args(owner_pid));
    argv.extend([
        config.tools.chroot.clone(),
        path_arg(&config.container_root_dir)?,
        GUEST_SHELL.to_owned(),
        "-c".to_owned(),
        DETACHED_LOGIN.to_owned(),
    ]);

    let mut draft = Draft::new(LaunchMode::ChrootShared, argv);
    draft.namespace = NamespaceDecision::Join {
        namespace,
        owner_pid,
    };
    draft.finish(config)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use shellns_common::types::ContainerMode;
    use shellns_core::liveness::ProcessLivenessChecker;
    use shellns_core::marker::MarkerFile;

    use super::*;

    struct Liveness {
        alive: HashSet<u32>,
        checks: AtomicUsize,
    }

    impl ProcessLivenessChecker for Liveness {
        fn is_alive(&self, pid: u32) -> bool {
            let _ = self.checks.fetch_add(1, Ordering::SeqCst);
            self.alive.contains(&pid)
        }
    }

    fn liveness(alive: &[u32]) -> Arc<Liveness> {
        Arc::new(Liveness {
            alive: alive.iter().copied().collect(),
            checks: AtomicUsize::new(0),
        })
    }

    fn config(dir: &Path, mode: ContainerMode, isolate: bool, share: bool) -> SessionConfig {
        let mut cfg = SessionConfig::new(
            mode,
            dir.join("alpine"),
            dir.join("lib"),
            dir.join("usr"),
        );
        cfg.use_namespace_isolation = isolate;
        cfg.share_namespace = share;
        cfg.normalized()
    }

    fn position(steps: &[ScriptStep], pred: impl Fn(&ScriptStep) -> bool) -> usize {
        steps.iter().position(pred).unwrap()
    }

    #[test]
    fn plain_root_uses_proot_and_skips_registry() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), ContainerMode::PlainRoot, true, true);
        MarkerFile::new(cfg.local_dir().join(NamespaceType::shared_chroot().marker_file_name()))
            .write_pid(4242)
            .unwrap();
        let checker = liveness(&[4242]);
        let registry = NamespaceRegistry::new(checker.clone());

        let inv = build_command(&cfg, &registry).unwrap();

        assert_eq!(inv.mode, LaunchMode::PlainRoot);
        assert_eq!(inv.program, "/system/bin/linker64");
        assert!(inv.args[0].ends_with("local/bin/proot"));
        assert!(inv.args.contains(&"/dev/urandom:/dev/random".to_owned()));
        assert_eq!(inv.args[inv.args.len() - 5..], ["-w", "/root", "/bin/sh", "-c", GUEST_LOGIN]);
        assert_eq!(inv.namespace, NamespaceDecision::Unmanaged);
        assert!(matches!(inv.host_setup[0], HostSetup::StageHelper { .. }));
        assert_eq!(checker.checks.load(Ordering::SeqCst), 0);
        assert!(registry.stats().is_empty());
    }

    #[test]
    fn proot_binds_stat_shims_from_local_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), ContainerMode::PlainRoot, false, false);
        let inv = build_command(&cfg, &NamespaceRegistry::new(liveness(&[]))).unwrap();
        let stat = format!("{}:/proc/stat", cfg.local_dir().join("stat").display());
        assert!(inv.args.contains(&stat));
        let shims: Vec<_> = inv
            .host_setup
            .iter()
            .filter_map(|step| match step {
                HostSetup::WriteShim { path, .. } => Some(path.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(shims, [cfg.local_dir().join("stat"), cfg.local_dir().join("vmstat")]);
    }

    #[test]
    fn basic_chroot_mounts_on_host_first() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), ContainerMode::Chroot, false, true);

        let inv = build_command(&cfg, &NamespaceRegistry::new(liveness(&[]))).unwrap();

        assert_eq!(inv.mode, LaunchMode::Chroot);
        assert_eq!(inv.program, "chroot");
        assert_eq!(inv.args[1..], ["/bin/sh", "-c", "cd /root && exec /bin/sh"]);
        assert_eq!(
            inv.host_setup,
            vec![HostSetup::BindMounts {
                root: cfg.container_root_dir.clone(),
                elevated: false
            }]
        );
        assert!(inv.in_namespace.is_empty());
    }

    #[test]
    fn isolated_chroot_mounts_inside_namespace_then_execs_init() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), ContainerMode::Chroot, true, false);
        let registry = NamespaceRegistry::new(liveness(&[]));

        let inv = build_command(&cfg, &registry).unwrap();

        assert_eq!(inv.argv()[..4], ["unshare", "-a", "-f", "/system/bin/sh"]);
        assert!(inv.host_setup.is_empty());
        assert!(matches!(inv.in_namespace[0], ScriptStep::MountProc { .. }));
        assert!(matches!(inv.in_namespace.last(), Some(ScriptStep::ExecInit { .. })));
        let script = inv.args.last().unwrap();
        assert!(script.ends_with("/sbin/init"));
        assert!(script.lines().last().unwrap().starts_with("exec chroot "));
        assert!(registry.stats().is_empty());
    }

    #[test]
    fn first_shared_session_creates_and_persists_marker_before_init() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), ContainerMode::Chroot, true, true);
        let registry = NamespaceRegistry::new(liveness(&[]));

        let inv = build_command(&cfg, &registry).unwrap();

        assert_eq!(inv.program, "unshare");
        let persist = position(&inv.in_namespace, |s| matches!(s, ScriptStep::PersistOwnerPid { .. }));
        let init = position(&inv.in_namespace, |s| matches!(s, ScriptStep::RunInitAndWait { .. }));
        assert!(persist < init);
        assert_eq!(
            inv.namespace,
            NamespaceDecision::Create {
                namespace: NamespaceType::shared_chroot(),
                marker_path: cfg.marker_path()
            }
        );
        assert_eq!(inv.host_setup, vec![HostSetup::EnsureDir { path: cfg.local_dir() }]);
        let script = inv.args.last().unwrap();
        assert!(script.contains(&cfg.marker_path().display().to_string()));
        assert!(script.ends_with("/sbin/init &\nwait"));
        assert!(registry.namespace_info(&NamespaceType::shared_chroot()).is_none());
    }

    fn run_script(script: &str) -> std::process::Output {
        std::process::Command::new("/bin/sh")
            .args(["-c", script])
            .output()
            .unwrap()
    }

    #[test]
    fn persist_step_renames_staged_marker_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), ContainerMode::Chroot, true, true);
        std::fs::create_dir_all(cfg.local_dir()).unwrap();
        let marker = MarkerFile::new(cfg.marker_path());
        let line = ScriptStep::PersistOwnerPid {
            marker: cfg.marker_path(),
        }
        .render(&cfg)
        .unwrap();

        let output = run_script(&line);

        assert!(output.status.success());
        assert!(line.contains(&format!("mv -f {}", marker.staging_path().display())));
        assert!(marker.read_pid().unwrap().is_some());
        assert!(!marker.staging_path().exists());
    }

    #[test]
    fn unwritable_marker_ends_script_before_init() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), ContainerMode::Chroot, true, true);
        let line = ScriptStep::PersistOwnerPid {
            marker: cfg.marker_path(),
        }
        .render(&cfg)
        .unwrap();

        let output = run_script(&format!("{line}\necho init-started"));

        assert_eq!(output.status.code(), Some(1));
        assert!(!String::from_utf8_lossy(&output.stdout).contains("init-started"));
        assert!(!cfg.marker_path().exists());
    }

    #[test]
    fn later_shared_session_joins_owner_pid() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), ContainerMode::Chroot, true, true);
        let registry = NamespaceRegistry::new(liveness(&[1234]));
        registry.notify_namespace_created(&cfg.namespace_type(), 1234, &cfg.marker_path());

        let inv = build_command(&cfg, &registry).unwrap();

        assert_eq!(inv.argv()[..7], ["nsenter", "-t", "1234", "-m", "-p", "-u", "-i"]);
        assert!(!inv.args.contains(&std::process::id().to_string()));
        assert_eq!(inv.args.last().map(String::as_str), Some(DETACHED_LOGIN));
        assert!(!inv.argv().contains(&"unshare".to_owned()));
        assert_eq!(
            registry.namespace_info(&cfg.namespace_type()).unwrap().attached_sessions,
            2
        );
    }

    #[test]
    fn dead_owner_marker_falls_back_to_create() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), ContainerMode::Chroot, true, true);
        MarkerFile::new(cfg.marker_path()).write_pid(1234).unwrap();
        let registry = NamespaceRegistry::new(liveness(&[]));

        let inv = build_command(&cfg, &registry).unwrap();

        assert!(matches!(inv.namespace, NamespaceDecision::Create { .. }));
        assert!(!cfg.marker_path().exists());
    }

    #[test]
    fn elevated_invocation_wraps_whole_argv() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), ContainerMode::Chroot, true, false);
        let registry = NamespaceRegistry::new(liveness(&[]));
        let plain = build_command(&cfg, &registry).unwrap();
        cfg.use_elevated_privilege = true;

        let elevated = build_command(&cfg, &registry).unwrap();

        assert_eq!(elevated.program, "su");
        assert_eq!(elevated.args[0], "-c");
        assert_eq!(shlex::split(&elevated.args[1]).unwrap(), plain.argv());
    }

    #[test]
    fn failed_join_releases_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), ContainerMode::Chroot, true, true);
        cfg.use_elevated_privilege = true;
        cfg.tools.chroot = "chroot\0".into();
        let registry = NamespaceRegistry::new(liveness(&[1234]));
        registry.notify_namespace_created(&cfg.namespace_type(), 1234, &cfg.marker_path());

        let err = build_command(&cfg, &registry).unwrap_err();

        assert!(matches!(err, ShellnsError::Invocation { .. }));
        assert_eq!(
            registry.namespace_info(&cfg.namespace_type()).unwrap().attached_sessions,
            1
        );
    }

    #[test]
    fn paths_with_spaces_survive_the_script() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), ContainerMode::Chroot, true, false);
        cfg.container_root_dir = dir.path().join("my alpine");

        let inv = build_command(&cfg, &NamespaceRegistry::new(liveness(&[]))).unwrap();

        let last_line = inv.args.last().unwrap().lines().last().unwrap().to_owned();
        let words = shlex::split(&last_line).unwrap();
        assert_eq!(words[2], cfg.container_root_dir.display().to_string());
    }

    #[test]
    fn non_utf8_root_is_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let registry = NamespaceRegistry::new(liveness(&[]));
        for (mode, isolate) in [
            (ContainerMode::PlainRoot, false),
            (ContainerMode::Chroot, false),
            (ContainerMode::Chroot, true),
        ] {
            let mut cfg = config(dir.path(), mode, isolate, false);
            cfg.container_root_dir = dir.path().join(OsStr::from_bytes(b"alp\xffine"));

            let err = build_command(&cfg, &registry).unwrap_err();

            assert!(matches!(err, ShellnsError::Invocation { .. }), "{mode:?}");
        }
    }
}

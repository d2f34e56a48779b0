//! Host-side preparation run before a session process starts.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use shellns_common::error::{Result, ShellnsError};
use shellns_core::filesystem::mount::MountManager;

use crate::command::HostSetup;

/// Mode applied to staged helper binaries.
const HELPER_MODE: u32 = 0o755;

/// Applies every host setup step in order.
///
/// Bind mounts are best-effort. Directory creation, helper staging and shim
/// files are fatal: without them the invocation cannot work.
///
/// # Errors
///
/// Returns [`ShellnsError::Io`] if a directory, helper or shim cannot be
/// put in place.
pub fn apply_host_setup(steps: &[HostSetup], mounts: &MountManager) -> Result<()> {
    for step in steps {
        match step {
            HostSetup::BindMounts { root, elevated } => {
                if !mounts.setup_mounts(root, *elevated) {
                    tracing::warn!(root = %root.display(), "some bind mounts are missing, continuing");
                }
            }
            HostSetup::EnsureDir { path } => {
                std::fs::create_dir_all(path).map_err(|e| ShellnsError::Io {
                    path: path.clone(),
                    source: e,
                })?;
            }
            HostSetup::StageHelper { source, dest } => stage_helper(source, dest)?,
            HostSetup::WriteShim { path, contents } => write_shim(path, contents)?,
        }
    }
    Ok(())
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ShellnsError {
    let path = path.to_path_buf();
    move |source| ShellnsError::Io { path, source }
}

/// Copies `source` to `dest` unless `dest` already holds the same bytes,
/// then marks it executable.
fn stage_helper(source: &Path, dest: &Path) -> Result<()> {
    let wanted = std::fs::read(source).map_err(io_err(source))?;
    let current = std::fs::read(dest).ok();

    if current.as_deref() == Some(wanted.as_slice()) {
        tracing::debug!(helper = %dest.display(), "helper already staged");
    } else {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        std::fs::write(dest, &wanted).map_err(io_err(dest))?;
        tracing::info!(source = %source.display(), helper = %dest.display(), "helper staged");
    }

    std::fs::set_permissions(dest, std::fs::Permissions::from_mode(HELPER_MODE))
        .map_err(io_err(dest))
}

/// Writes `contents` to `path` if nothing is there yet. An existing file is
/// left as it is.
fn write_shim(path: &Path, contents: &str) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    std::fs::write(path, contents).map_err(io_err(path))?;
    tracing::debug!(shim = %path.display(), "shim written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use shellns_common::config::{HostTools, SessionConfig};
    use shellns_common::constants::{STAT_SHIM, VMSTAT_SHIM};
    use shellns_common::types::ContainerMode;
    use shellns_core::liveness::ProcessLivenessChecker;
    use shellns_core::runner::{CommandOutput, CommandRunner};

    use super::*;
    use crate::command::build_command;
    use crate::namespace::NamespaceRegistry;

    struct NoneAlive;

    impl ProcessLivenessChecker for NoneAlive {
        fn is_alive(&self, _pid: u32) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct CountingRunner {
        calls: Mutex<usize>,
    }

    impl CommandRunner for CountingRunner {
        fn run(&self, _argv: &[String]) -> Result<CommandOutput> {
            *self.calls.lock().unwrap() += 1;
            Ok(CommandOutput {
                success: false,
                code: Some(32),
                output: "mount: permission denied".into(),
            })
        }
    }

    fn mounts(dir: &Path) -> (Arc<CountingRunner>, MountManager) {
        let runner = Arc::new(CountingRunner::default());
        let manager = MountManager::new(runner.clone(), HostTools::default())
            .with_mount_table(dir.join("no-table"));
        (runner, manager)
    }

    #[test]
    fn failed_bind_mounts_do_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, manager) = mounts(dir.path());
        let steps = [
            HostSetup::BindMounts {
                root: dir.path().join("root"),
                elevated: false,
            },
            HostSetup::EnsureDir {
                path: dir.path().join("local"),
            },
        ];

        apply_host_setup(&steps, &manager).unwrap();

        assert!(*runner.calls.lock().unwrap() > 0);
        assert!(dir.path().join("local").is_dir());
    }

    #[test]
    fn uncreatable_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let (_, manager) = mounts(dir.path());

        let err = apply_host_setup(
            &[HostSetup::EnsureDir {
                path: blocker.join("local"),
            }],
            &manager,
        )
        .unwrap_err();

        assert!(matches!(err, ShellnsError::Io { .. }));
    }

    #[test]
    fn helper_is_staged_executable() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("libproot.so");
        std::fs::write(&source, b"\x7fELF").unwrap();
        let dest = dir.path().join("local/bin/proot");

        stage_helper(&source, &dest).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"\x7fELF");
        let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, HELPER_MODE);
    }

    #[test]
    fn changed_helper_is_restaged() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("libproot.so");
        let dest = dir.path().join("proot");
        std::fs::write(&dest, b"old").unwrap();
        std::fs::write(&source, b"newer").unwrap();

        stage_helper(&source, &dest).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"newer");
    }

    #[test]
    fn same_size_helper_update_is_restaged() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("libproot.so");
        let dest = dir.path().join("proot");
        std::fs::write(&dest, b"v1.0").unwrap();
        std::fs::write(&source, b"v1.1").unwrap();

        stage_helper(&source, &dest).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"v1.1");
    }

    #[test]
    fn proot_setup_creates_proc_shims() {
        let dir = tempfile::tempdir().unwrap();
        let (_, manager) = mounts(dir.path());
        let config = SessionConfig::new(
            ContainerMode::PlainRoot,
            dir.path().join("alpine"),
            dir.path().join("lib"),
            dir.path().join("usr"),
        )
        .normalized();
        std::fs::create_dir_all(&config.native_lib_dir).unwrap();
        std::fs::write(config.native_lib_dir.join("libproot.so"), b"\x7fELF").unwrap();
        let registry = NamespaceRegistry::new(Arc::new(NoneAlive));
        let inv = build_command(&config, &registry).unwrap();

        apply_host_setup(&inv.host_setup, &manager).unwrap();

        let stat = config.local_dir().join("stat");
        let vmstat = config.local_dir().join("vmstat");
        assert!(inv.args.contains(&format!("{}:/proc/stat", stat.display())));
        assert_eq!(std::fs::read_to_string(&stat).unwrap(), STAT_SHIM);
        assert_eq!(std::fs::read_to_string(&vmstat).unwrap(), VMSTAT_SHIM);
    }

    #[test]
    fn existing_shim_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let (_, manager) = mounts(dir.path());
        let path = dir.path().join("local/stat");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "cpu  1 2 3\n").unwrap();

        apply_host_setup(
            &[HostSetup::WriteShim {
                path: path.clone(),
                contents: STAT_SHIM.to_owned(),
            }],
            &manager,
        )
        .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "cpu  1 2 3\n");
    }

    #[test]
    fn missing_helper_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (_, manager) = mounts(dir.path());
        let steps = [HostSetup::StageHelper {
            source: dir.path().join("absent.so"),
            dest: dir.path().join("proot"),
        }];

        assert!(apply_host_setup(&steps, &manager).is_err());
    }
}

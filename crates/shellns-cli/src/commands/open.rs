//! `shellns open`: Start a session and wait for it to exit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Args;
use shellns_common::config::SessionConfig;
use shellns_common::types::{LaunchMode, SessionId};
use shellns_core::filesystem::mount::MountManager;
use shellns_core::liveness::liveness_checker;
use shellns_core::runner::SystemRunner;
use shellns_runtime::namespace::NamespaceRegistry;
use shellns_runtime::process::NativeLauncher;
use shellns_runtime::session::SessionRegistry;

/// How often the session is checked for exit.
const EXIT_POLL: Duration = Duration::from_millis(200);

/// Arguments for the `open` command.
#[derive(Args, Debug)]
pub struct OpenArgs {
    /// Session identifier. A random one is generated when omitted.
    #[arg(long)]
    pub id: Option<String>,

    /// Remove host bind mounts when a plain chroot session ends.
    #[arg(long)]
    pub unmount_on_exit: bool,
}

/// Executes the `open` command.
///
/// The session's shell inherits this terminal. Ctrl-C or the shell exiting
/// ends the session; its namespace attachment is released before return.
///
/// # Errors
///
/// Returns an error if the runtime cannot start or the session cannot be
/// created.
pub fn execute(args: &OpenArgs, config: &SessionConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    let namespaces = Arc::new(NamespaceRegistry::new(liveness_checker(
        config.use_elevated_privilege,
        &config.tools,
    )));
    let reclaimed = namespaces.cleanup_stale_namespaces();
    tracing::debug!(reclaimed, "stale namespaces reclaimed at startup");

    let runner = Arc::new(SystemRunner);
    let sessions = SessionRegistry::new(
        Arc::clone(&namespaces),
        MountManager::new(runner.clone(), config.tools.clone()),
        Arc::new(NativeLauncher),
        runtime.handle(),
    );

    let id = args.id.clone().map_or_else(SessionId::generate, SessionId::new);
    let info = sessions.create_session(id.clone(), config)?;
    eprintln!("Session {} started ({}, pid {})", info.id, info.mode, info.pid);

    runtime.block_on(async {
        loop {
            if interrupted.load(Ordering::SeqCst) {
                tracing::info!(session = %id, "interrupted, terminating session");
                let _ = sessions.terminate_all();
                break;
            }
            if sessions.reap_exited().contains(&id) {
                break;
            }
            tokio::time::sleep(EXIT_POLL).await;
        }
        sessions.settle().await;
    });

    if args.unmount_on_exit && info.mode == LaunchMode::Chroot {
        MountManager::new(runner, config.tools.clone())
            .cleanup_mounts(&config.container_root_dir, config.use_elevated_privilege);
    }

    for stat in namespaces.stats() {
        tracing::info!(
            namespace = %stat.namespace,
            pid = stat.owner_pid,
            attached = stat.attached_sessions,
            "namespace still attached"
        );
    }
    namespaces.shutdown();
    eprintln!("Session {id} ended");
    Ok(())
}

//! `shellns unmount`: Tear down the bind mounts of a plain chroot.

use std::sync::Arc;

use clap::Args;
use shellns_common::config::SessionConfig;
use shellns_common::types::LaunchMode;
use shellns_core::filesystem::mount::MountManager;
use shellns_core::runner::SystemRunner;

/// Arguments for the `unmount` command.
#[derive(Args, Debug)]
pub struct UnmountArgs {
    /// Unmount even when the settings select a namespaced mode.
    #[arg(short, long)]
    pub force: bool,
}

/// Executes the `unmount` command.
///
/// Namespaced sessions keep their mounts private, so there is nothing on
/// the host to remove for them unless `--force` is given.
///
/// # Errors
///
/// Returns an error if the settings do not describe a plain chroot and
/// `--force` is not set.
pub fn execute(args: &UnmountArgs, config: &SessionConfig) -> anyhow::Result<()> {
    let mode = config.launch_mode();
    if mode != LaunchMode::Chroot && !args.force {
        anyhow::bail!("{mode} sessions do not mount on the host; use --force to unmount anyway");
    }

    let mounts = MountManager::new(Arc::new(SystemRunner), config.tools.clone());
    mounts.cleanup_mounts(&config.container_root_dir, config.use_elevated_privilege);
    println!("Unmounted {}", config.container_root_dir.display());
    Ok(())
}

//! `shellns status`: Report the shared namespace marker and its owner.

use clap::Args;
use serde::Serialize;
use shellns_common::config::SessionConfig;
use shellns_core::liveness::liveness_checker;
use shellns_core::marker::MarkerFile;

/// Arguments for the `status` command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Delete the marker if its owner is dead or it is unreadable.
    #[arg(long)]
    pub clean: bool,

    /// Print as JSON.
    #[arg(long)]
    pub json: bool,
}

/// What is known about the configured namespace slot.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct NamespaceStatus {
    /// Slot key.
    pub namespace: String,
    /// Whether the settings enable sharing at all.
    pub shared: bool,
    /// Marker file location.
    pub marker: String,
    /// Pid recorded in the marker.
    pub owner_pid: Option<u32>,
    /// Whether the recorded owner is alive.
    pub alive: bool,
    /// Whether a stale marker was deleted.
    pub cleaned: bool,
}

/// Executes the `status` command.
///
/// # Errors
///
/// Returns an error if a stale marker cannot be deleted or JSON output
/// fails.
pub fn execute(args: &StatusArgs, config: &SessionConfig) -> anyhow::Result<()> {
    let status = inspect(config, args.clean)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{:<12} {}", "NAMESPACE", status.namespace);
    println!("{:<12} {}", "SHARED", status.shared);
    println!("{:<12} {}", "MARKER", status.marker);
    match status.owner_pid {
        Some(pid) if status.alive => println!("{:<12} {pid} (alive)", "OWNER"),
        Some(pid) => println!("{:<12} {pid} (dead)", "OWNER"),
        None => println!("{:<12} none", "OWNER"),
    }
    if status.cleaned {
        println!("Stale marker removed.");
    }
    Ok(())
}

fn inspect(config: &SessionConfig, clean: bool) -> anyhow::Result<NamespaceStatus> {
    let namespace = config.namespace_type();
    let marker = MarkerFile::new(config.marker_path());
    let probe = liveness_checker(config.use_elevated_privilege, &config.tools);

    let (owner_pid, readable) = match marker.read_pid() {
        Ok(pid) => (pid, true),
        Err(e) => {
            tracing::warn!(error = %e, "marker unreadable");
            (None, false)
        }
    };
    let alive = owner_pid.is_some_and(|pid| probe.is_alive(pid));
    let stale = marker.exists() && (!readable || !alive);
    let cleaned = clean && stale && marker.remove()?;

    Ok(NamespaceStatus {
        namespace: namespace.slug(),
        shared: namespace.is_shared(),
        marker: marker.path().display().to_string(),
        owner_pid,
        alive,
        cleaned,
    })
}

#[cfg(test)]
mod tests {
    use shellns_common::types::ContainerMode;

    use super::*;

    fn config(dir: &std::path::Path) -> SessionConfig {
        let mut config = SessionConfig::new(
            ContainerMode::Chroot,
            dir.join("alpine"),
            dir.join("lib"),
            dir.join("usr"),
        );
        config.use_namespace_isolation = true;
        config.share_namespace = true;
        config.normalized()
    }

    #[test]
    fn missing_marker_reports_no_owner() {
        let dir = tempfile::tempdir().unwrap();
        let status = inspect(&config(dir.path()), true).unwrap();
        assert_eq!(status.owner_pid, None);
        assert!(status.shared);
        assert!(!status.cleaned);
    }

    #[test]
    fn own_pid_is_alive() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        MarkerFile::new(config.marker_path()).write_pid(std::process::id()).unwrap();

        let status = inspect(&config, true).unwrap();

        assert!(status.alive);
        assert!(!status.cleaned);
        assert!(config.marker_path().exists());
    }

    #[test]
    fn corrupt_marker_is_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let marker = MarkerFile::new(config.marker_path());
        marker.ensure_parent().unwrap();
        std::fs::write(marker.path(), "garbage").unwrap();

        let status = inspect(&config, true).unwrap();

        assert!(status.cleaned);
        assert!(!marker.exists());
    }
}

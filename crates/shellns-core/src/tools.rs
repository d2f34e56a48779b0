//! Host helper discovery.

use std::path::Path;

use shellns_common::config::HostTools;
use shellns_common::constants::{LINKER32, LINKER64};

/// Resolves `name` on `$PATH`, keeping the bare name when it is not found.
fn resolve(name: &str) -> String {
    which::which(name).map_or_else(
        |_| name.to_owned(),
        |path| path.to_string_lossy().into_owned(),
    )
}

/// Returns the first existing path among `candidates`.
fn first_existing<'a>(candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|c| Path::new(c).exists())
}

/// Detects helper locations on this host.
///
/// Bare names that cannot be resolved are kept, so the failure surfaces
/// when the helper is actually run.
#[must_use]
pub fn detect_host_tools() -> HostTools {
    let host_shell = first_existing(&["/system/bin/sh", "/bin/sh"])
        .map_or_else(|| resolve("sh"), str::to_owned);
    let linker = first_existing(&[LINKER64, LINKER32]).unwrap_or(LINKER64).to_owned();

    let tools = HostTools {
        su: resolve("su"),
        unshare: resolve("unshare"),
        nsenter: resolve("nsenter"),
        chroot: resolve("chroot"),
        mount: resolve("mount"),
        umount: resolve("umount"),
        host_shell,
        linker,
    };
    tracing::debug!(?tools, "host tools detected");
    tools
}

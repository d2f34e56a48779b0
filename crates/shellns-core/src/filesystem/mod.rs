//! Filesystem setup for chroot containers.
//!
//! Provides the bind-mount set shared with the host and the best-effort
//! [`MountManager`](mount::MountManager) that applies it.

pub mod mount;

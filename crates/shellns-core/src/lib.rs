//! # shellns-core
//!
//! Host-side building blocks for the shellns session coordinator.
//!
//! This crate provides:
//! - **Liveness**: probing whether a namespace owner process still exists.
//! - **Privilege**: wrapping an argv in the elevation tool with safe quoting.
//! - **Markers**: the persisted pid file that lets sessions find a namespace.
//! - **Filesystem**: best-effort bind mounts into a container root.
//! - **Namespaces**: the helper flags used to create or enter namespaces.
//!
//! Namespaces themselves are created by external helpers (`unshare`,
//! `nsenter`, `chroot`); nothing here issues namespace syscalls.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod filesystem;
pub mod liveness;
pub mod marker;
pub mod namespace;
pub mod privilege;
pub mod runner;
pub mod tools;

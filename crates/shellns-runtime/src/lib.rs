//! Session lifecycle management for the shellns runtime.
//!
//! [`command::build_command`] turns a session configuration into a process
//! invocation, [`namespace::NamespaceRegistry`] reference-counts the shared
//! namespace, and [`session::SessionRegistry`] ties both to running
//! processes.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod command;
pub mod env;
pub mod namespace;
pub mod process;
pub mod session;
pub mod setup;

//! # shellns-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the entire shellns workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the session settings, namespace keys, and
//! error type that every other crate builds upon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

//! `shellns plan`: Print the invocation a new session would run.

use clap::Args;
use serde::Serialize;
use shellns_common::config::SessionConfig;
use shellns_common::types::SessionId;
use shellns_core::liveness::liveness_checker;
use shellns_runtime::command::{Invocation, build_command};
use shellns_runtime::env::session_environment;
use shellns_runtime::namespace::NamespaceRegistry;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Also print the session environment.
    #[arg(long)]
    pub env: bool,
}

#[derive(Serialize)]
struct Plan<'a> {
    invocation: &'a Invocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<Vec<String>>,
}

/// Executes the `plan` command.
///
/// The create-or-join decision is taken against the marker on disk, exactly
/// as the first session of a fresh process would take it. Nothing is
/// launched, mounted, or staged.
///
/// # Errors
///
/// Returns an error if the invocation cannot be built or serialized.
pub fn execute(args: &PlanArgs, config: &SessionConfig) -> anyhow::Result<()> {
    let namespaces = NamespaceRegistry::new(liveness_checker(
        config.use_elevated_privilege,
        &config.tools,
    ));
    let invocation = build_command(config, &namespaces)?;
    let environment = args
        .env
        .then(|| session_environment(config, &SessionId::new("plan")));

    let plan = Plan {
        invocation: &invocation,
        environment,
    };
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

//! CLI command definitions and dispatch.

pub mod open;
pub mod plan;
pub mod settings;
pub mod status;
pub mod unmount;

use clap::{Parser, Subcommand};

use self::settings::SettingsArgs;

/// shellns: container shell sessions with shared namespaces.
#[derive(Parser, Debug)]
#[command(name = shellns_common::constants::BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Session settings shared by every subcommand.
    #[command(flatten)]
    pub settings: SettingsArgs,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the invocation a new session would run, as JSON.
    Plan(plan::PlanArgs),
    /// Start a session and wait for it to exit.
    Open(open::OpenArgs),
    /// Report the shared namespace marker and its owner.
    Status(status::StatusArgs),
    /// Remove the bind mounts of a non-namespaced chroot.
    Unmount(unmount::UnmountArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the settings are invalid or the command fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.settings.resolve()?;
    match cli.command {
        Command::Plan(args) => plan::execute(&args, &config),
        Command::Open(args) => open::execute(&args, &config),
        Command::Status(args) => status::execute(&args, &config),
        Command::Unmount(args) => unmount::execute(&args, &config),
    }
}

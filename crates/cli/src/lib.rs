pub mod client;
pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::entity::{EntityCommand, RemoteOptions};

#[derive(Debug, Parser)]
#[command(
    name = "procura",
    about = "Procura operator and workflow CLI",
    long_about = "Prepare the procura database, inspect configuration and readiness, and drive \
                  approval workflows against a running procura-server.",
    after_help = "Examples:\n  procura migrate\n  procura seed\n  procura doctor --json\n  \
                  procura entity --as u-kofi --role supervisor pending\n  \
                  procura entity --as u-kofi decide CR-1a2b3c --level 1 --decision approve"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo approver directory and verify it")]
    Seed {
        #[arg(long, help = "Remove demo directory members before loading them again")]
        clean: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database schema and approver directory coverage")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Drive workflow operations against a running procura-server")]
    Entity {
        #[arg(long = "as", value_name = "USER_ID", help = "Requester user id")]
        user_id: String,
        #[arg(long, default_value = "staff", help = "Requester role")]
        role: String,
        #[arg(long, help = "Override client.base_url")]
        base_url: Option<String>,
        #[command(subcommand)]
        action: EntityCommand,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { clean } => commands::seed::run(clean),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Entity { user_id, role, base_url, action } => {
            commands::entity::run(RemoteOptions { user_id, role, base_url }, action)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

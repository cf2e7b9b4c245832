pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "famcal",
    about = "famcal operator CLI",
    long_about = "Operate the family calendar assistant: migrations, config inspection, \
                  readiness checks and state cleanup.",
    after_help = "Examples:\n  famcal doctor --json\n  famcal config\n  famcal cleanup"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database, family whitelist and calendar timezone")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Purge expired conversations and processed message ids")]
    Cleanup,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Cleanup => commands::cleanup::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "mostrador",
    about = "Mostrador operator CLI",
    long_about = "Inspect Mostrador configuration, runtime readiness, and the tool contract \
                  advertised to the completion service.",
    after_help = "Examples:\n  mostrador doctor --json\n  mostrador config\n  mostrador tools"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Validate config, credential readiness, and row store connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Print the tool schema the orchestrator registers with every run")]
    Tools,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Tools => commands::CommandResult { exit_code: 0, output: commands::tools::run() },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use gatebell_core::config::LoadOptions;

#[derive(Debug, Parser)]
#[command(
    name = "gatebell",
    about = "Gatebell operator CLI",
    long_about = "Inspect configuration, check readiness, and replay approval events against the live pipeline.",
    after_help = "Examples:\n  gatebell doctor --json\n  gatebell config\n  gatebell notify --event event.json --dry-run"
)]
pub struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Read settings from this TOML file")]
    config_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, AWS credentials, and the pipeline stage layout")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run the notifier once against an event file")]
    Notify {
        #[arg(long, value_name = "PATH", help = "SNS event envelope as delivered to the function")]
        event: PathBuf,
        #[arg(long, help = "Print the Slack payload instead of posting it")]
        dry_run: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        require_file: cli.config_file.is_some(),
        config_path: cli.config_file,
        ..LoadOptions::default()
    };

    let result = match cli.command {
        Command::Config => commands::config::run(options),
        Command::Doctor { json } => commands::doctor::run(options, json),
        Command::Notify { event, dry_run } => commands::notify::run(options, &event, dry_run),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

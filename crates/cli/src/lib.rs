pub mod commands;

use std::io;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cils_core::config::{AppConfig, LoadOptions, LogFormat};
use cils_core::lifecycle::LifecycleEvent;
use tracing::Level;

use crate::commands::submit::SubmitArgs;

#[derive(Debug, Parser)]
#[command(
    name = "cils",
    about = "Compute provisioning request CLI",
    long_about = "Submit provisioning requests, watch them progress to Ready, and inspect runtime readiness.",
    after_help = "Examples:\n  cils catalog\n  cils submit --email ops@example.com --request-type Session --os \"Ubuntu 20.04\"\n  cils smoke\n  cils doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "List the request catalogs and form defaults")]
    Catalog,
    #[command(about = "Submit a provisioning request and wait until its credentials are issued")]
    Submit(SubmitArgs),
    #[command(about = "Run end-to-end lifecycle checks with per-check timing details")]
    Smoke,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, fulfillment timing, and lifecycle readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Catalog => commands::catalog::run(),
        Command::Submit(args) => commands::submit::run(&args, print_progress),
        Command::Smoke => commands::smoke::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn print_progress(event: &LifecycleEvent) {
    match event {
        LifecycleEvent::Submitted { request_id, .. } => {
            println!("request {request_id} submitted");
        }
        LifecycleEvent::ProgressAdvanced { request_id, progress, .. } => {
            println!("request {request_id} progress {progress}%");
        }
        LifecycleEvent::CredentialsIssued { request_id, .. } => {
            println!("request {request_id} access details issued");
        }
        LifecycleEvent::Ready { .. } => {}
    }
}

/// Logs go to stderr so stdout stays parseable. A broken config falls back to defaults here;
/// the command itself reports the config error.
fn init_logging() {
    let logging = AppConfig::load(LoadOptions::default()).unwrap_or_default().logging;
    let log_level = logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(io::stderr);

    let _ = match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

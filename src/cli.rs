use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{self, CommandReport};
use crate::error::GetDataError;
use crate::getdata::config::unknown_env_keys;
use crate::getdata::warn::{self, WarnEvent};

#[derive(Parser)]
#[command(name = "getdata", version)]
#[command(about = "Download archive frames and keep the telescope-time ledger", long_about = None)]
struct Cli {
    /// Print the command report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download new frames, bill them and refresh the summaries
    Run {
        #[arg(long)]
        proposal: Option<String>,
    },
    /// Bill frames already staged, without contacting the archive
    Account {
        #[arg(long)]
        proposal: Option<String>,
    },
    /// Rewrite the HTML summaries from the ledgers
    Summary {
        #[arg(long)]
        proposal: Option<String>,
    },
    /// Show paths, lock state and per-proposal usage
    Status,
}

fn warn_unknown_env() {
    for key in unknown_env_keys() {
        warn::emit(WarnEvent {
            code: "UNKNOWN_ENV_KEY",
            stage: "config",
            action: "load-env",
            proposal: "",
            frame: "",
            retry: "none",
            reason: "variable-not-read-by-getdata",
            err: &key,
        });
    }
}

fn warn_fatal(command: &str, err: &anyhow::Error) {
    let code = err
        .downcast_ref::<GetDataError>()
        .and_then(GetDataError::code)
        .map(|code| code.as_str())
        .unwrap_or("FATAL");
    warn::emit(WarnEvent {
        code,
        stage: command,
        action: "abort-run",
        proposal: "",
        frame: "",
        retry: "rerun",
        reason: "whole-run-failure",
        err: &format!("{err:#}"),
    });
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("{}: {}", report.command, if report.ok { "ok" } else { "failed" });
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  issue: {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    warn_unknown_env();

    let (name, result) = match cli.command {
        Command::Run { proposal } => (
            "run",
            commands::run::run(&commands::run::RunOptions { proposal }),
        ),
        Command::Account { proposal } => (
            "account",
            commands::account::run(&commands::account::AccountOptions { proposal }),
        ),
        Command::Summary { proposal } => (
            "summary",
            commands::summary::run(&commands::summary::SummaryOptions { proposal }),
        ),
        Command::Status => ("status", commands::status::run()),
    };

    let report = match result {
        Ok(report) => report,
        Err(err) => {
            warn_fatal(name, &err);
            return Err(err);
        }
    };
    print_report(&report, cli.json)?;
    if !report.ok {
        std::process::exit(1);
    }
    Ok(())
}

pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "tally",
    about = "Tally operator CLI",
    long_about = "Prepare and inspect a tally deployment: preflight, migrations, demo data, config and payroll lookups.",
    after_help = "Examples:\n  tally doctor --json\n  tally seed\n  tally salary --user usr-demo-eli --month 2024-01"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run startup preflight checks and return structured status output")]
    Start,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset and verify it landed")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, attachment storage, DB connectivity and schema state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Compute one user's monthly salary from the ledger")]
    Salary {
        #[arg(long, help = "User id, e.g. usr-demo-eli")]
        user: String,
        #[arg(long, help = "Month as YYYY-MM; defaults to the current UTC month")]
        month: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start => commands::start::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            let (output, healthy) = commands::doctor::run(json);
            commands::CommandResult { exit_code: if healthy { 0 } else { 1 }, output }
        }
        Command::Salary { user, month } => commands::salary::run(&user, month.as_deref()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn salary_arguments_parse() {
        let cli = Cli::try_parse_from(["tally", "salary", "--user", "usr-demo-eli", "--month", "2024-01"])
            .expect("parse");
        match cli.command {
            Command::Salary { user, month } => {
                assert_eq!(user, "usr-demo-eli");
                assert_eq!(month.as_deref(), Some("2024-01"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn salary_requires_a_user() {
        assert!(Cli::try_parse_from(["tally", "salary"]).is_err());
    }
}

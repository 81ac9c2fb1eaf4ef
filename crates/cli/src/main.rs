// regseed CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: Exit 0 when every namespace succeeded, 1 when any failed,
// 2 on configuration errors.

mod commands;
mod config;
mod output;
mod reference;
mod telemetry;
mod tool;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use regseed_fanout::WorkerPoolError;

use crate::config::{ConfigError, SeedConfig, TargetArgs};
use crate::telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser)]
#[command(name = "regseed")]
#[command(about = "Seed a registry by tagging and pushing a range of images per namespace")]
#[command(version)]
pub struct Cli {
    /// YAML config file; flags and environment override its values
    #[arg(long, short, env = "REGSEED_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json", "yaml"])]
    pub output: String,

    /// Suppress non-essential output
    #[arg(long, short)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Tag and push every reference for every namespace
    Push {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Print the references `push` would produce, without running the tool
    Plan {
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig::from_env().quiet(cli.quiet));

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let output_format = output::OutputFormat::from_name(&cli.output);

    match cli.command {
        Commands::Push { target } => {
            let config = SeedConfig::load(cli.config.as_deref(), &target)
                .context("Failed to load configuration")?;
            commands::push::run(config, output_format, cli.quiet).await
        }
        Commands::Plan { target } => {
            let config = SeedConfig::load(cli.config.as_deref(), &target)
                .context("Failed to load configuration")?;
            commands::plan::run(&config, output_format)?;
            Ok(true)
        }
    }
}

/// Configuration problems exit with 2, everything else with 1
fn exit_code_for(error: &anyhow::Error) -> u8 {
    let is_config = error.downcast_ref::<ConfigError>().is_some()
        || matches!(
            error.downcast_ref::<WorkerPoolError>(),
            Some(WorkerPoolError::Configuration(_))
        );
    if is_config {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_push_flags() {
        let cli = Cli::try_parse_from([
            "regseed",
            "--output",
            "json",
            "push",
            "-n",
            "x,y",
            "--namespace",
            "z",
            "--registry",
            "localhost:5000",
            "-j",
            "2",
            "--tool-arg",
            "--context=ci",
        ])
        .unwrap();

        assert_eq!(cli.output, "json");
        let Commands::Push { target } = cli.command else {
            panic!("expected push");
        };
        assert_eq!(target.namespaces, vec!["x", "y", "z"]);
        assert_eq!(target.registry.as_deref(), Some("localhost:5000"));
        assert_eq!(target.concurrency, Some(2));
        assert_eq!(target.tool_args, vec!["--context=ci"]);
    }

    #[test]
    fn test_parse_plan_ranges() {
        let cli =
            Cli::try_parse_from(["regseed", "plan", "--first-tag", "1", "--last-tag", "3"]).unwrap();

        let Commands::Plan { target } = cli.command else {
            panic!("expected plan");
        };
        assert_eq!(target.first_tag, Some(1));
        assert_eq!(target.last_tag, Some(3));
    }

    #[test]
    fn test_unknown_output_format_rejected() {
        assert!(Cli::try_parse_from(["regseed", "--output", "xml", "plan"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        let config_err = anyhow::Error::new(ConfigError::Invalid("bad".into()))
            .context("Failed to load configuration");
        assert_eq!(exit_code_for(&config_err), 2);

        let pool_err = anyhow::Error::new(WorkerPoolError::Configuration("zero".into()));
        assert_eq!(exit_code_for(&pool_err), 2);

        let other = anyhow::Error::new(WorkerPoolError::PoolShutdown);
        assert_eq!(exit_code_for(&other), 1);
    }
}

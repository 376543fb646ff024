//! CLI module for Conflux
//!
//! Provides commands:
//! - `waves`: show the dependency waves of a plan
//! - `run`: execute a plan with the simulated executor
//! - `route`: route a task through the adaptive router
//! - `config`: print the effective configuration

use crate::app::config::AppConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod config;
pub mod route;
pub mod run;
pub mod waves;

/// Conflux orchestration CLI
#[derive(Parser, Debug)]
#[command(name = "conflux")]
#[command(about = "Dependency-aware plan orchestration")]
#[command(version)]
pub struct Cli {
    /// Extra configuration file layered over config/
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the execution waves of a plan file
    Waves {
        /// Plan file (JSON, or YAML with a .yaml/.yml extension)
        plan: PathBuf,
    },
    /// Execute a plan file with simulated workers
    Run {
        /// Plan file (JSON, or YAML with a .yaml/.yml extension)
        plan: PathBuf,
        /// Assign steps to the configured workers
        #[arg(long)]
        distributed: bool,
        /// With --distributed, assign one dependency wave at a time
        #[arg(long, requires = "distributed")]
        wave_aware: bool,
    },
    /// Route a task and print the decision
    Route {
        /// Task description
        task: String,
        /// Route proposed by the decision source
        #[arg(long, default_value = "general")]
        route: String,
        /// Confidence reported for the proposed route
        #[arg(long, default_value_t = 0.9)]
        confidence: f64,
        /// Context entries (key=value)
        #[arg(long = "context", value_parser = parse_key_val)]
        context: Vec<(String, String)>,
    },
    /// Print the effective configuration
    Config,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=value: no '=' found in '{s}'"))?;
    Ok((key.trim().to_string(), value.to_string()))
}

/// Run the CLI command
pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Waves { plan }) => waves::run(&plan, &config),
        Some(Commands::Run {
            plan,
            distributed,
            wave_aware,
        }) => run::run(&plan, config, distributed, wave_aware).await,
        Some(Commands::Route {
            task,
            route,
            confidence,
            context,
        }) => route::run(&task, &route, confidence, context, config).await,
        Some(Commands::Config) => config::run(&config),
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("domain=code=review").unwrap(),
            ("domain".to_string(), "code=review".to_string())
        );
        assert!(parse_key_val("missing").is_err());
    }

    #[test]
    fn test_wave_aware_requires_distributed() {
        assert!(Cli::try_parse_from(["conflux", "run", "plan.json", "--wave-aware"]).is_err());

        let cli = Cli::try_parse_from([
            "conflux",
            "run",
            "plan.json",
            "--distributed",
            "--wave-aware",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Run {
                distributed: true,
                wave_aware: true,
                ..
            })
        ));
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["conflux", "config", "--config", "custom.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
    }
}

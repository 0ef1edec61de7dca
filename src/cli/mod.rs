//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use commands::config::ConfigArgs;
use commands::run::RunArgs;

/// Parsed command line
#[derive(Parser, Debug)]
#[command(name = "kypria")]
#[command(about = "Kypria - multi-component orchestration core", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register configured components and run the orchestration daemon
    Run(RunArgs),

    /// Print the effective configuration
    Config(ConfigArgs),
}

/// Report a command failure and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_cycles() {
        let cli = Cli::try_parse_from(["kypria", "run", "--cycles", "3", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.cycles, Some(3));
                assert!(args.config.is_none());
            }
            Commands::Config(_) => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_config_path() {
        let cli = Cli::try_parse_from(["kypria", "config", "--config", "custom.yaml"]).unwrap();
        match cli.command {
            Commands::Config(args) => {
                assert_eq!(args.config.unwrap().to_str(), Some("custom.yaml"));
            }
            Commands::Run(_) => panic!("expected config"),
        }
    }

    #[test]
    fn test_rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["kypria", "summon"]).is_err());
    }
}

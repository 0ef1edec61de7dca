//! Kypria CLI entry point.

use clap::Parser;

use kypria::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => kypria::cli::commands::run::execute(args, cli.json).await,
        Commands::Config(args) => kypria::cli::commands::config::execute(args, cli.json).await,
    };

    if let Err(err) = result {
        kypria::cli::handle_error(err, cli.json);
    }
}

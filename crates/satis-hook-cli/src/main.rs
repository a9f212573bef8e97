//! Main CLI entry point for satis-hook

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use tracing_subscriber::EnvFilter;

mod commands;

/// satis-hook - Rebuild a Satis repository when GitHub pushes arrive
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    quiet: u8,

    /// Configuration file path (global option)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build everything, then rebuild on webhooks and signals (default)
    Serve,

    /// Run a single build and exit
    Build {
        /// Restrict the build to these repositories
        #[arg(value_name = "REPO")]
        repositories: Vec<String>,
    },

    /// Pull the build image again
    Pull,

    /// Validate the configuration file
    Validate {
        /// Check Docker availability
        #[arg(long)]
        check_docker: bool,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
        output: PathBuf,

        /// Force overwrite existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet)?;

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from("config.yaml"));

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => commands::ServeCommand::new(config_path).execute().await,

        Commands::Build { repositories } => {
            commands::BuildCommand::new(config_path, repositories).execute().await
        }

        Commands::Pull => commands::PullCommand::new(config_path).execute().await,

        Commands::Validate { check_docker } => {
            commands::ValidateCommand::new(config_path, check_docker).execute().await
        }

        Commands::Init { output, force } => commands::InitCommand::new(output, force).execute().await,
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn setup_logging(verbose: u8, quiet: u8) -> Result<()> {
    let log_level = match (verbose, quiet) {
        (0, 0) => "info",
        (1, 0) => "debug",
        (v, 0) if v >= 2 => "trace",
        (0, 1) => "warn",
        (0, 2) => "error",
        (0, q) if q > 2 => "off",
        _ => "info",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_is_default() {
        let cli = Cli::parse_from(["satis-hook", "-c", "/etc/satis-hook.yaml"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, Some(PathBuf::from("/etc/satis-hook.yaml")));
    }

    #[test]
    fn test_scoped_build_arguments() {
        let cli = Cli::parse_from(["satis-hook", "-vv", "build", "org/a", "org/b"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Some(Commands::Build { repositories }) => assert_eq!(repositories, ["org/a", "org/b"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// Status page monitoring daemon
#[derive(Parser, Debug)]
#[command(name = "statusd", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file (defaults to ~/.config/statuspage/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the monitor until interrupted
    Run(RunArgs),
    /// Probe services once and print the results
    Check(CheckArgs),
    /// Print the resolved configuration
    Config,
}

#[derive(clap::Args, Debug, Default)]
pub struct RunArgs {
    /// Keep check history in memory only
    #[arg(long)]
    pub no_storage: bool,

    /// Override the storage directory from the config file
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    /// Only probe this service
    pub service: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_no_subcommand() {
        let cli = Cli::parse_from(["statusd"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from(["statusd", "-vv", "run", "--no-storage", "--config", "a.toml"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("a.toml")));
        match cli.command {
            Some(Commands::Run(args)) => {
                assert!(args.no_storage);
                assert!(args.data_dir.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_check_single_service() {
        let cli = Cli::parse_from(["statusd", "check", "api"]);
        match cli.command {
            Some(Commands::Check(args)) => assert_eq!(args.service.as_deref(), Some("api")),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

//! Command line interface definition

use clap::{Args, Parser, Subcommand};
use pgb_types::ColorChoice;
use std::path::PathBuf;

/// pgb - Run PhoneGap Build steps from any CI host
#[derive(Parser)]
#[command(name = "pgb")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run PhoneGap Build steps from any CI host")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging to the log directory
    #[arg(long, global = true)]
    pub debug: bool,

    /// Color output control
    #[arg(long, global = true, value_enum)]
    pub color: Option<ColorChoice>,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a build step: upload the workspace, build remotely, download artifacts
    Run(RunArgs),

    /// Validate a step file without contacting the build service
    Check {
        /// Step file (TOML)
        step: PathBuf,
    },

    /// Show the remote build status of the step's app
    Status {
        /// Step file (TOML)
        step: PathBuf,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Step file (TOML)
    pub step: PathBuf,

    /// Workspace to upload (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Do not write a newly created app id back into the step file
    #[arg(long)]
    pub no_persist: bool,
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
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "pgb",
            "run",
            "step.toml",
            "--workspace",
            "/ws",
            "--timeout",
            "600",
            "--json",
        ])
        .unwrap();
        assert!(cli.global.json);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.step, PathBuf::from("step.toml"));
                assert_eq!(args.workspace, Some(PathBuf::from("/ws")));
                assert_eq!(args.timeout, Some(600));
                assert!(!args.no_persist);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_color() {
        let cli = Cli::try_parse_from(["pgb", "--color", "never", "check", "step.toml"]).unwrap();
        assert_eq!(cli.global.color, Some(ColorChoice::Never));
    }
}

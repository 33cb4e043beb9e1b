//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Visperf: visual regression testing for component stories
#[derive(Parser, Debug)]
#[command(name = "visperf")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true, env = "VISPERF_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// YAML configuration file
    #[arg(long, global = true, env = "VISPERF_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding baseline images
    #[arg(long, global = true, env = "VISPERF_BASELINES_DIR")]
    pub baselines_dir: Option<PathBuf>,

    /// Address of the story renderer
    #[arg(long, global = true, env = "VISPERF_BASE_URL")]
    pub base_url: Option<String>,

    /// Per-pixel colour tolerance (0.0 - 1.0)
    #[arg(long, global = true, env = "VISPERF_THRESHOLD")]
    pub threshold: Option<f64>,

    /// Path to the chromium binary
    #[arg(long, global = true, env = "VISPERF_CHROMIUM_PATH")]
    pub chromium_path: Option<String>,

    /// Disable the browser sandbox (containers/CI)
    #[arg(long, global = true)]
    pub no_sandbox: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the visual test HTTP API
    Serve(ServeArgs),

    /// Capture a subject and compare it against its baseline
    Test(TestArgs),

    /// Promote an image to be the baseline of a subject
    Accept(AcceptArgs),

    /// Show whether a subject has a baseline
    Baseline(BaselineArgs),

    /// List subjects that have a baseline
    List,
}

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Interface to bind
    #[arg(long, env = "VISPERF_HOST")]
    pub host: Option<String>,

    /// HTTP port to listen on
    #[arg(short, long, env = "VISPERF_PORT")]
    pub port: Option<u16>,

    /// Enable CORS for cross-origin requests
    #[arg(long)]
    pub cors: bool,
}

/// Arguments for the test command
#[derive(Parser, Debug)]
pub struct TestArgs {
    /// Subject identifier (e.g. example-button--primary)
    pub subject: String,

    /// Directory to write the candidate and diff images to
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Result format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: ResultFormat,
}

/// Arguments for the accept command
#[derive(Parser, Debug)]
pub struct AcceptArgs {
    /// Subject identifier
    pub subject: String,

    /// PNG file to promote
    #[arg(short, long)]
    pub image: PathBuf,
}

/// Arguments for the baseline command
#[derive(Parser, Debug)]
pub struct BaselineArgs {
    /// Subject identifier
    pub subject: String,

    /// Copy the stored baseline to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Result output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResultFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// Wire-format JSON response
    Json,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_test_command() {
        let cli = Cli::try_parse_from([
            "visperf",
            "--threshold",
            "0.2",
            "test",
            "button--primary",
            "-o",
            "out",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.threshold, Some(0.2));
        match cli.command {
            Commands::Test(args) => {
                assert_eq!(args.subject, "button--primary");
                assert_eq!(args.output, Some(PathBuf::from("out")));
                assert_eq!(args.format, ResultFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["visperf", "list", "-vv", "--baselines-dir", "shots"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.baselines_dir, Some(PathBuf::from("shots")));
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn test_accept_requires_image() {
        assert!(Cli::try_parse_from(["visperf", "accept", "card"]).is_err());
        let cli = Cli::try_parse_from(["visperf", "accept", "card", "--image", "c.png"]).unwrap();
        assert!(matches!(cli.command, Commands::Accept(_)));
    }

    #[test]
    fn test_serve_defaults_are_unset() {
        let cli = Cli::try_parse_from(["visperf", "serve", "--cors"]).unwrap();
        match cli.command {
            Commands::Serve(args) => {
                assert!(args.cors);
                assert!(args.port.is_none() || std::env::var("VISPERF_PORT").is_ok());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

//! CLI configuration
//!
//! Precedence: command-line flags and `VISPERF_*` variables, then the YAML
//! file given with `--config`, then built-in defaults.

use crate::commands::{Cli, LogFormat, ServeArgs};
use crate::error::{CliError, CliResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use visperf::{EngineConfig, API_BASE_PATH};

/// CLI verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Quiet - errors only
    Quiet,
    /// Normal - default output
    #[default]
    Normal,
    /// Verbose - extra output
    Verbose,
    /// Debug - maximum output
    Debug,
}

impl Verbosity {
    /// Derive from `-q` and the `-v` count
    #[must_use]
    pub const fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            _ => Self::Debug,
        }
    }

    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Default `tracing` filter directive
    #[must_use]
    pub const fn filter_directive(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn,visperf=info,visperf_cli=info",
            Self::Verbose => "info,tower_http=debug",
            Self::Debug => "debug",
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    /// Allow cross-origin requests
    pub cors: bool,
    /// Path prefix the API is mounted under (also served at root)
    pub base_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6007,
            cors: false,
            base_path: API_BASE_PATH.to_string(),
        }
    }
}

impl ServerConfig {
    /// Socket address to bind
    ///
    /// # Errors
    ///
    /// Returns error if host and port do not form a valid address
    pub fn socket_addr(&self) -> CliResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| CliError::config(format!("invalid bind address {}:{}: {e}", self.host, self.port)))
    }
}

/// Full configuration: engine plus server
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Engine settings (baselines, capture, diff)
    #[serde(flatten)]
    pub engine: EngineConfig,
    /// HTTP server settings
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load a YAML configuration file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CliError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml(&text)
            .map_err(|e| CliError::config(format!("{}: {e}", path.display())))
    }

    /// Parse a YAML document
    ///
    /// # Errors
    ///
    /// Returns error if the document is not valid configuration
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml_ng::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(text)
    }

    /// Resolve configuration for an invocation
    ///
    /// # Errors
    ///
    /// Returns error if the config file is unreadable or a flag is out of range
    pub fn resolve(cli: &Cli) -> CliResult<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli)?;
        Ok(config)
    }

    /// Overlay global flags
    ///
    /// # Errors
    ///
    /// Returns error if the threshold is outside 0..=1
    pub fn apply_cli(&mut self, cli: &Cli) -> CliResult<()> {
        if let Some(ref dir) = cli.baselines_dir {
            self.engine.baselines_dir.clone_from(dir);
        }
        if let Some(ref url) = cli.base_url {
            self.engine.capture.base_url.clone_from(url);
        }
        if let Some(ref path) = cli.chromium_path {
            self.engine.capture.chromium_path = Some(path.clone());
        }
        if cli.no_sandbox {
            self.engine.capture.sandbox = false;
        }
        if let Some(threshold) = cli.threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(CliError::invalid_argument(format!(
                    "threshold must be between 0 and 1, got {threshold}"
                )));
            }
            self.engine.diff.threshold = threshold;
        }
        Ok(())
    }

    /// Overlay `serve` flags
    pub fn apply_serve(&mut self, args: &ServeArgs) {
        if let Some(ref host) = args.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if args.cors {
            self.server.cors = true;
        }
    }
}

/// Install the global `tracing` subscriber, writing to stderr
///
/// `RUST_LOG` overrides the verbosity-derived filter.
pub fn init_tracing(verbosity: Verbosity, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = match format {
        LogFormat::Text => builder.with_target(false).try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    // A subscriber may already be installed (tests); keep it.
    drop(installed);
}

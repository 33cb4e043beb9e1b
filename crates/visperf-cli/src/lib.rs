//! Visperf CLI Library
//!
//! HTTP service and command-line front end for the visperf engine.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
pub mod engine;
mod error;
mod output;
pub mod server;

pub use commands::{
    AcceptArgs, BaselineArgs, Cli, Commands, LogFormat, ResultFormat, ServeArgs, TestArgs,
};
pub use config::{init_tracing, AppConfig, ServerConfig, Verbosity};
pub use engine::{build_orchestrator, default_launcher, write_artifacts};
pub use error::{CliError, CliResult};
pub use output::{format_result, Reporter};
pub use server::{router, serve, ApiError, ApiState};

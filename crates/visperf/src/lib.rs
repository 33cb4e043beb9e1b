//! Visperf: visual regression engine for component stories
//!
//! Captures a rendered subject in a headless browser, compares it pixel by
//! pixel against a stored baseline, and classifies the run as new, matching or
//! differing. Differences can be accepted, promoting the capture to be the new
//! baseline.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                        VISPERF Architecture                        │
//! ├────────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌──────────────┐    ┌──────────────┐           │
//! │   │ Client     │    │ Test         │───►│ Capture      │──► Chrome │
//! │   │ State      │◄──►│ Orchestrator │    │ Driver       │           │
//! │   │ Machine    │    │ (per-subject │    └──────────────┘           │
//! │   └────────────┘    │  locks)      │───►┌──────────────┐           │
//! │                     │              │    │ Diff Engine  │           │
//! │                     │              │───►├──────────────┤           │
//! │                     └──────────────┘    │ Baseline     │           │
//! │                                         │ Store        │           │
//! │                                         └──────────────┘           │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use visperf::{EngineConfig, ScriptedLauncher, Subject, TestOrchestrator};
//!
//! # async fn run() -> visperf::VisperfResult<()> {
//! let launcher = Arc::new(ScriptedLauncher::always(std::fs::read("button.png")?));
//! let orchestrator = TestOrchestrator::new(launcher, EngineConfig::default())?;
//! let result = orchestrator.run_test(&Subject::new("example-button--primary")?).await;
//! println!("{}: {}", result.status, result.message);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod capture;
#[cfg(feature = "browser")]
mod chromium;
mod client;
mod codec;
mod config;
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::suboptimal_flops,
    clippy::many_single_char_names,
    clippy::similar_names
)]
mod diff;
mod orchestrator;
mod protocol;
mod result;
mod store;
mod subject;

pub use capture::{
    BrowserLauncher, BrowserSession, CaptureConfig, CaptureDriver, CaptureFault,
    NavigationFailure, ScriptedLauncher, DEFAULT_BASE_URL, DEFAULT_NAVIGATION_TIMEOUT,
    DEFAULT_RETRY_BACKOFF, DEFAULT_SETTLE_DELAY, MAX_CAPTURE_ATTEMPTS,
};
#[cfg(feature = "browser")]
pub use chromium::ChromiumLauncher;
pub use client::{ClientEvent, ClientStatus, ClientViewState, ImageView};
pub use codec::{decode_png, encode_png, from_data_uri, to_data_uri, PNG_DATA_URI_PREFIX};
pub use config::EngineConfig;
pub use diff::{compare, compare_png, encode_diff, DiffOptions, DiffOutcome, DEFAULT_THRESHOLD};
pub use orchestrator::{BaselineStatus, TestOrchestrator, TestStatus, VisualTestResult};
pub use protocol::{
    AcceptRequest, AcceptResponse, BaselineResponse, BaselineState, ErrorResponse,
    HealthResponse, TestRequest, TestResponse, API_BASE_PATH,
};
pub use result::{VisperfError, VisperfResult};
pub use store::{content_digest, BaselineStore, StoredImage, DEFAULT_BASELINES_DIR};
pub use subject::{Subject, MAX_SUBJECT_LEN};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::capture::*;
    #[cfg(feature = "browser")]
    pub use super::chromium::*;
    pub use super::client::*;
    pub use super::config::*;
    pub use super::diff::*;
    pub use super::orchestrator::*;
    pub use super::protocol::*;
    pub use super::result::*;
    pub use super::store::*;
    pub use super::subject::*;
}

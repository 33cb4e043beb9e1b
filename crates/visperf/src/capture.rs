//! Capture driver: one headless browser per screenshot.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ CaptureDriver::capture(subject)                                  │
//! │                                                                  │
//! │   attempt 1 ──► launch ─► navigate ─► wait idle ─► settle ─► PNG │
//! │       │            (close on every exit path)                    │
//! │       └─ retryable navigation fault? ── sleep(backoff) ──►       │
//! │   attempt 2 ──► same pipeline, any fault is terminal             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The browser is reached through the [`BrowserLauncher`]/[`BrowserSession`]
//! seam. `ChromiumLauncher` (feature `browser`) drives a real Chromium over
//! CDP; [`ScriptedLauncher`] replays canned outcomes for tests.

use crate::config::millis;
use crate::result::{VisperfError, VisperfResult};
use crate::subject::Subject;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default address of the rendering target
pub const DEFAULT_BASE_URL: &str = "http://localhost:6006";

/// Pause after the page reports idle, before the screenshot
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Pause between a retryable failure and the second attempt
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Upper bound on a single navigation
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Total attempts per capture (the first try plus one retry)
pub const MAX_CAPTURE_ATTEMPTS: u32 = 2;

/// Capture configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Address of the rendering target (no trailing slash needed)
    pub base_url: String,
    /// Pause after render idle before capturing
    #[serde(with = "millis", rename = "settle_delay_ms")]
    pub settle_delay: Duration,
    /// Pause before retrying a navigation failure
    #[serde(with = "millis", rename = "retry_backoff_ms")]
    pub retry_backoff: Duration,
    /// Upper bound on navigation and CDP requests
    #[serde(with = "millis", rename = "navigation_timeout_ms")]
    pub navigation_timeout: Duration,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            viewport_width: 1280,
            viewport_height: 720,
            chromium_path: None,
            sandbox: true,
        }
    }
}

impl CaptureConfig {
    /// Set the rendering target address
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the settle delay
    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the retry backoff
    #[must_use]
    pub const fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set viewport dimensions
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }

    /// URL that renders `subject` in isolation
    #[must_use]
    pub fn subject_url(&self, subject: &Subject) -> String {
        format!(
            "{}/iframe.html?id={subject}&viewMode=story",
            self.base_url.trim_end_matches('/')
        )
    }
}

/// Why a navigation failed
///
/// Mapped from Chrome's `net::ERR_*` codes and CDP timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationFailure {
    /// Navigation or load did not finish in time
    Timeout,
    /// Nothing listening at the target address
    ConnectionRefused,
    /// Connection dropped mid-request
    ConnectionReset,
    /// Server closed the connection without a response
    ConnectionClosed,
    /// Network or host unreachable
    AddressUnreachable,
    /// Navigation was superseded or cancelled
    Aborted,
    /// Host name could not be resolved
    NameNotResolved,
    /// URL was rejected by the browser
    InvalidUrl,
    /// Anything else
    Other,
}

impl NavigationFailure {
    /// Classify a Chrome network error code such as `net::ERR_CONNECTION_REFUSED`
    #[must_use]
    pub fn from_net_error(code: &str) -> Self {
        let code = code.trim();
        let code = code.strip_prefix("net::").unwrap_or(code);
        match code {
            "ERR_TIMED_OUT" | "ERR_CONNECTION_TIMED_OUT" => Self::Timeout,
            "ERR_CONNECTION_REFUSED" => Self::ConnectionRefused,
            "ERR_CONNECTION_RESET" => Self::ConnectionReset,
            "ERR_CONNECTION_CLOSED" | "ERR_EMPTY_RESPONSE" => Self::ConnectionClosed,
            "ERR_ADDRESS_UNREACHABLE" | "ERR_NETWORK_CHANGED" | "ERR_INTERNET_DISCONNECTED" => {
                Self::AddressUnreachable
            }
            "ERR_ABORTED" => Self::Aborted,
            "ERR_NAME_NOT_RESOLVED" | "ERR_NAME_RESOLUTION_FAILED" => Self::NameNotResolved,
            "ERR_INVALID_URL" | "ERR_UNSAFE_PORT" | "ERR_DISALLOWED_URL_SCHEME" => {
                Self::InvalidUrl
            }
            _ => Self::Other,
        }
    }

    /// Whether a second attempt may succeed
    ///
    /// Transient conditions of a local dev server (still starting, restarting,
    /// slow first render) are retryable. Configuration mistakes are not.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::ConnectionRefused
                | Self::ConnectionReset
                | Self::ConnectionClosed
                | Self::AddressUnreachable
                | Self::Aborted
        )
    }

    /// Stable snake_case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionRefused => "connection_refused",
            Self::ConnectionReset => "connection_reset",
            Self::ConnectionClosed => "connection_closed",
            Self::AddressUnreachable => "address_unreachable",
            Self::Aborted => "aborted",
            Self::NameNotResolved => "name_not_resolved",
            Self::InvalidUrl => "invalid_url",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for NavigationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed step of one capture attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureFault {
    /// Browser could not be started
    #[error("Failed to launch browser: {message}")]
    Launch {
        /// Error message
        message: String,
    },

    /// Page navigation failed
    #[error("Navigation failed ({kind}): {message}")]
    Navigation {
        /// Failure class
        kind: NavigationFailure,
        /// Error message
        message: String,
    },

    /// Page loaded but never reported a stable render
    #[error("Render wait failed: {message}")]
    Render {
        /// Error message
        message: String,
    },

    /// Screenshot could not be taken
    #[error("Screenshot failed: {message}")]
    Screenshot {
        /// Error message
        message: String,
    },
}

impl CaptureFault {
    /// Create a navigation fault
    #[must_use]
    pub fn navigation(kind: NavigationFailure, message: impl Into<String>) -> Self {
        Self::Navigation {
            kind,
            message: message.into(),
        }
    }

    /// Whether the capture should be attempted again
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Navigation { kind, .. } => kind.is_retryable(),
            Self::Launch { .. } | Self::Render { .. } | Self::Screenshot { .. } => false,
        }
    }
}

/// Starts isolated browser instances
#[async_trait]
pub trait BrowserLauncher: Send + Sync + fmt::Debug {
    /// Start a fresh browser with a blank page
    async fn launch(&self, config: &CaptureConfig) -> Result<Box<dyn BrowserSession>, CaptureFault>;
}

/// A live browser owned by exactly one capture attempt
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate to `url` and wait for the load to commit
    async fn navigate(&mut self, url: &str) -> Result<(), CaptureFault>;

    /// Wait until the page reports network and render idle
    async fn wait_until_idle(&mut self) -> Result<(), CaptureFault>;

    /// Capture the viewport as PNG
    async fn screenshot(&mut self) -> Result<Vec<u8>, CaptureFault>;

    /// Shut the browser down
    async fn close(self: Box<Self>) -> Result<(), CaptureFault>;
}

/// Produces candidate images for subjects
#[derive(Debug, Clone)]
pub struct CaptureDriver {
    launcher: Arc<dyn BrowserLauncher>,
    config: CaptureConfig,
}

impl CaptureDriver {
    /// Create a driver over `launcher`
    #[must_use]
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: CaptureConfig) -> Self {
        Self { launcher, config }
    }

    /// Get the capture configuration
    #[must_use]
    pub const fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Capture `subject` as PNG, retrying once on a retryable navigation fault
    ///
    /// # Errors
    ///
    /// Returns `CaptureFailed` carrying the last fault
    pub async fn capture(&self, subject: &Subject) -> VisperfResult<Vec<u8>> {
        let url = self.config.subject_url(subject);
        let mut attempt = 1;
        loop {
            debug!(subject = %subject, attempt, url = %url, "capture attempt");
            match self.capture_once(&url).await {
                Ok(png) => {
                    info!(subject = %subject, attempt, bytes = png.len(), "captured");
                    return Ok(png);
                }
                Err(fault) if fault.is_retryable() && attempt < MAX_CAPTURE_ATTEMPTS => {
                    warn!(
                        subject = %subject,
                        attempt,
                        error = %fault,
                        backoff_ms = self.config.retry_backoff.as_millis() as u64,
                        "capture failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_backoff).await;
                    attempt += 1;
                }
                Err(fault) => {
                    warn!(subject = %subject, attempt, error = %fault, "capture failed");
                    return Err(VisperfError::CaptureFailed {
                        subject: subject.to_string(),
                        attempts: attempt,
                        source: fault,
                    });
                }
            }
        }
    }

    async fn capture_once(&self, url: &str) -> Result<Vec<u8>, CaptureFault> {
        let mut session = self.launcher.launch(&self.config).await?;
        let outcome = drive(session.as_mut(), url, self.config.settle_delay).await;
        if let Err(e) = session.close().await {
            warn!(error = %e, "browser did not close cleanly");
        }
        outcome
    }
}

async fn drive(
    session: &mut dyn BrowserSession,
    url: &str,
    settle: Duration,
) -> Result<Vec<u8>, CaptureFault> {
    session.navigate(url).await?;
    session.wait_until_idle().await?;
    tokio::time::sleep(settle).await;
    let png = session.screenshot().await?;
    if png.is_empty() {
        return Err(CaptureFault::Screenshot {
            message: "browser returned an empty image".to_string(),
        });
    }
    Ok(png)
}

// ============================================================================
// Scripted implementation (tests and offline runs)
// ============================================================================

/// Launcher that replays a queue of canned outcomes
///
/// Each launch pops one outcome: `Ok(png)` yields a session whose screenshot
/// returns `png`; a `Launch` fault fails the launch itself; other faults fail
/// the matching step. With an empty queue the fallback image (if any) is used.
/// Clones share the queue and counters.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLauncher {
    outcomes: Arc<Mutex<VecDeque<Result<Vec<u8>, CaptureFault>>>>,
    fallback: Option<Vec<u8>>,
    step_delay: Duration,
    launches: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLauncher {
    /// Create a launcher with an empty script
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a launcher that always captures `png`
    #[must_use]
    pub fn always(png: Vec<u8>) -> Self {
        Self {
            fallback: Some(png),
            ..Self::default()
        }
    }

    /// Queue a successful capture
    #[must_use]
    pub fn then_capture(self, png: Vec<u8>) -> Self {
        self.push(Ok(png));
        self
    }

    /// Queue a failed capture
    #[must_use]
    pub fn then_fail(self, fault: CaptureFault) -> Self {
        self.push(Err(fault));
        self
    }

    /// Delay every browser step, to widen race windows in tests
    #[must_use]
    pub const fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Queue an outcome on a shared launcher
    pub fn push(&self, outcome: Result<Vec<u8>, CaptureFault>) {
        if let Ok(mut queue) = self.outcomes.lock() {
            queue.push_back(outcome);
        }
    }

    /// Number of browsers launched
    #[must_use]
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Number of browsers closed
    #[must_use]
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// URLs navigated to, in order
    #[must_use]
    pub fn visited(&self) -> Vec<String> {
        self.urls.lock().map(|u| u.clone()).unwrap_or_default()
    }

    fn next_outcome(&self) -> Result<Vec<u8>, CaptureFault> {
        let queued = self.outcomes.lock().ok().and_then(|mut q| q.pop_front());
        queued.unwrap_or_else(|| {
            self.fallback.clone().ok_or_else(|| CaptureFault::Launch {
                message: "no scripted capture left".to_string(),
            })
        })
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self, _config: &CaptureConfig) -> Result<Box<dyn BrowserSession>, CaptureFault> {
        let outcome = self.next_outcome();
        if let Err(fault @ CaptureFault::Launch { .. }) = outcome {
            return Err(fault);
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            outcome,
            delay: self.step_delay,
            closes: Arc::clone(&self.closes),
            urls: Arc::clone(&self.urls),
        }))
    }
}

#[derive(Debug)]
struct ScriptedSession {
    outcome: Result<Vec<u8>, CaptureFault>,
    delay: Duration,
    closes: Arc<AtomicUsize>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSession {
    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&mut self, url: &str) -> Result<(), CaptureFault> {
        self.pause().await;
        if let Ok(mut urls) = self.urls.lock() {
            urls.push(url.to_string());
        }
        match &self.outcome {
            Err(fault @ CaptureFault::Navigation { .. }) => Err(fault.clone()),
            _ => Ok(()),
        }
    }

    async fn wait_until_idle(&mut self) -> Result<(), CaptureFault> {
        self.pause().await;
        match &self.outcome {
            Err(fault @ CaptureFault::Render { .. }) => Err(fault.clone()),
            _ => Ok(()),
        }
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, CaptureFault> {
        self.pause().await;
        self.outcome.clone()
    }

    async fn close(self: Box<Self>) -> Result<(), CaptureFault> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

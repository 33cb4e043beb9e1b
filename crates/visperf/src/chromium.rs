//! Chromium launcher over the Chrome DevTools Protocol.

use crate::capture::{BrowserLauncher, BrowserSession, CaptureConfig, CaptureFault, NavigationFailure};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::LoaderId;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams, EventLifecycleEvent, NavigateParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Lifecycle event Chrome emits once no request has been in flight for 500 ms
const NETWORK_IDLE_EVENT: &str = "networkIdle";

/// Resolves once web fonts are ready
const FONTS_READY_SCRIPT: &str = "document.fonts.ready.then(() => true)";

/// Page emulation matching the configured viewport
fn viewport(config: &CaptureConfig) -> Viewport {
    Viewport {
        width: config.viewport_width,
        height: config.viewport_height,
        ..Viewport::default()
    }
}

fn browser_config(config: &CaptureConfig) -> Result<BrowserConfig, String> {
    let mut builder = BrowserConfig::builder()
        .window_size(config.viewport_width, config.viewport_height)
        .viewport(viewport(config))
        .request_timeout(config.navigation_timeout);
    if !config.sandbox {
        builder = builder.no_sandbox();
    }
    if let Some(ref path) = config.chromium_path {
        builder = builder.chrome_executable(path);
    }
    builder.build()
}

/// Starts a fresh headless Chromium per capture
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromiumLauncher;

impl ChromiumLauncher {
    /// Create a launcher
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, config: &CaptureConfig) -> Result<Box<dyn BrowserSession>, CaptureFault> {
        let launch_error = |message: String| CaptureFault::Launch { message };

        let cdp_config = browser_config(config).map_err(launch_error)?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| launch_error(e.to_string()))?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let mut session = ChromiumSession {
            browser,
            page: None,
            lifecycle: None,
            handle,
            timeout: config.navigation_timeout,
        };
        match session.browser.new_page("about:blank").await {
            Ok(page) => {
                session.page = Some(page);
                debug!("chromium launched");
                Ok(Box::new(session))
            }
            Err(e) => {
                let fault = launch_error(e.to_string());
                let _ = Box::new(session).close().await;
                Err(fault)
            }
        }
    }
}

struct ChromiumSession {
    browser: Browser,
    page: Option<Page>,
    /// Lifecycle events of the current navigation, with its loader id
    lifecycle: Option<(EventStream<EventLifecycleEvent>, Option<LoaderId>)>,
    handle: JoinHandle<()>,
    timeout: Duration,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page, CaptureFault> {
        self.page.as_ref().ok_or_else(|| CaptureFault::Launch {
            message: "browser has no page".to_string(),
        })
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), CaptureFault> {
        let page = self.page()?;
        // Subscribe first so the idle event cannot fire unobserved.
        let events = page
            .event_listener::<EventLifecycleEvent>()
            .await
            .map_err(|e| navigation_fault(&e))?;
        let navigation = async {
            let navigated = page.execute(NavigateParams::new(url)).await?.result;
            match navigated.error_text {
                Some(text) => Err(CdpError::ChromeMessage(text)),
                None => Ok(navigated.loader_id),
            }
        };
        let outcome = tokio::time::timeout(self.timeout, navigation).await;
        match outcome {
            Ok(Ok(loader)) => {
                self.lifecycle = Some((events, loader));
                Ok(())
            }
            Ok(Err(e)) => Err(navigation_fault(&e)),
            Err(_) => Err(CaptureFault::navigation(
                NavigationFailure::Timeout,
                format!("navigation to {url} timed out"),
            )),
        }
    }

    async fn wait_until_idle(&mut self) -> Result<(), CaptureFault> {
        let render_error = |message: String| CaptureFault::Render { message };
        let (mut events, loader) = self
            .lifecycle
            .take()
            .ok_or_else(|| render_error("no navigation to wait for".to_string()))?;
        let page = self.page()?;
        let wait = async {
            while let Some(event) = events.next().await {
                if is_network_idle(&event, loader.as_ref()) {
                    return page
                        .evaluate(FONTS_READY_SCRIPT)
                        .await
                        .map(|_| ())
                        .map_err(|e| e.to_string());
                }
            }
            Err("page closed before network idle".to_string())
        };
        match tokio::time::timeout(self.timeout, wait).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(render_error(message)),
            Err(_) => Err(render_error("network never became idle".to_string())),
        }
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, CaptureFault> {
        let screenshot_error = |message: String| CaptureFault::Screenshot { message };
        let page = self.page()?;
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let screenshot = page
            .execute(params)
            .await
            .map_err(|e| screenshot_error(e.to_string()))?;
        base64::engine::general_purpose::STANDARD
            .decode(&screenshot.data)
            .map_err(|e| screenshot_error(e.to_string()))
    }

    async fn close(mut self: Box<Self>) -> Result<(), CaptureFault> {
        self.lifecycle = None;
        self.page = None;
        let closed = self.browser.close().await;
        // Reap the child process whether or not the close command went through.
        let _ = self.browser.wait().await;
        self.handle.abort();
        debug!("chromium closed");
        closed.map(|_| ()).map_err(|e| CaptureFault::Launch {
            message: format!("close failed: {e}"),
        })
    }
}

/// Whether `event` is the network-idle signal of the navigation started with `loader`
fn is_network_idle(event: &EventLifecycleEvent, loader: Option<&LoaderId>) -> bool {
    event.name == NETWORK_IDLE_EVENT && loader.map_or(true, |id| &event.loader_id == id)
}

/// Classify a CDP navigation error by its Chrome error code
fn navigation_fault(err: &CdpError) -> CaptureFault {
    let message = err.to_string();
    let kind = match err {
        CdpError::Timeout => NavigationFailure::Timeout,
        CdpError::ChromeMessage(text) => net_error_code(text)
            .map_or(NavigationFailure::Other, NavigationFailure::from_net_error),
        _ => NavigationFailure::Other,
    };
    CaptureFault::navigation(kind, message)
}

/// Extract the `net::ERR_*` token Chrome reports for failed loads
fn net_error_code(text: &str) -> Option<&str> {
    text.split(|c: char| c.is_whitespace() || c == '(' || c == ')' || c == ',')
        .find(|token| token.starts_with("net::ERR_") || token.starts_with("ERR_"))
}

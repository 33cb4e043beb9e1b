//! Engine wiring: launcher selection and orchestrator construction.

use crate::error::CliResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use visperf::{BrowserLauncher, EngineConfig, Subject, TestOrchestrator, VisualTestResult};

/// Browser launcher for this build
#[cfg(feature = "browser")]
#[must_use]
pub fn default_launcher() -> Arc<dyn BrowserLauncher> {
    Arc::new(visperf::ChromiumLauncher::new())
}

/// Browser launcher for this build
#[cfg(not(feature = "browser"))]
#[must_use]
pub fn default_launcher() -> Arc<dyn BrowserLauncher> {
    Arc::new(UnavailableLauncher)
}

/// Launcher used when the binary is built without browser support
#[cfg(not(feature = "browser"))]
#[derive(Debug, Clone, Copy)]
pub struct UnavailableLauncher;

#[cfg(not(feature = "browser"))]
#[async_trait::async_trait]
impl BrowserLauncher for UnavailableLauncher {
    async fn launch(
        &self,
        _config: &visperf::CaptureConfig,
    ) -> Result<Box<dyn visperf::BrowserSession>, visperf::CaptureFault> {
        Err(visperf::CaptureFault::Launch {
            message: "visperf was built without the `browser` feature".to_string(),
        })
    }
}

/// Build an orchestrator over `launcher`
///
/// # Errors
///
/// Returns error if the baselines directory cannot be created
pub fn build_orchestrator(
    launcher: Arc<dyn BrowserLauncher>,
    config: EngineConfig,
) -> CliResult<TestOrchestrator> {
    Ok(TestOrchestrator::new(launcher, config)?)
}

/// Write the images of a result into `dir`
///
/// Files are named `{subject}.candidate.png`, `{subject}.diff.png` and
/// `{subject}.baseline.png`; absent images are skipped.
///
/// # Errors
///
/// Returns error if the directory or a file cannot be written
pub fn write_artifacts(
    dir: &Path,
    subject: &Subject,
    result: &VisualTestResult,
) -> CliResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let images = [
        ("candidate", result.candidate_image.as_deref()),
        ("diff", result.diff_image.as_deref()),
        ("baseline", result.baseline_image.as_deref()),
    ];
    let mut written = Vec::new();
    for (kind, bytes) in images {
        if let Some(bytes) = bytes {
            let path = dir.join(format!("{subject}.{kind}.png"));
            std::fs::write(&path, bytes)?;
            written.push(path);
        }
    }
    Ok(written)
}

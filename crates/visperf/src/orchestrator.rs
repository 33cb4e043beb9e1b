//! Test orchestrator: capture, compare, classify, accept.
//!
//! Every request for a subject runs under that subject's lock, so two runs (or
//! a run and an accept) for the same subject never interleave while different
//! subjects proceed in parallel. The lock is fair, which keeps results for one
//! subject in request order.
//!
//! A request joins the subject's queue in the caller, then executes on its own
//! task holding the lock: once it has the lock, a caller that stops waiting
//! does not cancel the capture, and the store is still updated when it
//! finishes.

use crate::capture::{BrowserLauncher, CaptureDriver};
use crate::codec::decode_png;
use crate::config::EngineConfig;
use crate::diff::{compare_png, encode_diff, DiffOptions, DiffOutcome};
use crate::result::{VisperfError, VisperfResult};
use crate::store::BaselineStore;
use crate::subject::Subject;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info};

/// Classification of a finished request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Baseline existed and the capture matched it
    Success,
    /// Baseline existed and the capture differed (pixels or dimensions)
    Failed,
    /// No baseline existed; the capture became the baseline
    New,
    /// Capture, decode or persistence failed
    Error,
}

impl TestStatus {
    /// Stable lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::New => "new",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a test or accept request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualTestResult {
    /// Authoritative classification
    pub status: TestStatus,
    /// Human-readable summary
    pub message: String,
    /// Freshly captured PNG (new and failed results)
    pub candidate_image: Option<Vec<u8>>,
    /// Difference visualisation PNG (pixel mismatches only)
    pub diff_image: Option<Vec<u8>>,
    /// Baseline the candidate was compared against (failed results)
    pub baseline_image: Option<Vec<u8>>,
    /// Whether a baseline is stored after the request
    pub baseline_exists: bool,
    /// Differing pixel count, when a pixel comparison took place
    pub mismatched_pixels: Option<u64>,
}

impl VisualTestResult {
    fn new_baseline(candidate: Vec<u8>) -> Self {
        Self {
            status: TestStatus::New,
            message: "New baseline image created.".to_string(),
            candidate_image: Some(candidate),
            diff_image: None,
            baseline_image: None,
            baseline_exists: true,
            mismatched_pixels: None,
        }
    }

    fn matched() -> Self {
        Self {
            status: TestStatus::Success,
            message: "No visual changes detected.".to_string(),
            candidate_image: None,
            diff_image: None,
            baseline_image: None,
            baseline_exists: true,
            mismatched_pixels: Some(0),
        }
    }

    fn mismatched(candidate: Vec<u8>, baseline: Vec<u8>, diff: Vec<u8>, count: u64) -> Self {
        Self {
            status: TestStatus::Failed,
            message: format!("{count} pixels differ"),
            candidate_image: Some(candidate),
            diff_image: Some(diff),
            baseline_image: Some(baseline),
            baseline_exists: true,
            mismatched_pixels: Some(count),
        }
    }

    fn dimensions_differ(
        candidate: Vec<u8>,
        previous: Vec<u8>,
        baseline: (u32, u32),
        captured: (u32, u32),
    ) -> Self {
        Self {
            status: TestStatus::Failed,
            message: format!(
                "dimensions differ: baseline {}x{}, candidate {}x{}; candidate saved as baseline",
                baseline.0, baseline.1, captured.0, captured.1
            ),
            candidate_image: Some(candidate),
            diff_image: None,
            baseline_image: Some(previous),
            baseline_exists: true,
            mismatched_pixels: None,
        }
    }

    fn accepted() -> Self {
        Self {
            status: TestStatus::Success,
            message: "baseline accepted".to_string(),
            candidate_image: None,
            diff_image: None,
            baseline_image: None,
            baseline_exists: true,
            mismatched_pixels: None,
        }
    }

    /// Error result carrying the failure's message
    ///
    /// `baseline_exists` reports the store as it stands after the failure.
    #[must_use]
    pub fn from_error(err: &VisperfError, baseline_exists: bool) -> Self {
        Self {
            status: TestStatus::Error,
            message: err.to_string(),
            candidate_image: None,
            diff_image: None,
            baseline_image: None,
            baseline_exists,
            mismatched_pixels: None,
        }
    }
}

/// Whether a baseline is stored for a subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaselineStatus {
    /// Stored baseline bytes
    Exists(Vec<u8>),
    /// Nothing stored yet
    Missing,
}

/// Per-subject async locks, pruned when idle
#[derive(Debug, Default)]
struct SubjectLocks {
    inner: Mutex<HashMap<Subject, Arc<tokio::sync::Mutex<()>>>>,
}

impl SubjectLocks {
    async fn acquire(&self, subject: &Subject) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // An entry only the map references has no holder and no waiter.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(map.entry(subject.clone()).or_default())
        };
        lock.lock_owned().await
    }

    fn tracked(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[derive(Debug)]
struct Inner {
    capture: CaptureDriver,
    store: BaselineStore,
    diff: DiffOptions,
    locks: SubjectLocks,
}

/// Runs visual tests and accepts candidates
///
/// Cheap to clone; clones share the store, locks and launcher.
#[derive(Debug, Clone)]
pub struct TestOrchestrator {
    inner: Arc<Inner>,
}

impl TestOrchestrator {
    /// Build an orchestrator from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the baselines directory cannot be created
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: EngineConfig) -> VisperfResult<Self> {
        let store = BaselineStore::open(&config.baselines_dir)?;
        let capture = CaptureDriver::new(launcher, config.capture);
        Ok(Self::from_parts(capture, store, config.diff))
    }

    /// Build an orchestrator from ready-made parts
    #[must_use]
    pub fn from_parts(capture: CaptureDriver, store: BaselineStore, diff: DiffOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                capture,
                store,
                diff,
                locks: SubjectLocks::default(),
            }),
        }
    }

    /// Get the baseline store
    #[must_use]
    pub fn store(&self) -> &BaselineStore {
        &self.inner.store
    }

    /// Get the comparison options
    #[must_use]
    pub fn diff_options(&self) -> &DiffOptions {
        &self.inner.diff
    }

    /// Capture `subject` and classify it against its baseline
    ///
    /// # Errors
    ///
    /// Returns `CaptureFailed`, `DecodeError` or `WriteError`; the stored
    /// baseline is unchanged when a write fails
    pub async fn try_run_test(&self, subject: &Subject) -> VisperfResult<VisualTestResult> {
        let guard = self.inner.locks.acquire(subject).await;
        let inner = Arc::clone(&self.inner);
        let subject = subject.clone();
        tokio::spawn(async move { inner.run_test(subject, guard).await }).await?
    }

    /// Like [`try_run_test`](Self::try_run_test), folding failures into an error result
    pub async fn run_test(&self, subject: &Subject) -> VisualTestResult {
        self.try_run_test(subject).await.unwrap_or_else(|err| {
            error!(subject = %subject, error = %err, "visual test failed");
            VisualTestResult::from_error(&err, self.inner.store.exists(subject))
        })
    }

    /// Promote `candidate` to be the baseline for `subject`
    ///
    /// Idempotent: accepting the same bytes twice leaves the same baseline.
    ///
    /// # Errors
    ///
    /// Returns `MissingCandidate` for empty input, `DecodeError` if the bytes
    /// are not a PNG, or `WriteError`
    pub async fn try_accept(
        &self,
        subject: &Subject,
        candidate: Vec<u8>,
    ) -> VisperfResult<VisualTestResult> {
        if candidate.is_empty() {
            return Err(VisperfError::MissingCandidate {
                subject: subject.to_string(),
            });
        }
        let guard = self.inner.locks.acquire(subject).await;
        let inner = Arc::clone(&self.inner);
        let subject = subject.clone();
        tokio::spawn(async move { inner.accept(subject, candidate, guard).await }).await?
    }

    /// Like [`try_accept`](Self::try_accept), folding failures into an error result
    pub async fn accept(&self, subject: &Subject, candidate: Vec<u8>) -> VisualTestResult {
        self.try_accept(subject, candidate)
            .await
            .unwrap_or_else(|err| {
                error!(subject = %subject, error = %err, "accept failed");
                VisualTestResult::from_error(&err, self.inner.store.exists(subject))
            })
    }

    /// Look up the stored baseline for `subject`
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the baseline exists but cannot be read
    pub async fn baseline(&self, subject: &Subject) -> VisperfResult<BaselineStatus> {
        let store = self.inner.store.clone();
        let subject = subject.clone();
        let loaded = tokio::task::spawn_blocking(move || store.try_load(&subject)).await??;
        Ok(loaded.map_or(BaselineStatus::Missing, BaselineStatus::Exists))
    }
}

impl Inner {
    async fn run_test(
        &self,
        subject: Subject,
        _guard: OwnedMutexGuard<()>,
    ) -> VisperfResult<VisualTestResult> {
        info!(subject = %subject, "visual test started");

        let candidate = self.capture.capture(&subject).await?;

        let store = self.store.clone();
        let options = self.diff.clone();
        let logged = subject.clone();
        let result =
            tokio::task::spawn_blocking(move || classify(&store, &subject, candidate, &options))
                .await??;

        info!(
            subject = %logged,
            status = %result.status,
            mismatched = ?result.mismatched_pixels,
            "visual test finished"
        );
        Ok(result)
    }

    async fn accept(
        &self,
        subject: Subject,
        candidate: Vec<u8>,
        _guard: OwnedMutexGuard<()>,
    ) -> VisperfResult<VisualTestResult> {
        debug!(subject = %subject, bytes = candidate.len(), "accepting candidate");

        let store = self.store.clone();
        tokio::task::spawn_blocking(move || -> VisperfResult<()> {
            decode_png(&candidate)?;
            let stored = store.write(&subject, &candidate)?;
            store.remove_derived(&subject)?;
            info!(subject = %subject, digest = %stored.digest, "baseline accepted");
            Ok(())
        })
        .await??;

        Ok(VisualTestResult::accepted())
    }
}

/// Compare a fresh capture with the stored baseline and update the store
fn classify(
    store: &BaselineStore,
    subject: &Subject,
    candidate: Vec<u8>,
    options: &DiffOptions,
) -> VisperfResult<VisualTestResult> {
    let Some(baseline) = store.try_load(subject)? else {
        decode_png(&candidate)?;
        store.write(subject, &candidate)?;
        store.remove_derived(subject)?;
        info!(subject = %subject, "no baseline, candidate stored");
        return Ok(VisualTestResult::new_baseline(candidate));
    };

    let outcome = compare_png(&baseline, &candidate, options)?;
    match &outcome {
        &DiffOutcome::DimensionMismatch {
            baseline: stored_dims,
            candidate: captured_dims,
        } => {
            store.write(subject, &candidate)?;
            store.remove_derived(subject)?;
            info!(
                subject = %subject,
                baseline = ?stored_dims,
                candidate = ?captured_dims,
                "dimensions differ, baseline replaced"
            );
            Ok(VisualTestResult::dimensions_differ(
                candidate,
                baseline,
                stored_dims,
                captured_dims,
            ))
        }
        DiffOutcome::Match => {
            store.remove_derived(subject)?;
            Ok(VisualTestResult::matched())
        }
        &DiffOutcome::Mismatch { count, .. } => {
            let diff = encode_diff(&outcome)?.unwrap_or_default();
            store.write_diff(subject, &diff)?;
            Ok(VisualTestResult::mismatched(candidate, baseline, diff, count))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::capture::{CaptureConfig, CaptureFault, NavigationFailure, ScriptedLauncher};
    use crate::codec::tests::solid_png;
    use crate::codec::encode_png;
    use image::{Rgba, RgbaImage};
    use std::time::Duration;
    use tempfile::TempDir;

    const BLACK: [u8; 4] = [0, 0, 0, 255];
    const WHITE: [u8; 4] = [255, 255, 255, 255];

    fn orchestrator(launcher: &ScriptedLauncher) -> (TempDir, TestOrchestrator) {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::new()
            .with_baselines_dir(dir.path().join("baselines"))
            .with_capture(
                CaptureConfig::default()
                    .with_settle_delay(Duration::ZERO)
                    .with_retry_backoff(Duration::from_millis(5)),
            );
        let orch = TestOrchestrator::new(Arc::new(launcher.clone()), config).unwrap();
        (dir, orch)
    }

    fn subject() -> Subject {
        Subject::new("example-button--primary").unwrap()
    }

    fn one_white_pixel() -> Vec<u8> {
        let mut img = RgbaImage::from_pixel(10, 10, Rgba(BLACK));
        img.put_pixel(3, 7, Rgba(WHITE));
        encode_png(&img).unwrap()
    }

    #[tokio::test]
    async fn test_first_run_creates_baseline() {
        let png = solid_png(10, 10, BLACK);
        let launcher = ScriptedLauncher::new().then_capture(png.clone());
        let (_dir, orch) = orchestrator(&launcher);

        let result = orch.run_test(&subject()).await;
        assert_eq!(result.status, TestStatus::New);
        assert_eq!(result.candidate_image.as_deref(), Some(png.as_slice()));
        assert!(result.baseline_exists);
        assert!(orch.store().exists(&subject()));
        assert_eq!(orch.store().load(&subject()).unwrap(), png);
    }

    #[tokio::test]
    async fn test_identical_capture_succeeds() {
        let png = solid_png(10, 10, BLACK);
        let launcher = ScriptedLauncher::always(png);
        let (_dir, orch) = orchestrator(&launcher);

        assert_eq!(orch.run_test(&subject()).await.status, TestStatus::New);
        let second = orch.run_test(&subject()).await;
        assert_eq!(second.status, TestStatus::Success);
        assert_eq!(second.mismatched_pixels, Some(0));
        assert!(second.candidate_image.is_none());
        assert!(second.diff_image.is_none());
    }

    #[tokio::test]
    async fn test_pixel_mismatch_fails_with_diff() {
        let baseline = solid_png(10, 10, BLACK);
        let candidate = one_white_pixel();
        let launcher = ScriptedLauncher::new().then_capture(candidate.clone());
        let (_dir, orch) = orchestrator(&launcher);
        orch.store().write(&subject(), &baseline).unwrap();

        let result = orch.run_test(&subject()).await;
        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.mismatched_pixels, Some(1));
        assert_eq!(result.message, "1 pixels differ");
        assert_eq!(result.candidate_image.as_deref(), Some(candidate.as_slice()));
        assert_eq!(result.baseline_image.as_deref(), Some(baseline.as_slice()));
        let diff = result.diff_image.expect("diff image");
        assert_eq!(decode_png(&diff).unwrap().dimensions(), (10, 10));

        // Baseline untouched, artifact persisted
        assert_eq!(orch.store().load(&subject()).unwrap(), baseline);
        assert_eq!(std::fs::read(orch.store().diff_path(&subject())).unwrap(), diff);
    }

    #[tokio::test]
    async fn test_dimension_drift_replaces_baseline() {
        let baseline = solid_png(100, 50, BLACK);
        let candidate = solid_png(100, 60, BLACK);
        let launcher = ScriptedLauncher::new().then_capture(candidate.clone());
        let (_dir, orch) = orchestrator(&launcher);
        orch.store().write(&subject(), &baseline).unwrap();

        let result = orch.run_test(&subject()).await;
        assert_eq!(result.status, TestStatus::Failed);
        assert!(result.message.starts_with("dimensions differ"));
        assert!(result.diff_image.is_none());
        assert!(result.mismatched_pixels.is_none());
        assert_eq!(result.candidate_image.as_deref(), Some(candidate.as_slice()));
        assert_eq!(orch.store().load(&subject()).unwrap(), candidate);
    }

    #[tokio::test]
    async fn test_capture_failure_is_error_result() {
        let fault = CaptureFault::navigation(NavigationFailure::NameNotResolved, "no host");
        let launcher = ScriptedLauncher::new().then_fail(fault);
        let (_dir, orch) = orchestrator(&launcher);

        let result = orch.run_test(&subject()).await;
        assert_eq!(result.status, TestStatus::Error);
        assert!(result.message.starts_with("capture failed"));
        assert!(!result.baseline_exists);
        assert!(!orch.store().exists(&subject()));
    }

    #[tokio::test]
    async fn test_error_result_reports_stored_baseline() {
        let fault = CaptureFault::Screenshot {
            message: "target crashed".into(),
        };
        let launcher = ScriptedLauncher::new().then_fail(fault);
        let (_dir, orch) = orchestrator(&launcher);
        let baseline = solid_png(4, 4, BLACK);
        orch.store().write(&subject(), &baseline).unwrap();

        let result = orch.run_test(&subject()).await;
        assert_eq!(result.status, TestStatus::Error);
        assert!(result.baseline_exists);
        assert_eq!(orch.store().load(&subject()).unwrap(), baseline);
    }

    #[tokio::test]
    async fn test_undecodable_capture_leaves_store_empty() {
        let launcher = ScriptedLauncher::new().then_capture(b"not a png".to_vec());
        let (_dir, orch) = orchestrator(&launcher);

        let err = orch.try_run_test(&subject()).await.unwrap_err();
        assert!(matches!(err, VisperfError::DecodeError { .. }));
        assert!(!orch.store().exists(&subject()));
    }

    #[tokio::test]
    async fn test_accept_promotes_candidate_and_clears_diff() {
        let baseline = solid_png(10, 10, BLACK);
        let candidate = one_white_pixel();
        let launcher = ScriptedLauncher::new().then_capture(candidate.clone());
        let (_dir, orch) = orchestrator(&launcher);
        orch.store().write(&subject(), &baseline).unwrap();

        let failed = orch.run_test(&subject()).await;
        assert_eq!(failed.status, TestStatus::Failed);
        assert!(orch.store().diff_path(&subject()).exists());

        let accepted = orch
            .accept(&subject(), failed.candidate_image.unwrap())
            .await;
        assert_eq!(accepted.status, TestStatus::Success);
        assert_eq!(accepted.message, "baseline accepted");
        assert_eq!(orch.store().load(&subject()).unwrap(), candidate);
        assert!(!orch.store().diff_path(&subject()).exists());
    }

    #[tokio::test]
    async fn test_accept_is_idempotent() {
        let launcher = ScriptedLauncher::new();
        let (_dir, orch) = orchestrator(&launcher);
        let png = one_white_pixel();

        orch.try_accept(&subject(), png.clone()).await.unwrap();
        let digest = orch.store().digest(&subject()).unwrap();
        orch.try_accept(&subject(), png.clone()).await.unwrap();

        assert_eq!(orch.store().digest(&subject()).unwrap(), digest);
        assert_eq!(orch.store().list().unwrap(), vec![subject()]);
    }

    #[tokio::test]
    async fn test_accept_rejects_missing_or_invalid_candidate() {
        let launcher = ScriptedLauncher::new();
        let (_dir, orch) = orchestrator(&launcher);

        let err = orch.try_accept(&subject(), Vec::new()).await.unwrap_err();
        assert!(matches!(err, VisperfError::MissingCandidate { .. }));

        let err = orch
            .try_accept(&subject(), b"garbage".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, VisperfError::DecodeError { .. }));
        assert!(!orch.store().exists(&subject()));
    }

    #[tokio::test]
    async fn test_baseline_lookup() {
        let launcher = ScriptedLauncher::new();
        let (_dir, orch) = orchestrator(&launcher);
        assert_eq!(
            orch.baseline(&subject()).await.unwrap(),
            BaselineStatus::Missing
        );

        let png = solid_png(2, 2, WHITE);
        orch.store().write(&subject(), &png).unwrap();
        assert_eq!(
            orch.baseline(&subject()).await.unwrap(),
            BaselineStatus::Exists(png)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_same_subject_results_follow_request_order() {
        // Handlers run on worker threads, where a freshly spawned task may be
        // scheduled ahead of older ones; drive the requests from one too.
        for _ in 0..10 {
            let first = solid_png(4, 4, BLACK);
            let launcher = ScriptedLauncher::new()
                .then_capture(first.clone())
                .then_capture(solid_png(4, 4, WHITE))
                .with_step_delay(Duration::from_millis(5));
            let (_dir, orch) = orchestrator(&launcher);

            let s = subject();
            let worker = orch.clone();
            let (a, b) = tokio::spawn(async move {
                tokio::join!(worker.run_test(&s), worker.run_test(&s))
            })
            .await
            .unwrap();

            assert_eq!(a.status, TestStatus::New, "first request took the lock second");
            assert_eq!(b.status, TestStatus::Failed);
            assert_eq!(b.mismatched_pixels, Some(16));
            assert_eq!(orch.store().load(&subject()).unwrap(), first);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_accept_queued_behind_running_test() {
        let captured = solid_png(4, 4, BLACK);
        let accepted = solid_png(4, 4, WHITE);
        let launcher = ScriptedLauncher::new()
            .then_capture(captured)
            .with_step_delay(Duration::from_millis(5));
        let (_dir, orch) = orchestrator(&launcher);

        let s = subject();
        let worker = orch.clone();
        let candidate = accepted.clone();
        let (run, accept) = tokio::spawn(async move {
            tokio::join!(worker.run_test(&s), worker.accept(&s, candidate))
        })
        .await
        .unwrap();

        assert_eq!(run.status, TestStatus::New);
        assert_eq!(accept.status, TestStatus::Success);
        assert_eq!(orch.store().load(&subject()).unwrap(), accepted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_different_subjects_run_in_parallel() {
        let png = solid_png(4, 4, BLACK);
        let launcher = ScriptedLauncher::always(png).with_step_delay(Duration::from_millis(50));
        let (_dir, orch) = orchestrator(&launcher);
        let a = Subject::new("a").unwrap();
        let b = Subject::new("b").unwrap();

        let started = std::time::Instant::now();
        let (ra, rb) = tokio::join!(orch.run_test(&a), orch.run_test(&b));
        assert_eq!(ra.status, TestStatus::New);
        assert_eq!(rb.status, TestStatus::New);
        // Three delayed steps each; sequential execution would take >= 300ms.
        assert!(started.elapsed() < Duration::from_millis(290));
    }

    #[tokio::test]
    async fn test_abandoned_run_still_completes() {
        let png = solid_png(4, 4, BLACK);
        let launcher =
            ScriptedLauncher::new().then_capture(png).with_step_delay(Duration::from_millis(30));
        let (_dir, orch) = orchestrator(&launcher);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), orch.run_test(&subject())).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(orch.store().exists(&subject()));
        assert_eq!(launcher.closes(), 1);
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let launcher = ScriptedLauncher::always(solid_png(2, 2, BLACK));
        let (_dir, orch) = orchestrator(&launcher);
        for id in ["a", "b", "c"] {
            orch.run_test(&Subject::new(id).unwrap()).await;
        }
        // The next acquisition prunes every idle entry before adding its own.
        orch.run_test(&subject()).await;
        assert!(orch.inner.locks.tracked() <= 1);
    }
}

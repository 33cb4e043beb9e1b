//! Client view state for a single subject.
//!
//! A pure reducer: `(state, event) -> state`. The UI feeds it user actions and
//! orchestrator results; it never performs I/O. Run is disabled while a
//! request is in flight, Accept only while a candidate from a `new` or
//! `failed` result is on display.

use crate::orchestrator::{TestStatus, VisualTestResult};
use crate::subject::Subject;
use serde::{Deserialize, Serialize};

/// Displayed status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    /// Nothing requested yet
    #[default]
    Idle,
    /// Waiting for the orchestrator
    Running,
    /// Matched the baseline, or a candidate was accepted
    Success,
    /// Differed from the baseline
    Failed,
    /// First capture became the baseline
    New,
    /// Request failed
    Error,
}

impl From<TestStatus> for ClientStatus {
    fn from(status: TestStatus) -> Self {
        match status {
            TestStatus::Success => Self::Success,
            TestStatus::Failed => Self::Failed,
            TestStatus::New => Self::New,
            TestStatus::Error => Self::Error,
        }
    }
}

/// Which image the panel shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageView {
    /// Fresh capture
    Candidate,
    /// Difference visualisation
    Diff,
    /// Stored reference
    Baseline,
}

/// Request the client is waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Test,
    Accept,
}

/// Input to [`ClientViewState::reduce`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// User pressed Run
    RunRequested,
    /// User pressed Accept
    AcceptRequested,
    /// Orchestrator answered a request for `subject`
    ResultArrived {
        /// Subject the request was issued for
        subject: Subject,
        /// Orchestrator result
        result: VisualTestResult,
    },
    /// User switched the displayed image
    SelectImage(ImageView),
    /// User navigated to another subject
    SubjectChanged(Subject),
}

/// Per-subject UI state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientViewState {
    subject: Option<Subject>,
    status: ClientStatus,
    message: Option<String>,
    pending: Option<Pending>,
    candidate: Option<Vec<u8>>,
    diff: Option<Vec<u8>>,
    baseline: Option<Vec<u8>>,
    selected: Option<ImageView>,
    accepted: bool,
}

impl ClientViewState {
    /// Fresh idle state for `subject`
    #[must_use]
    pub fn new(subject: Subject) -> Self {
        Self {
            subject: Some(subject),
            ..Self::default()
        }
    }

    /// Apply one event
    #[must_use]
    pub fn reduce(self, event: ClientEvent) -> Self {
        match event {
            ClientEvent::RunRequested => self.on_run(),
            ClientEvent::AcceptRequested => self.on_accept(),
            ClientEvent::ResultArrived { subject, result } => self.on_result(&subject, result),
            ClientEvent::SelectImage(view) => self.on_select(view),
            ClientEvent::SubjectChanged(subject) => {
                if self.subject.as_ref() == Some(&subject) {
                    self
                } else {
                    Self::new(subject)
                }
            }
        }
    }

    fn on_run(self) -> Self {
        if !self.can_run() {
            return self;
        }
        Self {
            subject: self.subject,
            status: ClientStatus::Running,
            pending: Some(Pending::Test),
            ..Self::default()
        }
    }

    fn on_accept(mut self) -> Self {
        if !self.can_accept() {
            return self;
        }
        self.status = ClientStatus::Running;
        self.pending = Some(Pending::Accept);
        self.message = None;
        self
    }

    fn on_result(mut self, subject: &Subject, result: VisualTestResult) -> Self {
        // Results for another subject, or after the request was abandoned, are stale.
        if self.status != ClientStatus::Running || self.subject.as_ref() != Some(subject) {
            return self;
        }
        let pending = self.pending.take();
        self.status = result.status.into();
        self.message = Some(result.message);

        if pending == Some(Pending::Accept) {
            if result.status == TestStatus::Success {
                self.accepted = true;
                self.baseline = self.candidate.take();
                self.diff = None;
                self.selected = self.baseline.as_ref().map(|_| ImageView::Baseline);
            }
            return self;
        }

        self.candidate = result.candidate_image;
        self.diff = result.diff_image;
        self.baseline = result.baseline_image;
        self.selected = match result.status {
            TestStatus::New => self.candidate.as_ref().map(|_| ImageView::Candidate),
            TestStatus::Failed if self.diff.is_some() => Some(ImageView::Diff),
            TestStatus::Failed => self.candidate.as_ref().map(|_| ImageView::Candidate),
            TestStatus::Success | TestStatus::Error => None,
        };
        self
    }

    fn on_select(mut self, view: ImageView) -> Self {
        if self.image(view).is_some() {
            self.selected = Some(view);
        }
        self
    }

    /// Subject this state belongs to
    #[must_use]
    pub const fn subject(&self) -> Option<&Subject> {
        self.subject.as_ref()
    }

    /// Current status
    #[must_use]
    pub const fn status(&self) -> ClientStatus {
        self.status
    }

    /// Message from the last result
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Whether the last request was an accept that succeeded
    #[must_use]
    pub const fn accepted(&self) -> bool {
        self.accepted
    }

    /// Selected view
    #[must_use]
    pub const fn selected(&self) -> Option<ImageView> {
        self.selected
    }

    /// Image held for `view`
    #[must_use]
    pub fn image(&self, view: ImageView) -> Option<&[u8]> {
        match view {
            ImageView::Candidate => self.candidate.as_deref(),
            ImageView::Diff => self.diff.as_deref(),
            ImageView::Baseline => self.baseline.as_deref(),
        }
    }

    /// Image currently on display
    #[must_use]
    pub fn displayed_image(&self) -> Option<&[u8]> {
        self.selected.and_then(|view| self.image(view))
    }

    /// Whether Run is enabled
    #[must_use]
    pub fn can_run(&self) -> bool {
        self.subject.is_some() && self.status != ClientStatus::Running
    }

    /// Whether Accept is enabled
    #[must_use]
    pub fn can_accept(&self) -> bool {
        matches!(self.status, ClientStatus::New | ClientStatus::Failed) && self.candidate.is_some()
    }

    /// Subject and candidate to send with an accept request, when enabled
    #[must_use]
    pub fn accept_payload(&self) -> Option<(&Subject, &[u8])> {
        if !self.can_accept() {
            return None;
        }
        Some((self.subject.as_ref()?, self.candidate.as_deref()?))
    }
}

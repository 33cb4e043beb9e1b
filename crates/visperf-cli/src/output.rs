//! Result rendering and progress reporting

use crate::commands::ResultFormat;
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use visperf::{Subject, TestResponse, TestStatus, VisualTestResult};

/// Terminal reporter for one-shot commands
///
/// Results go to stdout; the spinner draws on stderr and only on a terminal.
#[derive(Debug)]
pub struct Reporter {
    term: Term,
    spinner: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(Term::stdout().is_term(), false)
    }
}

impl Reporter {
    /// Create a new reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stdout(),
            spinner: None,
            use_color,
            quiet,
        }
    }

    /// Show a spinner until [`finish`](Self::finish)
    pub fn start_spinner(&mut self, message: &str) {
        if self.quiet {
            return;
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    /// Clear the spinner
    pub fn finish(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    /// Print a line to stdout
    pub fn line(&self, message: &str) {
        let _ = self.term.write_line(message);
    }

    /// Print an informational line unless quiet
    pub fn info(&self, message: &str) {
        if !self.quiet {
            self.line(message);
        }
    }

    /// Print a test result
    pub fn result(&self, subject: &Subject, result: &VisualTestResult, format: ResultFormat) {
        // Failures are always shown, even in quiet mode
        if self.quiet && result.status == TestStatus::Success && format == ResultFormat::Text {
            return;
        }
        self.line(&format_result(subject, result, format, self.use_color));
    }
}

/// Render a result as text or wire JSON
#[must_use]
pub fn format_result(
    subject: &Subject,
    result: &VisualTestResult,
    format: ResultFormat,
    use_color: bool,
) -> String {
    match format {
        ResultFormat::Json => serde_json::to_string_pretty(&TestResponse::from(result))
            .unwrap_or_else(|e| format!("{{\"status\":\"error\",\"message\":\"{e}\"}}")),
        ResultFormat::Text => {
            let label = status_label(result.status, use_color);
            let mut text = format!("{label} {subject}: {}", result.message);
            if let Some(count) = result.mismatched_pixels.filter(|&n| n > 0) {
                text.push_str(&format!(" [{count} px]"));
            }
            text
        }
    }
}

fn status_label(status: TestStatus, use_color: bool) -> String {
    let plain = match status {
        TestStatus::Success => "PASS",
        TestStatus::Failed => "FAIL",
        TestStatus::New => "NEW ",
        TestStatus::Error => "ERR ",
    };
    if !use_color {
        return plain.to_string();
    }
    let styled = style(plain).bold();
    match status {
        TestStatus::Success => styled.green(),
        TestStatus::Failed => styled.red(),
        TestStatus::New => styled.cyan(),
        TestStatus::Error => styled.yellow(),
    }
    .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn result(status: TestStatus, mismatched: Option<u64>) -> VisualTestResult {
        VisualTestResult {
            status,
            message: "msg".to_string(),
            candidate_image: None,
            diff_image: None,
            baseline_image: None,
            baseline_exists: true,
            mismatched_pixels: mismatched,
        }
    }

    #[test]
    fn test_text_format() {
        let subject = Subject::new("card").unwrap();
        assert_eq!(
            format_result(&subject, &result(TestStatus::Success, Some(0)), ResultFormat::Text, false),
            "PASS card: msg"
        );
        assert_eq!(
            format_result(&subject, &result(TestStatus::Failed, Some(12)), ResultFormat::Text, false),
            "FAIL card: msg [12 px]"
        );
    }

    #[test]
    fn test_json_format_is_wire_response() {
        let subject = Subject::new("card").unwrap();
        let text = format_result(&subject, &result(TestStatus::New, None), ResultFormat::Json, false);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["status"], "new");
        assert_eq!(value["baselineExists"], true);
    }

    #[test]
    fn test_quiet_reporter_has_no_spinner() {
        let mut reporter = Reporter::new(false, true);
        reporter.start_spinner("capturing");
        assert!(reporter.spinner.is_none());
        reporter.finish();
    }
}

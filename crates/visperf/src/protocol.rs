//! JSON wire format of the HTTP API.
//!
//! Images travel as `data:image/png;base64,` URIs. Field names are camelCase;
//! `storyId` and `newImage` are accepted as aliases for the panel that
//! predates the generic names.

use crate::codec::{from_data_uri, to_data_uri};
use crate::orchestrator::{BaselineStatus, TestStatus, VisualTestResult};
use crate::result::{VisperfError, VisperfResult};
use crate::subject::Subject;
use serde::{Deserialize, Serialize};

/// Path prefix the API is mounted under
pub const API_BASE_PATH: &str = "/__visual_perfect_api__";

/// Body of `POST /test`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRequest {
    /// Subject to capture
    #[serde(alias = "storyId", default)]
    pub subject: String,
}

impl TestRequest {
    /// Validated subject
    ///
    /// # Errors
    ///
    /// Returns `InvalidSubject` if the identifier is missing or unsafe
    pub fn subject(&self) -> VisperfResult<Subject> {
        Subject::new(self.subject.as_str())
    }
}

/// Body of `POST /accept`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptRequest {
    /// Subject whose baseline is replaced
    #[serde(alias = "storyId", default)]
    pub subject: String,
    /// Candidate PNG as data URI or bare base64
    #[serde(alias = "newImage", default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}

impl AcceptRequest {
    /// Build a request carrying `png`
    #[must_use]
    pub fn new(subject: &Subject, png: &[u8]) -> Self {
        Self {
            subject: subject.to_string(),
            image_base64: Some(to_data_uri(png)),
        }
    }

    /// Validated subject
    ///
    /// # Errors
    ///
    /// Returns `InvalidSubject` if the identifier is missing or unsafe
    pub fn subject(&self) -> VisperfResult<Subject> {
        Subject::new(self.subject.as_str())
    }

    /// Decoded candidate bytes
    ///
    /// # Errors
    ///
    /// Returns `MissingCandidate` when no image was sent, `DecodeError` when
    /// the payload is not base64
    pub fn candidate(&self) -> VisperfResult<Vec<u8>> {
        let missing = || VisperfError::MissingCandidate {
            subject: self.subject.clone(),
        };
        let payload = self
            .image_base64
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(missing)?;
        let bytes = from_data_uri(payload)?;
        if bytes.is_empty() {
            return Err(missing());
        }
        Ok(bytes)
    }
}

/// Response of `POST /test`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResponse {
    /// Classification
    pub status: TestStatus,
    /// Human-readable summary
    pub message: String,
    /// Fresh capture
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_image: Option<String>,
    /// Difference visualisation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_image: Option<String>,
    /// Baseline compared against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_image: Option<String>,
    /// Whether a baseline is stored after the request
    #[serde(default)]
    pub baseline_exists: bool,
    /// Differing pixel count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mismatched_pixels: Option<u64>,
}

impl From<&VisualTestResult> for TestResponse {
    fn from(result: &VisualTestResult) -> Self {
        Self {
            status: result.status,
            message: result.message.clone(),
            candidate_image: result.candidate_image.as_deref().map(to_data_uri),
            diff_image: result.diff_image.as_deref().map(to_data_uri),
            baseline_image: result.baseline_image.as_deref().map(to_data_uri),
            baseline_exists: result.baseline_exists,
            mismatched_pixels: result.mismatched_pixels,
        }
    }
}

impl TryFrom<TestResponse> for VisualTestResult {
    type Error = VisperfError;

    fn try_from(response: TestResponse) -> Result<Self, Self::Error> {
        let decode = |image: Option<String>| image.as_deref().map(from_data_uri).transpose();
        Ok(Self {
            status: response.status,
            message: response.message,
            candidate_image: decode(response.candidate_image)?,
            diff_image: decode(response.diff_image)?,
            baseline_image: decode(response.baseline_image)?,
            baseline_exists: response.baseline_exists,
            mismatched_pixels: response.mismatched_pixels,
        })
    }
}

/// Response of `POST /accept`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptResponse {
    /// Always `success` on a 2xx response
    pub status: TestStatus,
    /// Human-readable summary
    pub message: String,
}

impl From<&VisualTestResult> for AcceptResponse {
    fn from(result: &VisualTestResult) -> Self {
        Self {
            status: result.status,
            message: result.message.clone(),
        }
    }
}

/// Baseline presence on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineState {
    /// A baseline is stored
    BaselineExists,
    /// Nothing stored
    NoBaseline,
}

/// Response of `GET /baseline/{subject}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineResponse {
    /// Presence
    pub status: BaselineState,
    /// Stored image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_image: Option<String>,
}

impl From<BaselineStatus> for BaselineResponse {
    fn from(status: BaselineStatus) -> Self {
        match status {
            BaselineStatus::Exists(png) => Self {
                status: BaselineState::BaselineExists,
                baseline_image: Some(to_data_uri(&png)),
            },
            BaselineStatus::Missing => Self {
                status: BaselineState::NoBaseline,
                baseline_image: None,
            },
        }
    }
}

/// Body of every non-2xx response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `error`
    pub status: TestStatus,
    /// What went wrong
    pub message: String,
}

impl ErrorResponse {
    /// Create an error body
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: TestStatus::Error,
            message: message.into(),
        }
    }
}

/// Response of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `ok`
    pub status: String,
    /// Server version
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_accepts_story_id_alias() {
        let req: TestRequest = serde_json::from_value(json!({"storyId": "button--primary"})).unwrap();
        assert_eq!(req.subject().unwrap().as_str(), "button--primary");

        let req: TestRequest = serde_json::from_value(json!({"subject": "card"})).unwrap();
        assert_eq!(req.subject, "card");
    }

    #[test]
    fn test_request_missing_subject_is_invalid() {
        let req: TestRequest = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(
            req.subject(),
            Err(VisperfError::InvalidSubject { .. })
        ));

        let req: TestRequest = serde_json::from_value(json!({"subject": "../etc"})).unwrap();
        assert!(req.subject().is_err());
    }

    #[test]
    fn test_accept_request_decodes_data_uri_and_bare_base64() {
        let req: AcceptRequest = serde_json::from_value(json!({
            "subject": "card",
            "imageBase64": "data:image/png;base64,AQID"
        }))
        .unwrap();
        assert_eq!(req.candidate().unwrap(), vec![1, 2, 3]);

        let req: AcceptRequest =
            serde_json::from_value(json!({"storyId": "card", "newImage": "AQID"})).unwrap();
        assert_eq!(req.subject().unwrap().as_str(), "card");
        assert_eq!(req.candidate().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_accept_request_missing_image() {
        for body in [
            json!({"subject": "card"}),
            json!({"subject": "card", "imageBase64": ""}),
            json!({"subject": "card", "imageBase64": "data:image/png;base64,"}),
        ] {
            let req: AcceptRequest = serde_json::from_value(body).unwrap();
            assert!(matches!(
                req.candidate(),
                Err(VisperfError::MissingCandidate { .. })
            ));
        }
    }

    #[test]
    fn test_accept_request_bad_base64() {
        let req = AcceptRequest {
            subject: "card".to_string(),
            image_base64: Some("***".to_string()),
        };
        assert!(matches!(
            req.candidate(),
            Err(VisperfError::DecodeError { .. })
        ));
    }

    #[test]
    fn test_test_response_shape() {
        let result = VisualTestResult {
            status: TestStatus::Failed,
            message: "1 pixels differ".to_string(),
            candidate_image: Some(vec![1, 2, 3]),
            diff_image: Some(vec![4]),
            baseline_image: None,
            baseline_exists: true,
            mismatched_pixels: Some(1),
        };
        let value = serde_json::to_value(TestResponse::from(&result)).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "failed",
                "message": "1 pixels differ",
                "candidateImage": "data:image/png;base64,AQID",
                "diffImage": "data:image/png;base64,BA==",
                "baselineExists": true,
                "mismatchedPixels": 1
            })
        );

        let back: TestResponse = serde_json::from_value(value).unwrap();
        assert_eq!(VisualTestResult::try_from(back).unwrap(), result);
    }

    #[test]
    fn test_baseline_response_shape() {
        let value = serde_json::to_value(BaselineResponse::from(BaselineStatus::Missing)).unwrap();
        assert_eq!(value, json!({"status": "no_baseline"}));

        let value =
            serde_json::to_value(BaselineResponse::from(BaselineStatus::Exists(vec![1, 2, 3])))
                .unwrap();
        assert_eq!(value["status"], "baseline_exists");
        assert_eq!(value["baselineImage"], "data:image/png;base64,AQID");
    }

    #[test]
    fn test_error_response_shape() {
        let value = serde_json::to_value(ErrorResponse::new("boom")).unwrap();
        assert_eq!(value, json!({"status": "error", "message": "boom"}));
    }
}

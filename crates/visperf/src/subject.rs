//! Subject identifiers.
//!
//! A subject names the visual unit under test (for Storybook, a story id such
//! as `example-button--primary`). The identifier doubles as the file key in the
//! baseline store, so construction rejects anything that could escape the
//! store directory or collide with a derived artifact.

use crate::result::{VisperfError, VisperfResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest identifier accepted, in bytes
pub const MAX_SUBJECT_LEN: usize = 200;

/// Suffix reserved for the persisted diff artifact
pub(crate) const DERIVED_SUFFIX: &str = ".diff";

/// Validated subject identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subject(String);

impl Subject {
    /// Validate and wrap an identifier
    ///
    /// # Errors
    ///
    /// Returns `InvalidSubject` if the identifier is empty, too long, contains
    /// characters outside `[A-Za-z0-9._-]`, starts with a dot, contains `..`,
    /// or ends with the reserved `.diff` suffix.
    pub fn new(raw: impl Into<String>) -> VisperfResult<Self> {
        let raw = raw.into();
        if let Some(reason) = rejection_reason(&raw) {
            return Err(VisperfError::InvalidSubject {
                subject: raw,
                reason,
            });
        }
        Ok(Self(raw))
    }

    /// Borrow the identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn rejection_reason(raw: &str) -> Option<&'static str> {
    if raw.is_empty() {
        return Some("identifier is empty");
    }
    if raw.len() > MAX_SUBJECT_LEN {
        return Some("identifier is longer than 200 bytes");
    }
    if !raw
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
    {
        return Some("only ASCII letters, digits, '-', '_' and '.' are allowed");
    }
    if raw.starts_with('.') {
        return Some("identifier must not start with '.'");
    }
    if raw.contains("..") {
        return Some("identifier must not contain '..'");
    }
    if raw.ends_with(DERIVED_SUFFIX) {
        return Some("the '.diff' suffix is reserved");
    }
    None
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Subject {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Subject {
    type Error = VisperfError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Subject {
    type Error = VisperfError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Subject> for String {
    fn from(subject: Subject) -> Self {
        subject.0
    }
}

impl std::str::FromStr for Subject {
    type Err = VisperfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

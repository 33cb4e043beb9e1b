//! Engine configuration.

use crate::capture::CaptureConfig;
use crate::diff::DiffOptions;
use crate::store::DEFAULT_BASELINES_DIR;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the whole engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding baseline images
    pub baselines_dir: PathBuf,
    /// Browser capture settings
    pub capture: CaptureConfig,
    /// Pixel comparison settings
    pub diff: DiffOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            baselines_dir: PathBuf::from(DEFAULT_BASELINES_DIR),
            capture: CaptureConfig::default(),
            diff: DiffOptions::default(),
        }
    }
}

impl EngineConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the baselines directory
    #[must_use]
    pub fn with_baselines_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.baselines_dir = dir.into();
        self
    }

    /// Set capture settings
    #[must_use]
    pub fn with_capture(mut self, capture: CaptureConfig) -> Self {
        self.capture = capture;
        self
    }

    /// Set comparison settings
    #[must_use]
    pub fn with_diff(mut self, diff: DiffOptions) -> Self {
        self.diff = diff;
        self
    }
}

/// Serde adapter storing a `Duration` as integer milliseconds
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

//! Recorder configuration

use crate::encode::ContainerFormat;
use crate::recorder::error::{RecordingError, RecordingResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default fragment length: a kill loses at most this much footage
pub const DEFAULT_FRAGMENT_DURATION: Duration = Duration::from_secs(5 * 60);

pub const DEFAULT_LOCK_SUFFIX: &str = ".lock";

/// Output layout options, fixed before `open`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecorderOptions {
    /// Serialized as whole milliseconds
    #[serde(with = "duration_millis")]
    pub fragment_duration: Duration,
    pub container: ContainerFormat,
    pub lock_suffix: String,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            fragment_duration: DEFAULT_FRAGMENT_DURATION,
            container: ContainerFormat::default(),
            lock_suffix: DEFAULT_LOCK_SUFFIX.to_string(),
        }
    }
}

impl RecorderOptions {
    /// Read options from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> RecordingResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let options: Self = serde_json::from_str(&content).map_err(|e| {
            RecordingError::Configuration(format!("Failed to parse {:?}: {}", path, e))
        })?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> RecordingResult<()> {
        if self.fragment_duration.is_zero() {
            return Err(RecordingError::Configuration(
                "Fragment duration must be positive".to_string(),
            ));
        }
        if self.lock_suffix.is_empty() {
            return Err(RecordingError::Configuration(
                "Lock suffix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// `Duration` as whole milliseconds, shared by every config type
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

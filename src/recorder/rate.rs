//! Exact frame intervals
//!
//! A recording runs on two time bases: how often the source is sampled
//! (capture rate) and the spacing stamped into the output (output rate).
//! Both are kept as integer rationals so that pacing over a long recording
//! never accumulates floating point error.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// "One frame every `numerator / denominator` seconds"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRate")]
pub struct Rate {
    numerator: u32,
    denominator: u32,
}

/// Unchecked wire form of [`Rate`]
#[derive(Deserialize)]
struct RawRate {
    numerator: u32,
    denominator: u32,
}

impl TryFrom<RawRate> for Rate {
    type Error = String;

    fn try_from(raw: RawRate) -> Result<Self, Self::Error> {
        Rate::new(raw.numerator, raw.denominator).ok_or_else(|| {
            format!(
                "Rate {}/{} must have non-zero terms",
                raw.numerator, raw.denominator
            )
        })
    }
}

impl Rate {
    pub fn new(numerator: u32, denominator: u32) -> Option<Self> {
        if numerator == 0 || denominator == 0 {
            return None;
        }
        Some(Self {
            numerator,
            denominator,
        })
    }

    /// `frames` evenly spaced frames per second
    pub fn per_second(frames: u32) -> Option<Self> {
        Self::new(1, frames)
    }

    pub fn numerator(&self) -> u32 {
        self.numerator
    }

    pub fn denominator(&self) -> u32 {
        self.denominator
    }

    /// The output rate for a given speed-up: same frames, `factor` times closer together
    pub fn sped_up(&self, factor: u32) -> Option<Self> {
        Self::new(self.numerator, self.denominator.checked_mul(factor)?)
    }

    pub fn frames_per_second(&self) -> f64 {
        f64::from(self.denominator) / f64::from(self.numerator)
    }

    /// Frame interval in whole nanoseconds (rounded down)
    pub fn interval_nanos(&self) -> u64 {
        (u128::from(self.numerator) * NANOS_PER_SEC / u128::from(self.denominator)) as u64
    }

    /// Number of whole frames that fit in `duration`
    pub fn frames_in(&self, duration: Duration) -> u64 {
        let frames = duration.as_nanos() * u128::from(self.denominator)
            / (u128::from(self.numerator) * NANOS_PER_SEC);
        u64::try_from(frames).unwrap_or(u64::MAX)
    }

    /// Frame rate in ffmpeg's `num/den` notation
    pub fn ffmpeg_frame_rate(&self) -> String {
        format!("{}/{}", self.denominator, self.numerator)
    }
}

impl std::fmt::Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

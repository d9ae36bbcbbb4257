//! Standard output resolutions
//!
//! Picks the largest well-known resolution for an aspect ratio that stays
//! within a quality tier's pixel budget.

use serde::{Deserialize, Serialize};

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageResolution {
    pub width: u32,
    pub height: u32,
}

impl ImageResolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

impl std::fmt::Display for ImageResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Coarse quality tier, each with a maximum pixel budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityHint {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityHint {
    pub fn max_pixels(self) -> u64 {
        match self {
            QualityHint::Low => 1_024_000,
            QualityHint::Medium => 1_296_000,
            QualityHint::High => 1_764_000,
        }
    }
}

/// Aspect ratios are matched within this tolerance
const RATIO_TOLERANCE: f64 = 0.1;

const fn res(width: u32, height: u32) -> ImageResolution {
    ImageResolution::new(width, height)
}

const R4_3: &[ImageResolution] = &[
    res(640, 480),
    res(800, 600),
    res(960, 720),
    res(1024, 768),
    res(1280, 960),
    res(1400, 1050),
    res(1440, 1080),
    res(1600, 1200),
    res(1856, 1392),
    res(1920, 1440),
    res(2048, 1536),
];

const R16_10: &[ImageResolution] = &[
    res(1280, 800),
    res(1440, 900),
    res(1680, 1050),
    res(1920, 1200),
    res(2560, 1600),
];

const R16_9: &[ImageResolution] = &[
    res(1024, 576),
    res(1152, 648),
    res(1280, 720),
    res(1366, 768),
    res(1600, 900),
    res(1920, 1080),
    res(2560, 1440),
    res(3840, 2160),
];

const FAMILIES: &[(f64, &[ImageResolution])] = &[
    (4.0 / 3.0, R4_3),
    (16.0 / 10.0, R16_10),
    (16.0 / 9.0, R16_9),
];

fn family_for(ratio: f64) -> Option<&'static [ImageResolution]> {
    FAMILIES
        .iter()
        .find(|(family_ratio, _)| (family_ratio - ratio).abs() < RATIO_TOLERANCE)
        .map(|(_, resolutions)| *resolutions)
}

/// Whether any standard resolution family matches `ratio`
pub fn can_support(ratio: f64) -> bool {
    family_for(ratio).is_some()
}

/// Largest standard resolution for `ratio` within the tier's budget
pub fn max_resolution_for(ratio: f64, hint: QualityHint) -> Option<ImageResolution> {
    family_for(ratio)?
        .iter()
        .filter(|r| r.pixel_count() <= hint.max_pixels())
        .max_by_key(|r| r.pixel_count())
        .copied()
}

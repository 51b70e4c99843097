//! Blocking-signal detection.
//!
//! Classifies raw search-engine responses into the handful of signals the
//! orchestrator reacts to. Marker patterns are configurable because they are
//! adversarial-tuning parameters, not architecture.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// Classification of a raw response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockSignal {
    Ok,
    Captcha,
    RateLimited,
    UnknownError,
}

/// Marker strings observed on challenge interstitials. A body matching any of
/// them is treated as a CAPTCHA wall regardless of status code.
pub static DEFAULT_CAPTCHA_MARKERS: &[&str] = &[
    r"unusual traffic",
    r"\brecaptcha\b",
    r"g-recaptcha",
    r"captcha-(?:box|container)",
    r#"<iframe[^>]*src="[^"]*captcha"#,
    r#"<script[^>]*src="[^"]*(?:recaptcha|captcha)"#,
    r"human verification",
    r"security check",
    r"automated queries",
    r"\bnot a robot\b",
];

static DEFAULT_MARKER_REGEXES: Lazy<Vec<Regex>> = Lazy::new(|| {
    DEFAULT_CAPTCHA_MARKERS
        .iter()
        .map(|pattern| build_marker(pattern).expect("invalid default captcha marker"))
        .collect()
});

/// Pure classifier over `(status, body)` pairs.
#[derive(Debug, Clone)]
pub struct BlockingDetector {
    markers: Vec<Regex>,
}

impl BlockingDetector {
    /// Detector with the default marker set.
    pub fn new() -> Self {
        Self {
            markers: DEFAULT_MARKER_REGEXES.clone(),
        }
    }

    /// Detector with a custom marker set. Patterns are compiled
    /// case-insensitive with `.` matching newlines.
    pub fn with_markers<I, S>(markers: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let markers = markers
            .into_iter()
            .map(|pattern| build_marker(pattern.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { markers })
    }

    /// Classify a response. Total and deterministic: every `(status, body)`
    /// pair maps to exactly one signal.
    ///
    /// Priority order: rate-limit statuses win over body markers, body
    /// markers win over generic HTTP errors.
    pub fn classify(&self, status: u16, body: &str) -> BlockSignal {
        if matches!(status, 429 | 503) {
            return BlockSignal::RateLimited;
        }
        if self.markers.iter().any(|marker| marker.is_match(body)) {
            return BlockSignal::Captcha;
        }
        if status >= 400 {
            return BlockSignal::UnknownError;
        }
        BlockSignal::Ok
    }
}

impl Default for BlockingDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn build_marker(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
}

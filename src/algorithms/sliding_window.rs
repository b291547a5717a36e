//! Sliding window arithmetic
//!
//! A window of width `w` evaluated at `now` covers `[now - w, now]`,
//! inclusive at both ends, in epoch milliseconds.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidingWindow {
    #[serde(with = "humantime_serde")]
    pub width: Duration,
}

/// Inclusive millisecond range counted for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub start: u64,
    pub end: u64,
}

impl SlidingWindow {
    pub fn new(width: Duration) -> Self {
        Self { width }
    }

    pub fn from_millis(width_millis: u64) -> Self {
        Self::new(Duration::from_millis(width_millis))
    }

    pub fn width_millis(&self) -> u64 {
        self.width.as_millis() as u64
    }

    /// The window ending at `now`.
    pub fn bounds(&self, now: u64) -> WindowBounds {
        WindowBounds {
            start: now.saturating_sub(self.width_millis()),
            end: now,
        }
    }
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_are_inclusive() {
        let window = SlidingWindow::from_millis(60_000);
        let bounds = window.bounds(100_000);

        assert_eq!(bounds, WindowBounds { start: 40_000, end: 100_000 });
        assert_eq!(bounds.end - bounds.start, window.width_millis());
    }

    #[test]
    fn test_bounds_saturate_near_epoch() {
        let bounds = SlidingWindow::from_millis(60_000).bounds(10);
        assert_eq!(bounds.start, 0);
    }

    #[test]
    fn test_humantime_serialization() {
        let window = SlidingWindow::from_millis(90_000);
        let json = serde_json::to_value(window).unwrap();
        assert_eq!(json["width"], "1m 30s");

        let parsed: SlidingWindow = serde_json::from_str(r#"{"width":"2m"}"#).unwrap();
        assert_eq!(parsed.width_millis(), 120_000);
    }
}

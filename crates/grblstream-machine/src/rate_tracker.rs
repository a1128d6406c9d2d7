//! Feed and spindle override tracking
//!
//! The controller applies overrides as a percentage of the programmed rate.
//! A tracker follows the programmed (base) rate as gcode is streamed and the
//! override percentage as it is stepped, so the current effective rate can be
//! reported without asking the controller.

use grblstream_core::RateSnapshot;

/// Limits and step size for one override class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateTrackerConfig {
    /// Lowest allowed override percentage
    pub minimum_override: u32,
    /// Highest allowed override percentage
    pub maximum_override: u32,
    /// Step applied by increase/decrease
    pub override_increment: u32,
}

impl Default for RateTrackerConfig {
    fn default() -> Self {
        Self {
            minimum_override: 10,
            maximum_override: 200,
            override_increment: 10,
        }
    }
}

/// Tracks one override class
#[derive(Debug, Clone)]
pub struct RateTracker {
    config: RateTrackerConfig,
    percentage: u32,
    base_rate: Option<f64>,
    unit: Option<String>,
}

impl RateTracker {
    /// Create a tracker at 100% with no base rate
    pub fn new(config: RateTrackerConfig) -> Self {
        Self {
            config,
            percentage: 100,
            base_rate: None,
            unit: None,
        }
    }

    /// Record the programmed rate. Returns true if the rate or unit changed.
    pub fn set_base_rate(&mut self, rate: f64, unit: &str) -> bool {
        let changed = self.base_rate != Some(rate) || self.unit.as_deref() != Some(unit);
        self.base_rate = Some(rate);
        self.unit = Some(unit.to_string());
        changed
    }

    /// Step the override up, clamped to the maximum
    pub fn increase_rate(&mut self) {
        self.percentage = self
            .percentage
            .saturating_add(self.config.override_increment)
            .min(self.config.maximum_override);
    }

    /// Step the override down, clamped to the minimum
    pub fn decrease_rate(&mut self) {
        self.percentage = self
            .percentage
            .saturating_sub(self.config.override_increment)
            .max(self.config.minimum_override);
    }

    /// Return the override to 100%. The base rate is kept.
    pub fn reset(&mut self) {
        self.percentage = 100;
    }

    /// Current override percentage
    pub fn current_percentage(&self) -> u32 {
        self.percentage
    }

    /// Base rate scaled by the override, if a base rate is known
    pub fn current_rate(&self) -> Option<f64> {
        self.base_rate
            .map(|rate| rate * f64::from(self.percentage) / 100.0)
    }

    /// Unit of the base rate
    pub fn current_rate_unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// Snapshot for reporting
    pub fn snapshot(&self) -> RateSnapshot {
        RateSnapshot {
            percentage: self.percentage,
            value: self.current_rate(),
            unit: self.unit.clone(),
        }
    }
}

impl Default for RateTracker {
    fn default() -> Self {
        Self::new(RateTrackerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_clamped() {
        let mut tracker = RateTracker::default();
        for _ in 0..20 {
            tracker.increase_rate();
        }
        assert_eq!(tracker.current_percentage(), 200);

        for _ in 0..30 {
            tracker.decrease_rate();
        }
        assert_eq!(tracker.current_percentage(), 10);

        tracker.reset();
        assert_eq!(tracker.current_percentage(), 100);
    }

    #[test]
    fn test_current_rate_scales_base() {
        let mut tracker = RateTracker::default();
        assert_eq!(tracker.current_rate(), None);

        assert!(tracker.set_base_rate(500.0, "mm/min"));
        tracker.increase_rate();
        assert_eq!(tracker.current_rate(), Some(550.0));
        assert_eq!(tracker.current_rate_unit(), Some("mm/min"));
    }

    #[test]
    fn test_set_base_rate_reports_changes_only() {
        let mut tracker = RateTracker::default();
        assert!(tracker.set_base_rate(1000.0, "RPM"));
        assert!(!tracker.set_base_rate(1000.0, "RPM"));
        assert!(tracker.set_base_rate(1200.0, "RPM"));
    }

    #[test]
    fn test_reset_keeps_base_rate() {
        let mut tracker = RateTracker::default();
        tracker.set_base_rate(20.0, "in/min");
        tracker.decrease_rate();
        tracker.reset();

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.percentage, 100);
        assert_eq!(snapshot.value, Some(20.0));
        assert_eq!(snapshot.unit.as_deref(), Some("in/min"));
    }
}

//! Provider health tracking.
//!
//! Each provider moves through a small state machine driven by consecutive
//! call outcomes:
//!
//! ```text
//!            3 failures            3 more failures
//!  Healthy ─────────────▶ Degraded ───────────────▶ Unavailable
//!     ▲                      │  ▲                        │
//!     └──── 2 successes ─────┘  └────── 1 success ───────┘
//! ```
//!
//! Unavailable providers are not excluded forever: one probe attempt is
//! admitted per probe interval.

use std::fmt;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::HealthConfig;

/// Health state of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    #[default]
    Healthy,
    Degraded,
    Unavailable,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether the router may call a provider right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Call normally, with retries.
    Normal,
    /// Unavailable, but a probe is due: one attempt, no retries.
    Probe,
    /// Unavailable and probed recently.
    Skip,
}

/// Point-in-time view of one provider's health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

#[derive(Debug)]
struct HealthRecord {
    state: HealthState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_probe: Option<Instant>,
}

impl HealthRecord {
    fn new() -> Self {
        HealthRecord {
            state: HealthState::Healthy,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_probe: None,
        }
    }

    fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
        }
    }

    fn record_failure(&mut self, config: &HealthConfig) -> HealthState {
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;

        match self.state {
            HealthState::Healthy if self.consecutive_failures >= config.degraded_after => {
                self.state = HealthState::Degraded;
                self.consecutive_failures = 0;
            }
            HealthState::Degraded if self.consecutive_failures >= config.unavailable_after => {
                self.state = HealthState::Unavailable;
                self.consecutive_failures = 0;
                self.last_probe = Some(Instant::now());
            }
            HealthState::Unavailable => {
                self.last_probe = Some(Instant::now());
            }
            _ => {}
        }
        self.state
    }

    fn record_success(&mut self, config: &HealthConfig) -> HealthState {
        self.consecutive_failures = 0;
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);

        match self.state {
            HealthState::Healthy => {}
            HealthState::Degraded | HealthState::Unavailable => {
                if self.consecutive_successes >= config.recovery_successes {
                    self.state = HealthState::Healthy;
                    self.consecutive_successes = 0;
                } else {
                    self.state = HealthState::Degraded;
                }
            }
        }
        self.state
    }

    fn admit(&mut self, config: &HealthConfig) -> Admission {
        match self.state {
            HealthState::Healthy | HealthState::Degraded => Admission::Normal,
            HealthState::Unavailable => {
                let now = Instant::now();
                let due = self
                    .last_probe
                    .is_none_or(|last| now.duration_since(last) >= config.probe_interval());
                if due {
                    self.last_probe = Some(now);
                    Admission::Probe
                } else {
                    Admission::Skip
                }
            }
        }
    }
}

/// Tracks health per provider name.
pub struct ProviderHealthTracker {
    config: HealthConfig,
    records: DashMap<String, parking_lot::Mutex<HealthRecord>>,
}

impl ProviderHealthTracker {
    pub fn new(config: HealthConfig) -> Self {
        ProviderHealthTracker {
            config,
            records: DashMap::new(),
        }
    }

    /// Start tracking a provider (Healthy).
    pub fn register(&self, name: &str) {
        self.records
            .entry(name.to_string())
            .or_insert_with(|| parking_lot::Mutex::new(HealthRecord::new()));
    }

    /// Record a successful call. Returns the resulting state.
    pub fn record_success(&self, name: &str) -> HealthState {
        self.update(name, |record, config| record.record_success(config))
    }

    /// Record a failed call. Returns the resulting state.
    pub fn record_failure(&self, name: &str) -> HealthState {
        self.update(name, |record, config| record.record_failure(config))
    }

    fn update(
        &self,
        name: &str,
        apply: impl FnOnce(&mut HealthRecord, &HealthConfig) -> HealthState,
    ) -> HealthState {
        self.register(name);
        let Some(entry) = self.records.get(name) else {
            return HealthState::Healthy;
        };
        let mut record = entry.value().lock();
        let before = record.state;
        let after = apply(&mut record, &self.config);
        drop(record);

        if before != after {
            match after {
                HealthState::Healthy => {
                    tracing::info!(provider = name, from = %before, to = %after, "provider recovered");
                }
                _ => {
                    tracing::warn!(provider = name, from = %before, to = %after, "provider health changed");
                }
            }
        }
        after
    }

    /// Current state (unknown providers are Healthy).
    pub fn state(&self, name: &str) -> HealthState {
        self.records
            .get(name)
            .map(|entry| entry.value().lock().state)
            .unwrap_or_default()
    }

    pub fn snapshot(&self, name: &str) -> Option<HealthSnapshot> {
        self.records.get(name).map(|entry| entry.value().lock().snapshot())
    }

    /// Decide whether the provider may be called now. Admitting a probe
    /// consumes the probe slot for this interval.
    pub fn admit(&self, name: &str) -> Admission {
        self.records
            .get(name)
            .map(|entry| entry.value().lock().admit(&self.config))
            .unwrap_or(Admission::Normal)
    }

    /// Forget all history for a provider.
    pub fn reset(&self, name: &str) {
        if let Some(entry) = self.records.get(name) {
            *entry.value().lock() = HealthRecord::new();
        }
    }
}

impl Default for ProviderHealthTracker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tracker() -> ProviderHealthTracker {
        let tracker = ProviderHealthTracker::new(HealthConfig {
            probe_interval_ms: 1000,
            ..Default::default()
        });
        tracker.register("p");
        tracker
    }

    #[test]
    fn test_degrades_after_exactly_three_failures() {
        let tracker = tracker();
        assert_eq!(tracker.record_failure("p"), HealthState::Healthy);
        assert_eq!(tracker.record_failure("p"), HealthState::Healthy);
        assert_eq!(tracker.record_failure("p"), HealthState::Degraded);
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let tracker = tracker();
        tracker.record_failure("p");
        tracker.record_failure("p");
        tracker.record_success("p");
        tracker.record_failure("p");
        tracker.record_failure("p");
        assert_eq!(tracker.state("p"), HealthState::Healthy);
        assert_eq!(tracker.snapshot("p").unwrap().consecutive_failures, 2);
    }

    #[test]
    fn test_unavailable_after_three_more_failures() {
        let tracker = tracker();
        for _ in 0..3 {
            tracker.record_failure("p");
        }
        assert_eq!(tracker.state("p"), HealthState::Degraded);
        tracker.record_failure("p");
        tracker.record_failure("p");
        assert_eq!(tracker.state("p"), HealthState::Degraded);
        assert_eq!(tracker.record_failure("p"), HealthState::Unavailable);
    }

    #[test]
    fn test_recovery_needs_two_consecutive_successes() {
        let tracker = tracker();
        for _ in 0..3 {
            tracker.record_failure("p");
        }
        assert_eq!(tracker.record_success("p"), HealthState::Degraded);
        assert_eq!(tracker.record_success("p"), HealthState::Healthy);

        // A failure between successes restarts the count
        for _ in 0..3 {
            tracker.record_failure("p");
        }
        tracker.record_success("p");
        tracker.record_failure("p");
        assert_eq!(tracker.record_success("p"), HealthState::Degraded);
        assert_eq!(tracker.record_success("p"), HealthState::Healthy);
    }

    #[test]
    fn test_unavailable_recovers_through_degraded() {
        let tracker = tracker();
        for _ in 0..6 {
            tracker.record_failure("p");
        }
        assert_eq!(tracker.state("p"), HealthState::Unavailable);
        assert_eq!(tracker.record_success("p"), HealthState::Degraded);
        assert_eq!(tracker.record_success("p"), HealthState::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_probe_rate() {
        let tracker = tracker();
        for _ in 0..6 {
            tracker.record_failure("p");
        }
        assert_eq!(tracker.admit("p"), Admission::Skip);

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(tracker.admit("p"), Admission::Probe);
        // The probe slot is consumed until the next interval
        assert_eq!(tracker.admit("p"), Admission::Skip);

        tracker.record_failure("p");
        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(tracker.admit("p"), Admission::Skip);
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(tracker.admit("p"), Admission::Probe);
    }

    #[test]
    fn test_unknown_provider_defaults() {
        let tracker = ProviderHealthTracker::default();
        assert_eq!(tracker.state("ghost"), HealthState::Healthy);
        assert_eq!(tracker.admit("ghost"), Admission::Normal);
        assert!(tracker.snapshot("ghost").is_none());
    }

    #[test]
    fn test_reset() {
        let tracker = tracker();
        for _ in 0..3 {
            tracker.record_failure("p");
        }
        tracker.reset("p");
        assert_eq!(tracker.state("p"), HealthState::Healthy);
        assert_eq!(tracker.snapshot("p").unwrap().consecutive_failures, 0);
    }
}

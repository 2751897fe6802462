//! Memory pressure detection with consecutive-breach confirmation and
//! exponential cooldown backoff.
//!
//! The detector is a small state machine (`Normal` / `Accumulating` /
//! `Cooldown`) that consumes one [`MemorySnapshot`] per tick and answers a
//! single question: should a remediation action fire right now?
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use herakles_memguard::clock::{FixedJitter, ManualClock};
//! use herakles_memguard::detector::{DetectorSettings, PressureDetector};
//!
//! let clock = Arc::new(ManualClock::default());
//! let settings = DetectorSettings {
//!     threshold: 90.0,
//!     sample_interval_ms: 5000,
//!     cooldown_base: Duration::from_secs(60),
//! };
//! let mut detector = PressureDetector::new(settings, clock, Arc::new(FixedJitter(0.0)));
//!
//! assert!(!detector.evaluate_percent(95.0));
//! assert!(!detector.evaluate_percent(95.0));
//! assert!(detector.evaluate_percent(95.0));
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::clock::{elapsed_between, Clock, JitterSource};
use crate::ringbuffer::Ringbuffer;
use crate::system::MemorySnapshot;

/// Number of detection events retained for introspection.
pub const EVENT_HISTORY_CAPACITY: usize = 100;

/// Upper bound of the backoff multiplier.
pub const MAX_BACKOFF_MULTIPLIER: u32 = 8;

/// Hard ceiling for any cooldown window, jitter included.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(30 * 60);

/// Maximum relative jitter applied to a cooldown window.
pub const JITTER_RATIO: f64 = 0.10;

/// Consecutive over-threshold samples required before acting.
///
/// Faster sampling needs more confirmations to cover the same wall time.
pub fn required_consecutive(sample_interval_ms: u64) -> u32 {
    if sample_interval_ms < 3000 {
        5
    } else if sample_interval_ms < 7000 {
        3
    } else {
        2
    }
}

/// Cooldown before jitter: `base * 2^(multiplier-1)`, clamped to [`MAX_COOLDOWN`].
pub fn base_cooldown(base: Duration, multiplier: u32) -> Duration {
    let exponent = multiplier.clamp(1, MAX_BACKOFF_MULTIPLIER) - 1;
    base.saturating_mul(1u32 << exponent).min(MAX_COOLDOWN)
}

/// Cooldown window including a jitter sample in `[-1, 1]`.
pub fn cooldown_duration(base: Duration, multiplier: u32, jitter: f64) -> Duration {
    let factor = 1.0 + jitter.clamp(-1.0, 1.0) * JITTER_RATIO;
    base_cooldown(base, multiplier)
        .mul_f64(factor)
        .min(MAX_COOLDOWN)
}

/// Static detector settings.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DetectorSettings {
    pub threshold: f64,
    pub sample_interval_ms: u64,
    pub cooldown_base: Duration,
}

/// One evaluation, kept in the event history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionEvent {
    pub timestamp: DateTime<Utc>,
    pub percent: f64,
    pub threshold: f64,
    pub consecutive_count: u32,
    pub action_taken: bool,
}

/// Mutable detector state. Only [`PressureDetector`] writes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorState {
    pub consecutive_count: u32,
    pub cooldown_active: bool,
    pub multiplier: u32,
    pub last_trigger: Option<DateTime<Utc>>,
    /// Jitter sampled at the last trigger, in `[-1, 1]`.
    pub jitter: f64,
}

impl Default for DetectorState {
    fn default() -> Self {
        Self {
            consecutive_count: 0,
            cooldown_active: false,
            multiplier: 1,
            last_trigger: None,
            jitter: 0.0,
        }
    }
}

/// Read-only view of the detector for status output.
#[derive(Debug, Clone, Serialize)]
pub struct DetectorStats {
    pub threshold: f64,
    pub required_consecutive: u32,
    pub consecutive_count: u32,
    pub cooldown_active: bool,
    pub multiplier: u32,
    pub last_trigger: Option<DateTime<Utc>>,
    pub cooldown_remaining_ms: u64,
    pub can_trigger: bool,
    pub total_evaluations: u64,
    pub total_triggers: u64,
}

/// Stateful threshold/cooldown state machine.
pub struct PressureDetector {
    settings: DetectorSettings,
    state: DetectorState,
    history: Ringbuffer<DetectionEvent>,
    clock: Arc<dyn Clock>,
    jitter: Arc<dyn JitterSource>,
    total_evaluations: u64,
    total_triggers: u64,
}

impl PressureDetector {
    pub fn new(
        settings: DetectorSettings,
        clock: Arc<dyn Clock>,
        jitter: Arc<dyn JitterSource>,
    ) -> Self {
        Self {
            settings,
            state: DetectorState::default(),
            history: Ringbuffer::new(EVENT_HISTORY_CAPACITY),
            clock,
            jitter,
            total_evaluations: 0,
            total_triggers: 0,
        }
    }

    /// Evaluates a snapshot. Returns true when remediation should fire now.
    pub fn evaluate(&mut self, snapshot: &MemorySnapshot) -> bool {
        self.evaluate_percent(snapshot.percent)
    }

    /// Evaluates a raw percent-used value.
    pub fn evaluate_percent(&mut self, percent: f64) -> bool {
        self.total_evaluations += 1;
        let now = self.clock.now();
        let threshold = self.settings.threshold;

        if percent <= threshold {
            self.state.consecutive_count = 0;
            if self.state.multiplier > 1 {
                self.state.multiplier = (self.state.multiplier / 2).max(1);
                debug!(
                    "Memory recovered ({:.1}%), backoff multiplier decayed to {}",
                    percent, self.state.multiplier
                );
            }
            self.record(now, percent, false);
            return false;
        }

        self.state.consecutive_count += 1;

        if self.state.cooldown_active {
            let window = self.current_cooldown();
            let elapsed = self
                .state
                .last_trigger
                .map(|t| elapsed_between(t, now))
                .unwrap_or(window);
            if elapsed < window {
                debug!(
                    "Breach {} at {:.1}% suppressed by cooldown ({:?} of {:?})",
                    self.state.consecutive_count, percent, elapsed, window
                );
                self.record(now, percent, false);
                return false;
            }
            info!("Cooldown expired after {:?}", elapsed);
            self.state.cooldown_active = false;
        }

        let required = required_consecutive(self.settings.sample_interval_ms);
        if self.state.consecutive_count >= required {
            let fired_at = self.state.consecutive_count;
            self.state.consecutive_count = 0;
            self.state.cooldown_active = true;
            self.state.multiplier = (self.state.multiplier * 2).min(MAX_BACKOFF_MULTIPLIER);
            self.state.last_trigger = Some(now);
            self.state.jitter = self.jitter.sample();
            self.total_triggers += 1;

            info!(
                "Memory pressure confirmed: {:.1}% > {:.1}% for {} samples, next cooldown {:?}",
                percent,
                threshold,
                fired_at,
                self.current_cooldown()
            );
            self.history.push(DetectionEvent {
                timestamp: now,
                percent,
                threshold,
                consecutive_count: fired_at,
                action_taken: true,
            });
            return true;
        }

        debug!(
            "Breach {}/{} at {:.1}% (threshold {:.1}%)",
            self.state.consecutive_count, required, percent, threshold
        );
        self.record(now, percent, false);
        false
    }

    /// Whether an action would currently be permitted. Does not mutate state.
    pub fn can_trigger(&self) -> bool {
        self.cooldown_remaining().is_zero()
    }

    /// Time left in the active cooldown, zero outside cooldown.
    pub fn cooldown_remaining(&self) -> Duration {
        if !self.state.cooldown_active {
            return Duration::ZERO;
        }
        let Some(last) = self.state.last_trigger else {
            return Duration::ZERO;
        };
        self.current_cooldown()
            .saturating_sub(elapsed_between(last, self.clock.now()))
    }

    /// Cooldown window for the current multiplier and the jitter of the last trigger.
    pub fn current_cooldown(&self) -> Duration {
        cooldown_duration(
            self.settings.cooldown_base,
            self.state.multiplier,
            self.state.jitter,
        )
    }

    /// Manual reset: counter 0, multiplier 1, cooldown inactive.
    pub fn reset(&mut self) {
        info!("Pressure detector manually reset");
        self.state.consecutive_count = 0;
        self.state.multiplier = 1;
        self.state.cooldown_active = false;
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.settings.threshold = threshold;
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    /// Detection events, oldest first.
    pub fn history(&self) -> Vec<DetectionEvent> {
        self.history.get_history()
    }

    pub fn stats(&self) -> DetectorStats {
        DetectorStats {
            threshold: self.settings.threshold,
            required_consecutive: required_consecutive(self.settings.sample_interval_ms),
            consecutive_count: self.state.consecutive_count,
            cooldown_active: self.state.cooldown_active,
            multiplier: self.state.multiplier,
            last_trigger: self.state.last_trigger,
            cooldown_remaining_ms: self.cooldown_remaining().as_millis() as u64,
            can_trigger: self.can_trigger(),
            total_evaluations: self.total_evaluations,
            total_triggers: self.total_triggers,
        }
    }

    fn record(&mut self, timestamp: DateTime<Utc>, percent: f64, action_taken: bool) {
        self.history.push(DetectionEvent {
            timestamp,
            percent,
            threshold: self.settings.threshold,
            consecutive_count: self.state.consecutive_count,
            action_taken,
        });
    }
}

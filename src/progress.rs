//! Encode progress tracking.
use indicatif::HumanDuration;
use log::info;
use std::time::{Duration, Instant};

/// Encoded media time vs the total input duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressState {
    elapsed: Duration,
    total: Duration,
}

impl ProgressState {
    pub fn new(total: Duration) -> Self {
        Self {
            elapsed: Duration::ZERO,
            total,
        }
    }

    /// Record a newly parsed elapsed time. Elapsed never decreases & never exceeds total.
    ///
    /// Returns `true` if the state changed.
    pub fn update(&mut self, elapsed: Duration) -> bool {
        let elapsed = elapsed.min(self.total);
        if elapsed > self.elapsed {
            self.elapsed = elapsed;
            true
        } else {
            false
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Done fraction `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f64() / self.total.as_secs_f64()).min(1.0)
    }

    pub fn percent(&self) -> f64 {
        self.fraction() * 100.0
    }
}

/// Info logs encode progress every `interval_pct` percent.
#[derive(Debug)]
pub struct ProgressLogger {
    start: Instant,
    interval_pct: f64,
    last_log_pct: f64,
}

impl ProgressLogger {
    pub fn new(start: Instant, interval_pct: f64) -> Self {
        Self {
            start,
            interval_pct,
            last_log_pct: 0.0,
        }
    }

    /// Update and potentially log progress.
    pub fn update(&mut self, state: &ProgressState, fps: f32) {
        let done = state.fraction();
        if done > 0.0 && self.should_log(state.percent()) {
            let elapsed = self.start.elapsed();
            let eta = Duration::from_secs_f64(elapsed.as_secs_f64() / done).saturating_sub(elapsed);
            info!(
                "encoding {:.0}%, {fps} fps, eta {}",
                state.percent(),
                HumanDuration(eta)
            );
        }
    }

    fn should_log(&mut self, pct: f64) -> bool {
        if pct >= self.last_log_pct + self.interval_pct {
            self.last_log_pct = (pct / self.interval_pct).floor() * self.interval_pct;
            true
        } else {
            false
        }
    }
}

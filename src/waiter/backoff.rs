//! Delay schedules for the polling waiter.
//!
//! A [`Backoff`] maps the 1-based attempt number to the delay waited before
//! that attempt's poll.

use std::time::Duration;

/// Delay schedule between polls.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay before every poll.
    Constant(Duration),

    /// `base + step * (attempt - 1)`, capped at `max`.
    Linear {
        base: Duration,
        step: Duration,
        max: Duration,
    },

    /// `base * multiplier^(attempt - 1)`, capped at `max`.
    Exponential {
        base: Duration,
        multiplier: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Create a constant schedule.
    pub fn constant(interval: Duration) -> Self {
        Backoff::Constant(interval)
    }

    /// Create a linearly growing schedule.
    pub fn linear(base: Duration, step: Duration, max: Duration) -> Self {
        Backoff::Linear { base, step, max }
    }

    /// Create an exponentially growing schedule.
    ///
    /// # Arguments
    /// * `base` - Delay before the first poll
    /// * `multiplier` - Growth factor per attempt (typically 2.0)
    /// * `max` - Upper bound for any single delay
    pub fn exponential(base: Duration, multiplier: f64, max: Duration) -> Self {
        Backoff::Exponential {
            base,
            multiplier,
            max,
        }
    }

    /// Delay to wait before poll number `attempt` (starting at 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let step_count = attempt.saturating_sub(1);
        match self {
            Backoff::Constant(interval) => *interval,
            Backoff::Linear { base, step, max } => {
                base.saturating_add(step.saturating_mul(step_count)).min(*max)
            }
            Backoff::Exponential {
                base,
                multiplier,
                max,
            } => {
                let exponent = step_count.min(i32::MAX as u32) as i32;
                let secs = base.as_secs_f64() * multiplier.powi(exponent);
                if !secs.is_finite() || secs >= max.as_secs_f64() {
                    *max
                } else {
                    Duration::from_secs_f64(secs.max(0.0))
                }
            }
        }
    }
}

impl Default for Backoff {
    /// Poll every five seconds.
    fn default() -> Self {
        Backoff::Constant(Duration::from_secs(5))
    }
}

//! Retry delay and idle-growth policies shared by both polling layers.

use std::time::Duration;

/// Delay between failed subscription polls.
///
/// Retry `n` (1-based) waits `base_delay * multiplier^(n-1)`, capped at
/// `max_delay`. A multiplier of 1.0 gives a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
        }
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.base_delay.as_secs_f64() * 1000.0;
        let max_ms = self.max_delay.as_secs_f64() * 1000.0;
        // Cap before converting so large exponents cannot overflow.
        let delay_ms = (base_ms * self.multiplier.powi(exponent)).min(max_ms);
        if !delay_ms.is_finite() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_ms.max(0.0) / 1000.0)
    }
}

/// Stepped growth of a panel's interval while it sees no qualifying work.
///
/// Every full `window` of idle time adds `step` to the multiplier, up to
/// `max_multiplier`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdleBackoff {
    pub window: Duration,
    pub step: f64,
    pub max_multiplier: f64,
}

impl Default for IdleBackoff {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(120),
            step: 1.0,
            max_multiplier: 4.0,
        }
    }
}

impl IdleBackoff {
    pub fn multiplier(&self, idle_elapsed: Duration) -> f64 {
        if self.window.is_zero() {
            return self.max_multiplier.max(1.0);
        }
        let windows = (idle_elapsed.as_secs_f64() / self.window.as_secs_f64()).floor();
        (1.0 + self.step * windows).min(self.max_multiplier).max(1.0)
    }

    /// Ideal interval after `idle_elapsed` of idleness, clamped to `[min, max]`.
    pub fn interval(
        &self,
        base: Duration,
        min: Duration,
        max: Duration,
        idle_elapsed: Duration,
    ) -> Duration {
        let scaled_secs = base.as_secs_f64() * self.multiplier(idle_elapsed);
        let scaled = if scaled_secs.is_finite() && scaled_secs < max.as_secs_f64() {
            Duration::from_secs_f64(scaled_secs)
        } else {
            max
        };
        clamp_duration(scaled, min, max)
    }
}

fn clamp_duration(value: Duration, min: Duration, max: Duration) -> Duration {
    if max < min {
        return min;
    }
    value.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_policy_never_grows() {
        let policy = RetryPolicy::fixed(Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(7), Duration::from_millis(10));
    }

    #[test]
    fn test_exponential_policy_caps_at_max() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1_000),
            multiplier: 2.0,
            max_delay: Duration::from_millis(5_000),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4_000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(5_000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(5_000));
    }

    #[test]
    fn test_idle_multiplier_steps_per_window() {
        let backoff = IdleBackoff::default();
        assert_eq!(backoff.multiplier(Duration::ZERO), 1.0);
        assert_eq!(backoff.multiplier(Duration::from_secs(119)), 1.0);
        assert_eq!(backoff.multiplier(Duration::from_secs(120)), 2.0);
        assert_eq!(backoff.multiplier(Duration::from_secs(250)), 3.0);
        assert_eq!(backoff.multiplier(Duration::from_secs(3_600)), 4.0);
    }

    #[test]
    fn test_idle_interval_is_clamped() {
        let backoff = IdleBackoff::default();
        let base = Duration::from_secs(5);
        let min = Duration::from_secs(5);
        let max = Duration::from_secs(12);
        assert_eq!(backoff.interval(base, min, max, Duration::ZERO), base);
        assert_eq!(
            backoff.interval(base, min, max, Duration::from_secs(130)),
            Duration::from_secs(10)
        );
        assert_eq!(
            backoff.interval(base, min, max, Duration::from_secs(600)),
            max
        );
    }

    #[test]
    fn test_inverted_bounds_fall_back_to_min() {
        let backoff = IdleBackoff::default();
        let interval = backoff.interval(
            Duration::from_secs(5),
            Duration::from_secs(8),
            Duration::from_secs(2),
            Duration::ZERO,
        );
        assert_eq!(interval, Duration::from_secs(8));
    }
}

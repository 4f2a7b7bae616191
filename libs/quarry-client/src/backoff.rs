use std::time::Duration;

/// Exponential backoff with jitter for job status polling.
///
/// Stateless: the delay is a pure function of the attempt number and a
/// jitter sample in `[0, 1)`. The caller owns the attempt counter and the
/// sleep.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Fraction of the delay that may be randomly removed, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.5,
        }
    }
}

impl Backoff {
    /// Delay before poll number `attempt + 1`.
    ///
    /// The un-jittered delay is `initial * multiplier^attempt`, capped at
    /// `max`. Jitter shortens it by up to `jitter` of its length, so the
    /// result never exceeds `max`.
    pub fn delay(&self, attempt: u32, jitter_sample: f64) -> Duration {
        let max = self.max.as_secs_f64();
        let exp = self.multiplier.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
        let base = (self.initial.as_secs_f64() * exp).min(max);
        let jitter = self.jitter.clamp(0.0, 1.0) * jitter_sample.clamp(0.0, 1.0);
        Duration::from_secs_f64((base * (1.0 - jitter)).max(0.0))
    }

    /// [`delay`](Self::delay) with a fresh random jitter sample.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.delay(attempt, rand::random::<f64>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_then_caps() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(0, 0.0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1, 0.0), Duration::from_secs(2));
        assert_eq!(backoff.delay(5, 0.0), Duration::from_secs(32));
        assert_eq!(backoff.delay(6, 0.0), Duration::from_secs(60));
        assert_eq!(backoff.delay(10_000, 0.0), Duration::from_secs(60));
    }

    #[test]
    fn jitter_only_shortens() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(3, 1.0), Duration::from_secs(4));
        assert_eq!(backoff.delay(3, 0.5), Duration::from_secs(6));
        for attempt in 0..20 {
            assert!(backoff.next_delay(attempt) <= backoff.max);
        }
    }

    #[test]
    fn degenerate_settings_stay_finite() {
        let backoff = Backoff {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(10),
            multiplier: 0.1,
            jitter: 7.0,
        };
        assert_eq!(backoff.delay(3, 0.0), Duration::from_millis(10));
        assert_eq!(backoff.delay(3, 1.0), Duration::ZERO);
    }
}

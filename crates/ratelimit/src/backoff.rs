use std::time::Duration;

/// Delay schedule with an optional attempt bound.
///
/// `next_delay` yields `None` once the bound is reached, so loops driven by a
/// `Backoff` always terminate when one is set.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    max_attempts: Option<u32>,
    current_attempt: u32,
}

impl Backoff {
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            multiplier: 2.0,
            max_attempts: None,
            current_attempt: 0,
        }
    }

    /// Same delay every time.
    pub fn fixed(delay: Duration) -> Self {
        Self::exponential(delay, delay).with_multiplier(1.0)
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max_attempts) = self.max_attempts {
            if self.current_attempt >= max_attempts {
                return None;
            }
        }

        let delay = if self.current_attempt == 0 {
            self.initial.min(self.max)
        } else {
            let multiplier = self.multiplier.powi(self.current_attempt as i32);
            let delay_ms = self.initial.as_millis() as f64 * multiplier;
            let delay_ms = delay_ms.min(self.max.as_millis() as f64);
            Duration::from_millis(delay_ms as u64)
        };

        self.current_attempt += 1;
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(100), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_progression() {
        let mut backoff = Backoff::exponential(Duration::from_millis(100), Duration::from_secs(10));

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(400)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(800)));
        assert_eq!(backoff.current_attempt(), 4);
    }

    #[test]
    fn test_max_cap() {
        let mut backoff = Backoff::exponential(Duration::from_millis(100), Duration::from_secs(1));

        for _ in 0..20 {
            assert!(backoff.next_delay().unwrap() <= Duration::from_secs(1));
        }
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_fixed_delay() {
        let mut backoff = Backoff::fixed(Duration::from_millis(200));
        for _ in 0..5 {
            assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        }
    }

    #[test]
    fn test_attempt_bound() {
        let mut backoff = Backoff::fixed(Duration::from_millis(10)).with_max_attempts(3);

        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.current_attempt(), 3);
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::exponential(Duration::from_millis(100), Duration::from_secs(10))
            .with_max_attempts(2);

        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.next_delay(), None);

        backoff.reset();
        assert_eq!(backoff.current_attempt(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_custom_multiplier() {
        let mut backoff = Backoff::exponential(Duration::from_millis(100), Duration::from_secs(10))
            .with_multiplier(3.0);

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(300)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(900)));
    }
}

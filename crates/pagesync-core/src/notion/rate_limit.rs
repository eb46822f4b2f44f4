use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces request starts at a fixed minimum interval.
///
/// Callers await [`RateLimiter::acquire`] before each request. Slots are
/// handed out in arrival order, so concurrent callers queue rather than
/// burst.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Limiter allowing `per_second` request starts per second.
    pub fn per_second(per_second: f64) -> Self {
        let interval = if per_second.is_finite() && per_second > 0.0 {
            Duration::from_secs_f64(1.0 / per_second)
        } else {
            Duration::ZERO
        };
        Self::with_interval(interval)
    }

    /// Limiter with an explicit minimum interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Minimum spacing between request starts.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next request may start.
    pub async fn acquire(&self) {
        let wait_until = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.interval);
            slot
        };
        tokio::time::sleep_until(wait_until).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spaces_requests() {
        // Given: a limiter at 20 requests per second (50ms apart)
        let limiter = RateLimiter::per_second(20.0);
        let start = std::time::Instant::now();

        // When: four requests start back to back
        for _ in 0..4 {
            limiter.acquire().await;
        }

        // Then: at least three intervals elapsed
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_first_acquire_is_immediate() {
        let limiter = RateLimiter::per_second(1.0);
        let start = std::time::Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_default_rate_interval() {
        let limiter = RateLimiter::per_second(3.0);
        assert_eq!(limiter.interval().as_millis(), 333);
        assert_eq!(RateLimiter::per_second(0.0).interval(), Duration::ZERO);
    }
}

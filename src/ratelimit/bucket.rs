//! Token bucket primitive.

use std::time::Instant;

/// A simple token bucket.
///
/// Capacity and refill rate are passed on each call so tier changes apply
/// without rebuilding per-identifier state. Float accumulation drift is
/// bounded: the value is clamped to capacity on every refill.
#[derive(Debug)]
pub struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    /// Refill and try to consume one token.
    pub fn try_acquire(&mut self, capacity: f64, refill_per_sec: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens available right now, without consuming any.
    pub fn available(&self, capacity: f64, refill_per_sec: f64) -> f64 {
        let elapsed = self.last_refill.elapsed().as_secs_f64();
        (self.tokens + elapsed * refill_per_sec).min(capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_burst_then_exhaustion() {
        let mut bucket = TokenBucket::new(3.0);
        assert!(bucket.try_acquire(3.0, 1.0));
        assert!(bucket.try_acquire(3.0, 1.0));
        assert!(bucket.try_acquire(3.0, 1.0));
        assert!(!bucket.try_acquire(3.0, 1.0));
    }

    #[test]
    fn test_refill_restores_one_token() {
        let mut bucket = TokenBucket::new(1.0);
        assert!(bucket.try_acquire(1.0, 10.0));
        assert!(!bucket.try_acquire(1.0, 10.0));

        std::thread::sleep(Duration::from_millis(150));
        assert!(bucket.try_acquire(1.0, 10.0));
        assert!(!bucket.try_acquire(1.0, 10.0));
    }

    #[test]
    fn test_refill_never_exceeds_capacity() {
        let mut bucket = TokenBucket::new(2.0);
        std::thread::sleep(Duration::from_millis(50));
        // Large refill rate, long idle: still capped at capacity.
        assert!(bucket.try_acquire(2.0, 1000.0));
        assert!(bucket.try_acquire(2.0, 0.0));
        assert!(!bucket.try_acquire(2.0, 0.0));
    }
}

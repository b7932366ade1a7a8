use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Token-bucket limiter for one provider.
///
/// Refills continuously at `requests_per_min / 60` tokens per second. A
/// caller that cannot be served within `max_wait` is rejected immediately
/// rather than queued, so a saturated provider sheds load instead of
/// accumulating latency.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    max_wait: Duration,
    // current tokens and the time of last refill
    bucket: Mutex<(f64, Instant)>,
}

impl RateLimiter {
    pub fn new(requests_per_min: u64, max_wait: Duration) -> Self {
        let capacity = (requests_per_min as f64).max(1.0);
        Self {
            capacity,
            refill_per_sec: capacity / 60.0,
            max_wait,
            bucket: Mutex::new((capacity, Instant::now())),
        }
    }

    /// Take one token, waiting up to `max_wait` for refill. Returns false
    /// when the request would have to wait longer than that.
    pub async fn acquire(&self) -> bool {
        let wait = {
            let mut guard = self.bucket.lock().await;
            let (ref mut tokens, ref mut last) = *guard;
            let now = Instant::now();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *tokens = (*tokens + elapsed * self.refill_per_sec).min(self.capacity);
            *last = now;

            if *tokens >= 1.0 {
                *tokens -= 1.0;
                return true;
            }

            let need = 1.0 - *tokens;
            let wait = Duration::from_secs_f64(need / self.refill_per_sec);
            if wait > self.max_wait {
                return false;
            }
            // Reserve the token now so concurrent waiters cannot double-spend it.
            *tokens -= 1.0;
            wait
        };

        tokio::time::sleep(wait).await;
        true
    }
}

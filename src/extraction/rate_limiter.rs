//! A token bucket shared by every provider call of an extraction run.

use bon::Builder;
use log::{info, warn};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Global request ceiling: at most `max_requests` per rolling `per` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
pub struct RateLimitConfig {
    #[builder(default = 5)]
    pub max_requests: u32,
    #[builder(default = Duration::from_secs(60))]
    pub per: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            per: Duration::from_secs(60),
        }
    }
}

/// Token-bucket state: tokens remaining, refill clock and an optional
/// provider-imposed pause.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    tokens: f64,
    /// Tokens regained per second; `None` disables limiting.
    refill_per_sec: Option<f64>,
    last_refill: Instant,
    paused_until: Option<Instant>,
}

impl RateLimiter {
    /// A full bucket.
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = f64::from(config.max_requests.max(1));
        let refill_per_sec = (!config.per.is_zero()).then(|| capacity / config.per.as_secs_f64());
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec,
            last_refill: Instant::now(),
            paused_until: None,
        }
    }

    fn refill(&mut self, now: Instant) {
        if let Some(rate) = self.refill_per_sec {
            let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
            self.tokens = (self.tokens + elapsed * rate).min(self.capacity);
        }
        self.last_refill = now;
    }

    /// Takes a token if one is available at `now`, otherwise returns how long to wait.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        if let Some(until) = self.paused_until {
            if until > now {
                return Err(until - now);
            }
            self.paused_until = None;
        }
        let Some(rate) = self.refill_per_sec else {
            return Ok(());
        };

        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - self.tokens) / rate))
        }
    }

    /// Blocks every caller until `now + duration`. An existing longer pause is kept.
    pub fn pause_for(&mut self, duration: Duration, now: Instant) {
        let until = now + duration;
        if self.paused_until.map_or(true, |current| current < until) {
            self.paused_until = Some(until);
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}

/// A [`RateLimiter`] that concurrent grid cells can wait on.
#[derive(Debug)]
pub struct SharedRateLimiter {
    inner: Mutex<RateLimiter>,
}

impl SharedRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            inner: Mutex::new(RateLimiter::new(config)),
        }
    }

    /// Waits until a request may be made and consumes its token.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut limiter = self.inner.lock().await;
                match limiter.try_acquire(Instant::now()) {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            if wait >= Duration::from_secs(1) {
                info!("Rate limiter: waiting {:.1}s", wait.as_secs_f64());
            }
            sleep(wait).await;
        }
    }

    /// Pauses all further requests, e.g. after the provider answered 429.
    pub async fn pause_for(&self, duration: Duration) {
        warn!(
            "Pausing all provider calls for {:.1}s",
            duration.as_secs_f64()
        );
        self.inner.lock().await.pause_for(duration, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_requests: u32, per_secs: u64) -> RateLimitConfig {
        RateLimitConfig {
            max_requests,
            per: Duration::from_secs(per_secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_empties_then_refills() {
        let mut limiter = RateLimiter::new(config(2, 60));
        let now = Instant::now();

        assert!(limiter.try_acquire(now).is_ok());
        assert!(limiter.try_acquire(now).is_ok());
        let wait = limiter.try_acquire(now).unwrap_err();
        assert!((wait.as_secs_f64() - 30.0).abs() < 1e-6, "waited {wait:?}");

        let later = now + Duration::from_secs(31);
        assert!(limiter.try_acquire(later).is_ok());
        assert!(limiter.try_acquire(later).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_blocks_even_with_tokens() {
        let mut limiter = RateLimiter::new(config(10, 60));
        let now = Instant::now();
        limiter.pause_for(Duration::from_secs(120), now);
        limiter.pause_for(Duration::from_secs(5), now);

        assert_eq!(limiter.try_acquire(now), Err(Duration::from_secs(120)));
        assert!(limiter
            .try_acquire(now + Duration::from_secs(120))
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_acquire_waits_for_refill() {
        let limiter = SharedRateLimiter::new(config(1, 10));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_secs(20));
        assert!(start.elapsed() < Duration::from_secs(21));
    }

    #[test]
    fn test_zero_window_means_unlimited() {
        let mut limiter = RateLimiter::new(config(1, 0));
        let now = Instant::now();
        for _ in 0..100 {
            assert!(limiter.try_acquire(now).is_ok());
        }
    }
}

//! Sliding-window admission control shared by every provider call in the
//! process. At capacity, callers wait for the oldest admission to leave the
//! window and try again; nothing is ever rejected.

use std::collections::VecDeque;
use std::time::Duration;

use gamelens_core::config::RateLimitConfig;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(capacity: usize, window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_minute, Duration::from_secs(config.window_secs))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait until the window has room, record the admission and return how
    /// long the caller waited.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        loop {
            let wait = match self.admit(Instant::now()) {
                None => return started.elapsed(),
                Some(wait) => wait,
            };
            metrics::counter!("insights.rate_limit.wait").increment(1);
            debug!(
                wait_ms = wait.as_millis() as u64,
                capacity = self.capacity,
                "Rate window full, waiting for capacity"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Admit without waiting; false when the window is full.
    pub fn try_acquire(&self) -> bool {
        self.admit(Instant::now()).is_none()
    }

    /// Admissions currently inside the window.
    pub fn in_window(&self) -> usize {
        let mut admitted = self.admitted.lock();
        self.purge(&mut admitted, Instant::now());
        admitted.len()
    }

    /// Record an admission at `now`, or return how long until the oldest
    /// admission exits the window.
    fn admit(&self, now: Instant) -> Option<Duration> {
        let mut admitted = self.admitted.lock();
        self.purge(&mut admitted, now);
        if admitted.len() < self.capacity {
            admitted.push_back(now);
            return None;
        }
        let oldest = admitted.front().copied().unwrap_or(now);
        Some(
            self.window
                .saturating_sub(now.duration_since(oldest))
                .max(Duration::from_millis(1)),
        )
    }

    fn purge(&self, admitted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = admitted.front() {
            if now.duration_since(*front) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_admits_up_to_capacity_without_waiting() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert_eq!(limiter.acquire().await, Duration::ZERO);
        }
        assert_eq!(limiter.in_window(), 3);
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_over_capacity_call_is_delayed_not_dropped() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.acquire().await;

        limiter.acquire().await;
        // Admitted exactly when the first admission left the window.
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(60) && waited < Duration::from_secs(61));
        assert_eq!(limiter.in_window(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_never_exceed_rate() {
        let limiter = Arc::new(RateLimiter::new(2, Duration::from_secs(60)));
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..5 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }
        let mut admitted = Vec::new();
        for handle in handles {
            admitted.push(handle.await.unwrap());
        }
        admitted.sort();

        assert_eq!(admitted.len(), 5);
        for (i, t) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .filter(|u| u.duration_since(*t) < Duration::from_secs(60))
                .count();
            assert!(in_window <= 2);
        }
        assert!(admitted[4].duration_since(start) >= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.try_acquire());
    }
}

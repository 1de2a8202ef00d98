//! Per-user notification rate limiting.
//!
//! Each user gets a counter that resets once its window has elapsed. The
//! state lives only in process memory: it is lost on restart and is not
//! shared between processes.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct UserWindow {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window counter keyed by user id.
#[derive(Debug, Default)]
pub struct NotificationRateLimiter {
    windows: HashMap<i64, UserWindow>,
}

impl NotificationRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when `user_id` already received `limit` notifications
    /// in the current window. Otherwise the notification is counted and
    /// `false` is returned.
    pub fn is_rate_limited(&mut self, user_id: i64, limit: u32, window: Duration) -> bool {
        self.is_rate_limited_at(user_id, limit, window, Instant::now())
    }

    pub fn is_rate_limited_at(
        &mut self,
        user_id: i64,
        limit: u32,
        window: Duration,
        now: Instant,
    ) -> bool {
        let entry = self.windows.entry(user_id).or_insert(UserWindow {
            count: 0,
            reset_at: now + window,
        });

        if now > entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + window;
        }

        if entry.count >= limit {
            return true;
        }

        entry.count += 1;
        false
    }

    /// Notifications counted for `user_id` in its current window.
    pub fn count_for(&self, user_id: i64) -> u32 {
        self.windows.get(&user_id).map_or(0, |w| w.count)
    }

    /// Number of users with tracked windows.
    pub fn tracked_users(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn allows_up_to_limit_then_blocks() {
        let mut limiter = NotificationRateLimiter::new();
        let now = Instant::now();

        for _ in 0..3 {
            assert!(!limiter.is_rate_limited_at(1, 3, HOUR, now));
        }
        assert!(limiter.is_rate_limited_at(1, 3, HOUR, now));
        assert_eq!(limiter.count_for(1), 3);
    }

    #[test]
    fn users_are_limited_independently() {
        let mut limiter = NotificationRateLimiter::new();
        let now = Instant::now();

        assert!(!limiter.is_rate_limited_at(1, 1, HOUR, now));
        assert!(limiter.is_rate_limited_at(1, 1, HOUR, now));
        assert!(!limiter.is_rate_limited_at(2, 1, HOUR, now));
        assert_eq!(limiter.tracked_users(), 2);
    }

    #[test]
    fn window_resets_after_expiry() {
        let mut limiter = NotificationRateLimiter::new();
        let start = Instant::now();

        assert!(!limiter.is_rate_limited_at(1, 1, HOUR, start));
        assert!(limiter.is_rate_limited_at(1, 1, HOUR, start + HOUR));
        // Strictly past the reset time starts a new window.
        assert!(!limiter.is_rate_limited_at(1, 1, HOUR, start + HOUR + Duration::from_secs(1)));
    }

    #[test]
    fn zero_limit_blocks_everything() {
        let mut limiter = NotificationRateLimiter::new();
        assert!(limiter.is_rate_limited(9, 0, HOUR));
        assert_eq!(limiter.count_for(9), 0);
    }

    #[test]
    fn blocked_calls_are_not_counted() {
        let mut limiter = NotificationRateLimiter::new();
        let now = Instant::now();
        limiter.is_rate_limited_at(4, 2, HOUR, now);
        limiter.is_rate_limited_at(4, 2, HOUR, now);
        for _ in 0..10 {
            limiter.is_rate_limited_at(4, 2, HOUR, now);
        }
        assert_eq!(limiter.count_for(4), 2);
    }

    proptest! {
        #[test]
        fn never_allows_more_than_limit_per_window(limit in 0u32..60, attempts in 0usize..200) {
            let mut limiter = NotificationRateLimiter::new();
            let now = Instant::now();

            let allowed = (0..attempts)
                .filter(|_| !limiter.is_rate_limited_at(42, limit, HOUR, now))
                .count();

            prop_assert_eq!(allowed, attempts.min(limit as usize));
        }
    }
}

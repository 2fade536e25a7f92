//! Fixed-window quota limiter
//!
//! Admits at most `capacity` requests per window. The window resets the first
//! time the limiter is consulted at or after `window_reset_at`. A burst that
//! straddles a window boundary can briefly exceed the steady-state rate by up
//! to 2x; that matches how the service advertises its quota.

use super::config::RateLimitConfig;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

/// Result of a single admission decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted; `remaining` admissions are left in this window
    Admitted { remaining: u32 },
    /// Quota used up; `wait` until the window resets
    Blocked { wait: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

/// Quota introspection returned by [`RateLimiter::quota`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaStatus {
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Per-client quota limiter. Clones share the same window state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<WindowState>>,
    /// FIFO queue for callers that wait for the next window
    wait_queue: Arc<tokio::sync::Mutex<()>>,
    config: RateLimitConfig,
}

#[derive(Debug)]
struct WindowState {
    consumed: u32,
    window_reset_at: Instant,
    requests_admitted: u64,
    requests_blocked: u64,
}

impl RateLimiter {
    /// Create a new limiter; the first window starts now
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(WindowState {
                consumed: 0,
                window_reset_at: Instant::now() + config.window,
                requests_admitted: 0,
                requests_blocked: 0,
            })),
            wait_queue: Arc::new(tokio::sync::Mutex::new(())),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Make one admission decision without waiting
    pub fn admit(&self) -> Admission {
        if !self.config.enabled {
            return Admission::Admitted {
                remaining: self.config.capacity,
            };
        }

        let now = Instant::now();
        let mut state = self.lock_window(now);

        if state.consumed < self.config.capacity {
            state.consumed += 1;
            state.requests_admitted += 1;
            let remaining = self.config.capacity - state.consumed;
            debug!("Rate limiter: request admitted, {} remaining in window", remaining);
            Admission::Admitted { remaining }
        } else {
            state.requests_blocked += 1;
            let wait = state.window_reset_at.saturating_duration_since(now);
            debug!("Rate limiter: request blocked, window resets in {:?}", wait);
            Admission::Blocked { wait }
        }
    }

    /// Wait until admitted. Waiters are served in call order.
    ///
    /// Returns `Err(wait)` with the time left until the window resets if
    /// `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Duration> {
        let _turn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(self.time_until_reset()),
            turn = self.wait_queue.lock() => turn,
        };

        loop {
            let wait = match self.admit() {
                Admission::Admitted { .. } => return Ok(()),
                Admission::Blocked { wait } => wait,
            };

            info!("Rate limiter: quota exhausted, waiting {:?} for the next window", wait);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Rate limiter: wait cancelled with {:?} left", self.time_until_reset());
                    return Err(self.time_until_reset());
                }
                _ = sleep(wait) => {}
            }
        }
    }

    /// Admissions left in the current window, clamped at 0
    pub fn remaining(&self) -> u32 {
        if !self.config.enabled {
            return self.config.capacity;
        }
        let state = self.lock_window(Instant::now());
        self.config.capacity.saturating_sub(state.consumed)
    }

    /// Time until the current window resets
    pub fn time_until_reset(&self) -> Duration {
        let now = Instant::now();
        let state = self.lock_window(now);
        state.window_reset_at.saturating_duration_since(now)
    }

    /// Remaining admissions and the wall-clock time the window resets
    pub fn quota(&self) -> QuotaStatus {
        let now = Instant::now();
        let (remaining, wait) = {
            let state = self.lock_window(now);
            let remaining = if self.config.enabled {
                self.config.capacity.saturating_sub(state.consumed)
            } else {
                self.config.capacity
            };
            (remaining, state.window_reset_at.saturating_duration_since(now))
        };

        let wait = chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::zero());
        QuotaStatus {
            remaining,
            reset_at: Utc::now() + wait,
        }
    }

    /// Get current limiter statistics
    pub fn stats(&self) -> RateLimiterStats {
        let state = self.lock_window(Instant::now());
        RateLimiterStats {
            consumed: state.consumed,
            capacity: self.config.capacity,
            window: self.config.window,
            requests_admitted: state.requests_admitted,
            requests_blocked: state.requests_blocked,
            enabled: self.config.enabled,
        }
    }

    /// Force a fresh window. Administrative and test use only.
    pub fn reset(&self) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.consumed = 0;
        state.window_reset_at = Instant::now() + self.config.window;
        state.requests_admitted = 0;
        state.requests_blocked = 0;
    }

    /// Lock the window state, rolling it over first if it has expired
    fn lock_window(&self, now: Instant) -> MutexGuard<'_, WindowState> {
        // The state stays consistent even if a holder panicked; every update is a
        // single assignment.
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if now >= state.window_reset_at {
            debug!("Rate limiter: window expired, {} requests were admitted", state.consumed);
            state.consumed = 0;
            state.window_reset_at = now + self.config.window;
        }
        state
    }
}

/// Rate limiter statistics
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    /// Admissions used in the current window
    pub consumed: u32,
    pub capacity: u32,
    pub window: Duration,
    /// Total requests admitted since creation or the last reset
    pub requests_admitted: u64,
    /// Total admission attempts turned away
    pub requests_blocked: u64,
    pub enabled: bool,
}

impl RateLimiterStats {
    /// Calculate the acceptance rate (admitted / total)
    pub fn acceptance_rate(&self) -> f64 {
        let total = self.requests_admitted + self.requests_blocked;
        if total == 0 {
            1.0
        } else {
            self.requests_admitted as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::resilience::config::ExhaustionPolicy;

    fn limiter(capacity: u32, window_ms: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            capacity,
            window: Duration::from_millis(window_ms),
            enabled: true,
            on_exhausted: ExhaustionPolicy::FailFast,
        })
    }

    #[tokio::test]
    async fn test_rate_limiter_disabled() {
        let limiter = RateLimiter::new(RateLimitConfig {
            capacity: 5,
            enabled: false,
            ..RateLimitConfig::default()
        });

        for _ in 0..100 {
            assert!(limiter.admit().is_admitted());
        }
        assert_eq!(limiter.remaining(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_then_blocked() {
        let limiter = limiter(5, 60_000);

        for expected_remaining in (0..5).rev() {
            assert_eq!(
                limiter.admit(),
                Admission::Admitted {
                    remaining: expected_remaining
                }
            );
        }

        assert_eq!(
            limiter.admit(),
            Admission::Blocked {
                wait: Duration::from_millis(60_000)
            }
        );
        assert_eq!(limiter.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_until_window_reset() {
        let limiter = limiter(2, 1000);
        assert!(limiter.admit().is_admitted());
        assert!(limiter.admit().is_admitted());

        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(
            limiter.admit(),
            Admission::Blocked {
                wait: Duration::from_millis(1)
            }
        );

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(limiter.remaining(), 2);
        assert!(limiter.admit().is_admitted());
        assert!(limiter.admit().is_admitted());
        assert!(!limiter.admit().is_admitted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_window_starts_at_reset_observation() {
        let limiter = limiter(1, 1000);
        assert!(limiter.admit().is_admitted());

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!(limiter.admit().is_admitted());

        // Window restarted at t=1500, so it runs until t=2500
        assert_eq!(limiter.time_until_reset(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats() {
        let limiter = limiter(3, 60_000);

        for _ in 0..5 {
            limiter.admit();
        }

        let stats = limiter.stats();
        assert_eq!(stats.consumed, 3);
        assert_eq!(stats.requests_admitted, 3);
        assert_eq!(stats.requests_blocked, 2);
        assert_eq!(stats.acceptance_rate(), 0.6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        let limiter = limiter(1, 60_000);
        assert!(limiter.admit().is_admitted());
        assert!(!limiter.admit().is_admitted());

        limiter.reset();
        assert_eq!(limiter.remaining(), 1);
        assert!(limiter.admit().is_admitted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_next_window() {
        let limiter = limiter(1, 1000);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        assert!(limiter.acquire(&cancel).await.is_ok());
        assert!(limiter.acquire(&cancel).await.is_ok());

        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_cancelled() {
        let limiter = limiter(1, 10_000);
        let cancel = CancellationToken::new();
        assert!(limiter.acquire(&cancel).await.is_ok());

        let canceller = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(2000)).await;
            canceller.cancel();
        });

        let result = limiter.acquire(&cancel).await;
        assert_eq!(result, Err(Duration::from_millis(8000)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_admitted_in_order() {
        let limiter = limiter(1, 1000);
        assert!(limiter.admit().is_admitted());

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for id in 0..3 {
            let limiter = limiter.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire(&CancellationToken::new()).await.unwrap();
                order.lock().unwrap().push(id);
            }));
            // Let each waiter queue up before spawning the next
            tokio::task::yield_now().await;
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_snapshot() {
        let limiter = limiter(10, 60_000);
        limiter.admit();
        limiter.admit();

        let before = Utc::now();
        let quota = limiter.quota();
        assert_eq!(quota.remaining, 8);
        assert!(quota.reset_at >= before + chrono::Duration::seconds(59));

        // Reading the quota does not consume an admission
        assert_eq!(limiter.remaining(), 8);
    }
}

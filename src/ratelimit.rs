//! Fixed-window request budget shared by every caller of the remote API.
//!
//! VNDB enforces a coarse request quota per client; staying under it locally
//! is cheaper than eating 429s. All API traffic funnels through one
//! [`RateLimiter`] owned by the client.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Fixed-window counter: at most `max_requests` acquisitions per `window`.
///
/// `acquire()` suspends the caller until a slot is free. Waiters queue on the
/// internal mutex, which tokio hands out in FIFO order, so blocking is
/// FIFO-ish; under sustained overload throughput settles at
/// `max_requests / window` with no further fairness guarantee.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    state: Mutex<Window>,
}

struct Window {
    started: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        assert!(max_requests > 0, "rate limiter needs a nonzero budget");
        Self {
            max_requests,
            window,
            state: Mutex::new(Window {
                started: Instant::now(),
                count: 0,
            }),
        }
    }

    /// Block until the current window has a free slot, then consume it.
    ///
    /// The guard is held across the sleep: check, increment and the wait for
    /// the window boundary form one mutual-exclusion region, so a waiter at
    /// the boundary claims the next slot before later callers re-check.
    pub async fn acquire(&self) {
        let mut window = self.state.lock().await;
        loop {
            let now = Instant::now();
            if now.duration_since(window.started) >= self.window {
                window.started = now;
                window.count = 0;
            }
            if window.count < self.max_requests {
                window.count += 1;
                return;
            }
            let until_boundary = self.window - now.duration_since(window.started);
            tracing::debug!(
                wait_secs = until_boundary.as_secs_f64(),
                "request window exhausted, waiting for the next one"
            );
            tokio::time::sleep(until_boundary).await;
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

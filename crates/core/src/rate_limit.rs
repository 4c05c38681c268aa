//! Fixed-window request limiter.
//!
//! The window opens at construction. Once `limit` requests have been admitted,
//! further requests are rejected until `window` has elapsed since the window
//! start; the first request after that resets the count and restarts the window.
//! The transition is evaluated lazily on each call.

use crate::clock::Clock;
use crate::error::ComposeError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<RateState>,
}

#[derive(Debug, Clone, Copy)]
struct RateState {
    request_count: u32,
    window_start: Instant,
}

impl RateLimiter {
    /// A `limit` of zero is treated as one.
    pub fn new(limit: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        let window_start = clock.now();
        Self {
            limit: limit.max(1),
            window,
            clock,
            state: Mutex::new(RateState {
                request_count: 0,
                window_start,
            }),
        }
    }

    /// Admits one request or reports how long until the window reopens.
    /// Count and window start are read and written under a single lock.
    pub fn try_acquire(&self) -> Result<(), ComposeError> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if state.request_count >= self.limit {
            let elapsed = now.saturating_duration_since(state.window_start);
            if elapsed < self.window {
                return Err(ComposeError::RateLimited {
                    remaining: self.window - elapsed,
                });
            }
            state.request_count = 0;
            state.window_start = now;
        }

        state.request_count += 1;
        Ok(())
    }

    pub fn request_count(&self) -> u32 {
        self.state.lock().request_count
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("state", &*self.state.lock())
            .finish()
    }
}

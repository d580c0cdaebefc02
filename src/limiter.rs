//! Per-provider request rate limiting.
//!
//! Every provider client owns one [`RateLimiter`] sized from its configured
//! max-requests-per-minute. Acquiring capacity suspends the caller until the
//! current window has room; requests are never rejected.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// A fixed-window rate limiter shared by all in-flight tasks of one provider.
///
/// Rates of one request per second or more use a one-second window so that
/// capacity frees up responsively. Slower rates get a single permit per
/// window of `60 / max_rpm` seconds, which holds the steady-state rate
/// without allowing a burst at the start of each minute.
pub struct RateLimiter {
    permits_per_window: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

struct WindowState {
    window_start: Instant,
    used: u32,
}

impl RateLimiter {
    pub fn new(permits_per_window: u32, window: Duration) -> Self {
        Self {
            permits_per_window,
            window,
            state: Mutex::new(WindowState {
                window_start: Instant::now(),
                used: 0,
            }),
        }
    }

    /// Builds a limiter from a max-requests-per-minute quota.
    pub fn per_minute(max_rpm: u32) -> Self {
        if max_rpm >= 60 {
            Self::new(max_rpm / 60, Duration::from_secs(1))
        } else {
            Self::new(1, Duration::from_secs_f64(60.0 / max_rpm as f64))
        }
    }

    /// Waits until the current window has a free permit and claims it.
    ///
    /// Permits expire with the window rather than being released by the
    /// caller, so holding one across a single network call is enough.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.window_start);

                if elapsed >= self.window {
                    state.window_start = now;
                    state.used = 0;
                }

                if state.used < self.permits_per_window {
                    state.used += 1;
                    return;
                }

                self.window.saturating_sub(now.duration_since(state.window_start))
            };
            // Window is full; sleep it out and re-contend with other waiters.
            tokio::time::sleep(wait).await;
        }
    }
}

use std::{collections::HashMap, time::Duration};
use tokio::{sync::Mutex, time::Instant};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    attempts: u32,
}

/// Fixed-window attempt counter keyed by caller.
#[derive(Debug)]
pub struct RateLimiter {
    max_attempts: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Counts one attempt for `key`, failing once the window's budget is spent.
    pub async fn check(&self, key: &str) -> AppResult<()> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            attempts: 0,
        });

        if now.duration_since(window.started) >= self.window {
            *window = Window {
                started: now,
                attempts: 0,
            };
        }

        if window.attempts >= self.max_attempts {
            let remaining = self.window.saturating_sub(now.duration_since(window.started));
            return Err(AppError::RateLimited {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }

        window.attempts += 1;
        Ok(())
    }

    /// Drops windows that have fully elapsed.
    pub async fn prune(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.started) < self.window);
        before - windows.len()
    }
}

//! Burst coalescing for raw change notifications.
//!
//! The first raw event of a burst arms a timer for a fixed quiet period.
//! Events that arrive while the timer is armed are absorbed; they neither
//! extend nor restart it. When the timer fires one coalesced signal is
//! produced and the next raw event arms a fresh timer.

use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Default quiet period after the first event of a burst.
pub const DEFAULT_QUIET_MS: u64 = 75;

#[derive(Debug)]
pub struct Coalescer {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl Coalescer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    /// Record a raw event. Returns `true` when this event armed a new timer.
    pub fn notify(&mut self) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(Instant::now() + self.quiet);
        true
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Drop a pending timer without firing it.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Resolves once the armed timer expires, then disarms it.
    ///
    /// Never resolves while disarmed. Cancel-safe: dropping the future keeps
    /// the deadline, so it can be polled again from a `select!` loop.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending().await,
        }
    }
}

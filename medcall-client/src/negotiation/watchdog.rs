use std::time::Duration;
use tokio::time::Instant;

use crate::negotiation::call_state::CallState;

/// Promotes a call stuck in `Negotiating` or `Disconnected` to `Failed`.
#[derive(Debug)]
pub struct StallWatchdog {
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl StallWatchdog {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Arms on entering a stall-prone state, keeps the running deadline while
    /// it persists, disarms otherwise.
    pub fn observe(&mut self, state: CallState, now: Instant) {
        match (state.can_stall(), self.timeout) {
            (true, Some(timeout)) => {
                self.deadline.get_or_insert(now + timeout);
            }
            _ => self.deadline = None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }
}

//! Timed waits and the shutdown latch.
//!
//! Every blocking wait in a run (rate-limit spacing, retry cooldown, idle
//! polling) goes through a [`Pacer`], so an interrupt can cut it short and
//! tests can record waits instead of sleeping.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Why the loop is waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pause {
    /// Spacing before a provider call.
    RateLimit,
    /// Back-off after a transient provider failure.
    Cooldown,
    /// Caught up in continuous mode, waiting for the next bar to close.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("interrupted")]
pub struct Interrupted;

pub trait Pacer: Send + Sync {
    /// Block for `duration`, returning early with `Interrupted` on shutdown.
    fn pause(&self, duration: Duration, reason: Pause) -> Result<(), Interrupted>;

    fn is_interrupted(&self) -> bool;
}

/// Production pacer: a condition-variable wait that `trigger` wakes up.
#[derive(Debug, Default)]
pub struct Shutdown {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake any wait in progress.
    pub fn trigger(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.wake.notify_all();
    }
}

impl Pacer for Shutdown {
    fn pause(&self, duration: Duration, _reason: Pause) -> Result<(), Interrupted> {
        let guard = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        let (stopped, _) = self
            .wake
            .wait_timeout_while(guard, duration, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        if *stopped {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }

    fn is_interrupted(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// SensorLink - Interrupt-to-Task Signalling
//
// A binary signal carries at most one pending permit.  The interrupt side
// only posts; repeated posts before the task wakes collapse into one.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Blocking side of a trigger.  The motion task parks here between samples.
pub trait TriggerWait {
    fn wait(&mut self);
}

#[derive(Debug, Default)]
pub struct BinarySignal {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl BinarySignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make one permit available.  Never blocks.
    pub fn post(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = true;
        self.cond.notify_one();
    }

    /// Block until a permit is available, then consume it.
    pub fn wait(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while !*pending {
            pending = self.cond.wait(pending).unwrap_or_else(PoisonError::into_inner);
        }
        *pending = false;
    }

    /// Like [`wait`](Self::wait) with an upper bound.  Returns `false` on
    /// timeout without consuming anything.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut pending, _) = self
            .cond
            .wait_timeout_while(pending, timeout, |p| !*p)
            .unwrap_or_else(PoisonError::into_inner);
        let taken = *pending;
        *pending = false;
        taken
    }

    pub fn is_pending(&self) -> bool {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TriggerWait for &BinarySignal {
    fn wait(&mut self) {
        BinarySignal::wait(self);
    }
}

impl TriggerWait for std::sync::Arc<BinarySignal> {
    fn wait(&mut self) {
        BinarySignal::wait(self);
    }
}

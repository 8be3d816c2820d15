//! The one piece of state shared between the event loop and background
//! threads: whether a log execution is in flight.

use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct RefreshGate {
    busy: Arc<Mutex<bool>>,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the gate. Returns `false` when an execution is already running.
    pub fn try_begin(&self) -> bool {
        let mut busy = self.lock();
        if *busy {
            return false;
        }
        *busy = true;
        true
    }

    pub fn release(&self) {
        *self.lock() = false;
    }

    pub fn is_busy(&self) -> bool {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, bool> {
        self.busy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases the gate when dropped, including on unwind.
#[derive(Debug)]
pub struct GateRelease {
    gate: RefreshGate,
}

impl GateRelease {
    pub fn new(gate: RefreshGate) -> Self {
        Self { gate }
    }
}

impl Drop for GateRelease {
    fn drop(&mut self) {
        self.gate.release();
    }
}

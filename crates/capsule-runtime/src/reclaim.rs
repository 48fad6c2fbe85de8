//! Suspension of unit reclamation while native code is being linked.
//!
//! A native initializer may register units and hand out references that
//! the runtime has not yet recorded. Reclamation passes must not run while
//! that is in progress, so native loads hold a [`ReclamationGuard`] for the
//! whole open/initialize/register sequence. Guards nest.

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

/// Counter of active suspensions.
#[derive(Debug, Default)]
pub struct ReclamationGate {
    depth: AtomicUsize,
}

impl ReclamationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend reclamation until the returned guard is dropped.
    pub fn suspend(&self) -> ReclamationGuard<'_> {
        let depth = self.depth.fetch_add(1, Ordering::AcqRel) + 1;
        trace!("Reclamation suspended (depth {})", depth);
        ReclamationGuard { gate: self }
    }

    /// Whether any guard is alive.
    pub fn is_suspended(&self) -> bool {
        self.depth() > 0
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Run `pass` unless reclamation is suspended. Returns whether it ran.
    pub fn try_reclaim(&self, pass: impl FnOnce()) -> bool {
        if self.is_suspended() {
            trace!("Skipping reclamation pass, depth {}", self.depth());
            return false;
        }
        pass();
        true
    }
}

/// Restores the previous suspension depth when dropped.
#[derive(Debug)]
pub struct ReclamationGuard<'a> {
    gate: &'a ReclamationGate,
}

impl Drop for ReclamationGuard<'_> {
    fn drop(&mut self) {
        let previous = self.gate.depth.fetch_sub(1, Ordering::AcqRel);
        trace!("Reclamation depth restored to {}", previous - 1);
    }
}

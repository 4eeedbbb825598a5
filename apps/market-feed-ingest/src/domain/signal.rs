//! Success Signal
//!
//! Edge-triggered "at least one delivery succeeded since the last
//! notification" marker. Written by the dispatcher and the drain loop,
//! cleared only by the notification monitor. A set racing a clear may be
//! lost; the flag is not a counter and that loss is accepted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared success flag. Cloning shares the same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct SuccessSignal {
    flag: Arc<AtomicBool>,
}

impl SuccessSignal {
    /// Create a cleared signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark that a delivery succeeded.
    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether a delivery succeeded since the last clear.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Acknowledge the signal.
    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

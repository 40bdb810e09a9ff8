//! engine::cancel
//!
//! Cooperative cancellation between pipeline stages.
//!
//! The first interrupt only sets a flag. The pipeline polls it at stage
//! boundaries, between files while copying and while a prompt is pending,
//! so an interrupted run unwinds through the same guards as a failed one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `true` if it had already been requested.
    pub fn cancel(&self) -> bool {
        self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

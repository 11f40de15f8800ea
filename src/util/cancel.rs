//! Cooperative cancellation token
//!
//! Cancellation in the pipeline is cooperative: the token is checked before a
//! new stage starts and before results are reported back. A running external
//! process is never killed; its result is simply discarded once the token has
//! been cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Error returned when an operation observes a cancelled token
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Operation was cancelled")]
pub struct Cancelled;

/// Cloneable cancellation flag shared across an operation's call chain
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; all clones observe the flag
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns `Err(Cancelled)` once `cancel` has been called
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

//! Utility modules for flatstage
//!
//! This module provides various utility functions and helpers including:
//! - Structured logging setup and configuration
//! - Cooperative cancellation tokens
//! - Recursive directory removal with progress reporting

pub mod cancel;
pub mod logging;
pub mod reaper;

// Re-export commonly used items
pub use cancel::{CancelToken, Cancelled};
pub use logging::{init_default, init_from_env, init_logging, LoggingConfig};
pub use reaper::reap_dir;

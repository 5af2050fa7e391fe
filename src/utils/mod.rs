//! Utility module for the stake sync service.
//!
//! Re-exports the retry helper used for source queries and store writes.
pub mod retry;

pub use retry::{RetryConfig, retry_with_max_elapsed_time};

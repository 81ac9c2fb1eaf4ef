//! Reliability helpers for actions
//!
//! The pool never retries or times out an action on its own. Actions that
//! want retries layer them over their own steps with:
//! - [`RetryPolicy`] - Configurable retry with exponential backoff
//! - [`retry`] / [`retry_if`] - Drive an async operation under a policy

mod retry;

pub use retry::{retry, retry_if, RetryPolicy};

//! # Bounded fan-out runner
//!
//! Runs one async action per work item on a pool with a fixed number of
//! concurrent slots, and hands back one [`Outcome`] per item in input order.
//!
//! ## Features
//!
//! - **Bounded concurrency**: never more than `max_concurrency` actions in flight
//! - **FIFO dispatch**: items are started in the order they were given
//! - **Failure isolation**: an error or panic in one action only affects that item's outcome
//! - **Scoped pools**: pools are constructed and shut down explicitly, no global state
//! - **Caller-level retries**: [`RetryPolicy`] for actions that want to retry their own steps
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WorkerPool                            │
//! │   items ──► dispatch loop (FIFO) ──► slot semaphore (N)     │
//! │                                        │                     │
//! │                                        ▼                     │
//! │              JoinSet: [action 1] [action 2] ... [action N]   │
//! │                                        │                     │
//! │                                        ▼                     │
//! │              outcomes[i] written once per item               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use regseed_fanout::{run, Outcome};
//!
//! # async fn demo() -> Result<(), regseed_fanout::WorkerPoolError> {
//! let outcomes = run(vec!["a", "b"], 2, |item: &'static str| async move {
//!     Ok::<_, String>(item.to_uppercase())
//! })
//! .await?;
//!
//! assert_eq!(outcomes[0], Outcome::Success("A".to_string()));
//! # Ok(())
//! # }
//! ```

mod duration_millis;
pub mod reliability;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::reliability::{retry, retry_if, RetryPolicy};
    pub use crate::worker::{
        run, summarize, ActionFailure, Outcome, RunSummary, WorkerPool, WorkerPoolConfig,
        WorkerPoolError, WorkerPoolStatus,
    };
}

// Re-export key types at crate root
pub use reliability::RetryPolicy;
pub use worker::{
    run, summarize, ActionFailure, Outcome, RunSummary, WorkerPool, WorkerPoolConfig,
    WorkerPoolError, WorkerPoolStatus,
};

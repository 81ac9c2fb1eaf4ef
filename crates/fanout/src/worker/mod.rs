//! Worker pool for bounded fan-out
//!
//! This module provides:
//! - [`WorkerPool`] - Fixed-size pool that runs one action per item
//! - [`run`] - Scoped helper that builds a pool, runs the items and shuts it down
//! - [`Outcome`] - Per-item success or captured failure
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WorkerPool                             │
//! │  ┌──────────────────┐        ┌──────────────────────────┐   │
//! │  │  Dispatch loop   │──────► │  Slots (Semaphore, N)    │   │
//! │  │  (input order)   │        │  acquire before spawn    │   │
//! │  └──────────────────┘        └────────────┬─────────────┘   │
//! │                                           ▼                  │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │        Task set (JoinSet, aborted on drop)          │    │
//! │  │  [Item 1] [Item 2] [Item 3] ... [Item N]            │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │                                           │                  │
//! │                                           ▼                  │
//! │             Outcome slots, indexed by input position         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use regseed_fanout::worker::{WorkerPool, WorkerPoolConfig};
//!
//! let pool = WorkerPool::new(WorkerPoolConfig::new(4).with_pool_id("seed"))?;
//!
//! let outcomes = pool
//!     .run(namespaces, |namespace| async move { push_namespace(namespace).await })
//!     .await?;
//!
//! pool.shutdown().await?;
//! ```

mod outcome;
mod pool;

pub use outcome::{summarize, ActionFailure, Outcome, RunSummary};
pub use pool::{run, WorkerPool, WorkerPoolConfig, WorkerPoolError, WorkerPoolStatus};

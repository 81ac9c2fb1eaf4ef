//! Worker pool for bounded fan-out
//!
//! Runs one action per item with a fixed number of slots and collects the
//! outcomes in input order.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::outcome::{summarize, ActionFailure, Outcome};

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Pool ID used in logs (generated if not provided)
    pub pool_id: String,

    /// Maximum number of actions running at the same time
    pub max_concurrency: usize,

    /// How long `shutdown` waits for in-flight actions
    #[serde(with = "crate::duration_millis")]
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            pool_id: format!("pool-{}", Uuid::now_v7()),
            max_concurrency: 4,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerPoolConfig {
    /// Create a configuration with the given number of slots
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            ..Default::default()
        }
    }

    /// Set the pool ID
    pub fn with_pool_id(mut self, id: impl Into<String>) -> Self {
        self.pool_id = id.into();
        self
    }

    /// Set maximum concurrency
    ///
    /// Not clamped: zero is rejected by [`WorkerPoolConfig::validate`].
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Set shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), WorkerPoolError> {
        if self.max_concurrency == 0 {
            return Err(WorkerPoolError::Configuration(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.pool_id.trim().is_empty() {
            return Err(WorkerPoolError::Configuration(
                "pool_id must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Worker pool status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPoolStatus {
    /// Accepting and running work
    Running,
    /// Shutdown requested; in-flight actions are finishing, nothing new starts
    Draining,
    /// Shut down; the pool cannot be reused
    Stopped,
}

/// Worker pool errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerPoolError {
    /// Invalid pool configuration, reported before anything is dispatched
    #[error("invalid worker pool configuration: {0}")]
    Configuration(String),

    /// The pool was used after it was shut down
    #[error("worker pool has been shut down")]
    PoolShutdown,

    /// Shutdown timeout
    #[error("graceful shutdown timed out with {remaining} action(s) still running")]
    ShutdownTimeout { remaining: usize },
}

/// Fixed-size pool that runs one action per item
///
/// # Example
///
/// ```ignore
/// use regseed_fanout::worker::{WorkerPool, WorkerPoolConfig};
///
/// let pool = WorkerPool::new(WorkerPoolConfig::new(2))?;
///
/// let outcomes = pool
///     .run(vec!["a", "b", "c"], |item| async move { Ok::<_, String>(item.len()) })
///     .await?;
///
/// pool.shutdown().await?;
/// ```
pub struct WorkerPool {
    config: WorkerPoolConfig,
    slots: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    status: RwLock<WorkerPoolStatus>,
}

impl WorkerPool {
    /// Create a new worker pool
    pub fn new(config: WorkerPoolConfig) -> Result<Self, WorkerPoolError> {
        config.validate()?;

        debug!(
            pool_id = %config.pool_id,
            max_concurrency = config.max_concurrency,
            "Created worker pool"
        );

        Ok(Self {
            slots: Arc::new(Semaphore::new(config.max_concurrency)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            status: RwLock::new(WorkerPoolStatus::Running),
            config,
        })
    }

    /// Run `action` once per item and return the outcomes in input order
    ///
    /// At most `max_concurrency` actions run at once; items are dispatched in
    /// the order given as slots free up. An error or panic in one action is
    /// recorded in that item's outcome and does not affect the others. Items
    /// that could not be dispatched because the pool was shut down meanwhile
    /// are recorded as [`ActionFailure::Cancelled`].
    ///
    /// Returns only after every item has an outcome. Dropping the returned
    /// future aborts any actions it started.
    #[instrument(skip_all, fields(pool_id = %self.config.pool_id))]
    pub async fn run<I, T, V, E, F, Fut>(
        &self,
        items: I,
        action: F,
    ) -> Result<Vec<Outcome<V, E>>, WorkerPoolError>
    where
        I: IntoIterator<Item = T>,
        T: Send + 'static,
        V: Send + 'static,
        E: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        if self.status() != WorkerPoolStatus::Running {
            return Err(WorkerPoolError::PoolShutdown);
        }

        let items: Vec<T> = items.into_iter().collect();
        if items.is_empty() {
            debug!("No items to run");
            return Ok(Vec::new());
        }

        let total = items.len();
        info!(
            total,
            max_concurrency = self.config.max_concurrency,
            "Dispatching items"
        );

        let action = Arc::new(action);
        let mut outcomes: Vec<Option<Outcome<V, E>>> = (0..total).map(|_| None).collect();
        let mut tasks = JoinSet::new();
        let mut positions = HashMap::with_capacity(total);

        for (index, item) in items.into_iter().enumerate() {
            // Fair semaphore: waiters are served in the order they queued
            let permit = match Arc::clone(&self.slots).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    debug!(index, "Pool closed, item not dispatched");
                    outcomes[index] = Some(Outcome::Failure(ActionFailure::Cancelled));
                    continue;
                }
            };

            let guard = InFlightGuard::enter(&self.in_flight);
            let action = Arc::clone(&action);

            let handle = tasks.spawn(async move {
                let result = action(item).await;
                drop(guard);
                drop(permit);
                (index, result)
            });
            positions.insert(handle.id(), index);
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(value))) => {
                    debug!(index, "Item succeeded");
                    outcomes[index] = Some(Outcome::Success(value));
                }
                Ok((index, Err(error))) => {
                    debug!(index, "Item failed");
                    outcomes[index] = Some(Outcome::Failure(ActionFailure::Error(error)));
                }
                Err(join_error) => {
                    let Some(index) = positions.get(&join_error.id()).copied() else {
                        warn!(task_id = %join_error.id(), "Joined unknown task");
                        continue;
                    };
                    let failure = if join_error.is_panic() {
                        let message = panic_message(join_error.into_panic());
                        warn!(index, panic = %message, "Item panicked");
                        ActionFailure::Panicked(message)
                    } else {
                        ActionFailure::Cancelled
                    };
                    outcomes[index] = Some(Outcome::Failure(failure));
                }
            }
        }

        let outcomes: Vec<Outcome<V, E>> = outcomes
            .into_iter()
            .map(|slot| slot.unwrap_or(Outcome::Failure(ActionFailure::Cancelled)))
            .collect();

        let summary = summarize(&outcomes);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "All items finished"
        );

        Ok(outcomes)
    }

    /// Shutdown the worker pool gracefully
    ///
    /// Stops dispatching, waits for in-flight actions up to the configured
    /// timeout, then marks the pool stopped. Calling it on a stopped pool is a
    /// no-op.
    #[instrument(skip(self), fields(pool_id = %self.config.pool_id))]
    pub async fn shutdown(&self) -> Result<(), WorkerPoolError> {
        if self.status() == WorkerPoolStatus::Stopped {
            return Ok(());
        }

        debug!("Initiating graceful shutdown");

        // Close first so anyone who observes Draining also sees dispatch stopped
        self.slots.close();
        *self.status.write() = WorkerPoolStatus::Draining;

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;

        loop {
            let remaining = self.in_flight();
            if remaining == 0 {
                debug!("All actions completed");
                break;
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(remaining, "Shutdown timeout reached");
                return Err(WorkerPoolError::ShutdownTimeout { remaining });
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        *self.status.write() = WorkerPoolStatus::Stopped;

        debug!("Worker pool stopped");
        Ok(())
    }

    /// Get current status
    pub fn status(&self) -> WorkerPoolStatus {
        *self.status.read()
    }

    /// Number of actions currently executing
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Get the pool ID
    pub fn pool_id(&self) -> &str {
        &self.config.pool_id
    }

    /// Get the configured number of slots
    pub fn max_concurrency(&self) -> usize {
        self.config.max_concurrency
    }
}

/// Run `action` over `items` on a pool scoped to this call
///
/// Fails with [`WorkerPoolError::Configuration`] when `concurrency` is zero,
/// without invoking the action. The pool is shut down before returning.
pub async fn run<I, T, V, E, F, Fut>(
    items: I,
    concurrency: usize,
    action: F,
) -> Result<Vec<Outcome<V, E>>, WorkerPoolError>
where
    I: IntoIterator<Item = T>,
    T: Send + 'static,
    V: Send + 'static,
    E: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
{
    let pool = WorkerPool::new(WorkerPoolConfig::new(concurrency))?;
    let outcomes = pool.run(items, action).await;
    pool.shutdown().await?;
    outcomes
}

/// Counts an action as in flight until dropped, including on panic
struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

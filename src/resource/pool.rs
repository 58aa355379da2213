//! Bounded concurrent task pool
//!
//! Runs submitted futures with at most `limit` in flight. Completed results
//! are handed, one at a time and in completion order, to a collector running
//! on the caller's task, so the collector can fold into plain `&mut` state.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::instrument::WithSubscriber;

pub struct TaskPool<T, E> {
    permits: Arc<Semaphore>,
    tasks: JoinSet<Result<T, E>>,
}

impl<T, E> TaskPool<T, E>
where
    T: Send + 'static,
    E: From<JoinError> + Send + 'static,
{
    /// Create a pool running at most `limit` tasks at once (minimum 1)
    pub fn new(limit: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit.max(1))),
            tasks: JoinSet::new(),
        }
    }

    /// Submit a unit of work. It starts as soon as a permit is free.
    pub fn add_task<F>(&mut self, task: F)
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.tasks.spawn(
            async move {
                // The semaphore is never closed while the pool is alive
                let _permit = permits.acquire_owned().await;
                task.await
            }
            .with_current_subscriber(),
        );
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every submitted task, feeding successful results to `collect`.
    ///
    /// Returns the first task error encountered. Sibling tasks are not
    /// cancelled on error; they run to completion and their results are
    /// still collected.
    pub async fn wait<C>(mut self, mut collect: C) -> Result<(), E>
    where
        C: FnMut(T),
    {
        let mut first_error = None;

        while let Some(joined) = self.tasks.join_next().await {
            match joined.map_err(E::from).and_then(|r| r) {
                Ok(value) => collect(value),
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

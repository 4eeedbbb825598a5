//! Task Supervisor
//!
//! Runs the pipeline's long-lived tasks in one `JoinSet` and ties their
//! lifetimes together: the first task to fail (or panic) cancels the shared
//! token, every other task winds down at its next suspension point, and
//! `run` reports that first failure.

use std::future::Future;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::fallback::FallbackError;
use crate::infrastructure::feed::FeedError;
use crate::infrastructure::health::HealthServerError;

/// Failure of a supervised task.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The feed connector hit a fatal error.
    #[error("feed connector failed: {0}")]
    Feed(#[from] FeedError),

    /// The dispatcher could not stage a failed batch.
    #[error("batch dispatcher failed: {0}")]
    Dispatcher(#[source] FallbackError),

    /// The drain loop could not read or update the fallback store.
    #[error("drain loop failed: {0}")]
    Drain(#[source] FallbackError),

    /// The health server stopped.
    #[error("health server failed: {0}")]
    Health(#[from] HealthServerError),

    /// A task panicked or was aborted.
    #[error("task panicked: {0}")]
    Panicked(String),
}

type TaskResult = (&'static str, Result<(), SupervisorError>);

/// Supervises a set of named tasks.
pub struct Supervisor {
    tasks: JoinSet<TaskResult>,
    cancel: CancellationToken,
}

impl Supervisor {
    /// Create a supervisor around a shutdown token.
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            cancel,
        }
    }

    /// Number of tasks still running.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no tasks are running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawn a named task.
    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), SupervisorError>> + Send + 'static,
    {
        tracing::debug!(task = name, "Spawning task");
        self.tasks.spawn(async move { (name, task.await) });
    }

    /// Wait for every task to finish.
    ///
    /// # Errors
    ///
    /// Returns the first task failure; later failures are logged.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let mut first_error: Option<SupervisorError> = None;

        while let Some(joined) = self.tasks.join_next().await {
            let error = match joined {
                Ok((name, Ok(()))) => {
                    tracing::info!(task = name, "Task finished");
                    continue;
                }
                Ok((name, Err(e))) => {
                    tracing::error!(task = name, error = %e, "Task failed, shutting down");
                    e
                }
                Err(e) => {
                    tracing::error!(error = %e, "Task panicked, shutting down");
                    SupervisorError::Panicked(e.to_string())
                }
            };

            self.cancel.cancel();
            if first_error.is_none() {
                first_error = Some(error);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

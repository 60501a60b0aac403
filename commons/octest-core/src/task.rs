//! One background job running next to a foreground wait.
//!
//! `join` never cancels: it waits for the job to finish. Dropping an
//! un-joined async job aborts it. A blocking job cannot be aborted, so a
//! dropped one keeps running detached until its command returns.

use std::future::Future;
use std::time::Duration;

use octest_cli::{CliError, CommandBuilder};
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("background task `{0}` panicked")]
    Panicked(String),

    #[error("background task `{0}` was cancelled")]
    Cancelled(String),

    #[error("background task `{name}` still running after {timeout:?}")]
    TimedOut { name: String, timeout: Duration },
}

pub struct BackgroundTask<T> {
    name: String,
    handle: Option<JoinHandle<T>>,
    blocking: bool,
}

impl<T: Send + 'static> BackgroundTask<T> {
    pub fn spawn<F>(name: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let name = name.into();
        debug!(task = %name, "starting background task");
        Self {
            name,
            handle: Some(tokio::spawn(future)),
            blocking: false,
        }
    }

    /// Run a blocking closure (typically a long CLI call) on the blocking
    /// pool.
    pub fn spawn_blocking<F>(name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let name = name.into();
        debug!(task = %name, "starting blocking background task");
        Self {
            name,
            handle: Some(tokio::task::spawn_blocking(f)),
            blocking: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the task to finish.
    pub async fn join(mut self) -> Result<T, TaskError> {
        let Some(handle) = self.handle.take() else {
            return Err(TaskError::Cancelled(self.name.clone()));
        };
        let result = handle.await;
        self.finish(result)
    }

    /// Wait at most `timeout`; on expiry an async task is aborted.
    pub async fn join_within(
        mut self,
        timeout: Duration,
    ) -> Result<T, TaskError> {
        let Some(mut handle) = self.handle.take() else {
            return Err(TaskError::Cancelled(self.name.clone()));
        };
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(result) => self.finish(result),
            Err(_) => {
                if self.blocking {
                    warn!(task = %self.name, "blocking task left running after join timeout");
                } else {
                    handle.abort();
                }
                Err(TaskError::TimedOut {
                    name: self.name.clone(),
                    timeout,
                })
            }
        }
    }

    fn finish(&self, result: Result<T, JoinError>) -> Result<T, TaskError> {
        match result {
            Ok(value) => {
                debug!(task = %self.name, "background task joined");
                Ok(value)
            }
            Err(e) if e.is_panic() => Err(TaskError::Panicked(self.name.clone())),
            Err(_) => Err(TaskError::Cancelled(self.name.clone())),
        }
    }
}

impl BackgroundTask<Result<String, CliError>> {
    /// Run a CLI command in the background, e.g. a diagnostics collector.
    pub fn command(name: impl Into<String>, command: CommandBuilder) -> Self {
        Self::spawn_blocking(name, move || command.output())
    }
}

impl<T> Drop for BackgroundTask<T> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.is_finished() {
            return;
        }
        if self.blocking {
            warn!(task = %self.name, "background task dropped without join, left running");
        } else {
            warn!(task = %self.name, "background task dropped without join, aborting");
            handle.abort();
        }
    }
}

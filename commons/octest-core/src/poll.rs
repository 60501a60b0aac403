//! Poll-until-converged helper.
//!
//! A check is evaluated every `interval` until it reports [`Readiness::Ready`],
//! fails permanently, or the `timeout` budget is spent. Transient errors are
//! logged and retried; they never reach the caller except as the last
//! observed error inside [`PollError::Timeout`].

use std::future::Future;
use std::time::Duration;

use octest_cli::CliError;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// Result of one evaluation of a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness<T = ()> {
    Ready(T),
    Pending,
}

impl From<bool> for Readiness<()> {
    fn from(done: bool) -> Self {
        if done { Readiness::Ready(()) } else { Readiness::Pending }
    }
}

impl<T> From<Option<T>> for Readiness<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Readiness::Ready(value),
            None => Readiness::Pending,
        }
    }
}

/// Why a check could not decide.
///
/// Conversions from [`anyhow::Error`] and [`CliError`] are transient, so `?`
/// inside a check retries by default. Use [`CheckError::permanent`] to stop
/// polling immediately.
#[derive(Debug)]
pub enum CheckError {
    Transient(anyhow::Error),
    Permanent(anyhow::Error),
}

impl CheckError {
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        CheckError::Transient(err.into())
    }

    pub fn permanent(err: impl Into<anyhow::Error>) -> Self {
        CheckError::Permanent(err.into())
    }
}

impl std::fmt::Display for CheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckError::Transient(e) => write!(f, "transient: {e:#}"),
            CheckError::Permanent(e) => write!(f, "permanent: {e:#}"),
        }
    }
}

impl From<anyhow::Error> for CheckError {
    fn from(err: anyhow::Error) -> Self {
        CheckError::Transient(err)
    }
}

impl From<CliError> for CheckError {
    fn from(err: CliError) -> Self {
        CheckError::Transient(err.into())
    }
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error(
        "{message}: timed out after {elapsed:?} ({attempts} attempts){}",
        last_error_suffix(.last_error)
    )]
    Timeout {
        message: String,
        elapsed: Duration,
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("{message}: failed permanently (attempt {attempts})")]
    Permanent {
        message: String,
        attempts: u32,
        source: anyhow::Error,
    },
}

impl PollError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::Timeout { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            PollError::Timeout { attempts, .. }
            | PollError::Permanent { attempts, .. } => *attempts,
        }
    }
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(err) => format!(", last error: {err}"),
        None => String::new(),
    }
}

/// Fixed-interval poller with a total time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    interval: Duration,
    timeout: Duration,
    immediate: bool,
}

impl Poller {
    /// First check runs after one `interval`.
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            immediate: false,
        }
    }

    /// Run the first check right away instead of after one interval.
    pub const fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    /// Budget for processing a template: 3s apart, 15s total.
    pub const fn render() -> Self {
        Self::new(Duration::from_secs(3), Duration::from_secs(15)).immediate()
    }

    /// Budget for an object to disappear after deletion.
    pub const fn deletion() -> Self {
        Self::new(Duration::from_secs(3), Duration::from_secs(120)).immediate()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Poll `check` until it is ready, fails permanently or time runs out.
    ///
    /// `message` describes what is being waited for and prefixes the error.
    pub async fn until<T, F, Fut>(
        &self,
        message: impl Into<String>,
        mut check: F,
    ) -> Result<T, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Readiness<T>, CheckError>>,
    {
        let message = message.into();
        let start = Instant::now();
        // roughly 30 years, as tokio does for unbounded timeouts
        let deadline = start
            .checked_add(self.timeout)
            .unwrap_or_else(|| start + Duration::from_secs(86400 * 365 * 30));
        let mut attempts = 0u32;
        let mut last_error = None;

        if !self.immediate {
            sleep(self.interval.min(self.timeout)).await;
        }

        loop {
            attempts += 1;
            match check().await {
                Ok(Readiness::Ready(value)) => {
                    debug!(
                        attempts,
                        elapsed = ?start.elapsed(),
                        "{message}: converged"
                    );
                    return Ok(value);
                }
                Ok(Readiness::Pending) => {
                    debug!(attempts, "{message}: not yet, try next round");
                }
                Err(CheckError::Transient(err)) => {
                    let err = format!("{err:#}");
                    debug!(attempts, error = %err, "{message}: try next round");
                    last_error = Some(err);
                }
                Err(CheckError::Permanent(source)) => {
                    warn!(attempts, error = %format!("{source:#}"), "{message}: giving up");
                    return Err(PollError::Permanent {
                        message,
                        attempts,
                        source,
                    });
                }
            }

            let now = Instant::now();
            if now >= deadline {
                let elapsed = now - start;
                warn!(attempts, ?elapsed, "{message}: timed out");
                return Err(PollError::Timeout {
                    message,
                    elapsed,
                    attempts,
                    last_error,
                });
            }
            sleep(self.interval.min(deadline - now)).await;
        }
    }

    /// [`Poller::until`] for checks that answer done / not done.
    pub async fn until_true<F, Fut>(
        &self,
        message: impl Into<String>,
        mut check: F,
    ) -> Result<(), PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, CheckError>>,
    {
        self.until(message, || {
            let fut = check();
            async move { fut.await.map(Readiness::from) }
        })
        .await
    }
}

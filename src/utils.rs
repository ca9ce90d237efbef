// ABOUTME: Utility functions for validation, retry policies, and run deadlines
// ABOUTME: Shared by both pipelines so no module keeps its own retry counter

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use serde::Deserialize;
use std::path::Path;
use std::time::{Duration, Instant};

/// Retry policy for establishing store connections
///
/// Passed explicitly to every connection-establishing function. Each retry
/// doubles the delay up to `max_delay`, optionally adding up to 25% jitter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the initial attempt (0 = single attempt)
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that makes exactly one attempt
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self
            .initial_delay_ms
            .saturating_mul(1u64 << attempt.min(20))
            .min(self.max_delay_ms);

        let jitter = if self.jitter && base > 0 {
            rand::thread_rng().gen_range(0..=base / 4)
        } else {
            0
        };

        Duration::from_millis(base.saturating_add(jitter))
    }
}

/// Retry an async operation according to a [`RetryPolicy`]
///
/// Returns the first success, or the last error once the policy is exhausted.
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use opgrants_migrator::utils::{retry_with_backoff, RetryPolicy};
/// # async fn example() -> Result<()> {
/// let result = retry_with_backoff(|| async { Ok("success") }, &RetryPolicy::default()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T>(mut operation: F, policy: &RetryPolicy) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..=policy.max_retries {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt < policy.max_retries {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        "Operation failed (attempt {}/{}): {:#}; retrying in {:?}...",
                        attempt + 1,
                        policy.max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Operation failed after retries")))
}

/// Blocking counterpart of [`retry_with_backoff`] for synchronous stores
pub fn retry_blocking<F, T>(mut operation: F, policy: &RetryPolicy) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut last_error = None;

    for attempt in 0..=policy.max_retries {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt < policy.max_retries {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        "Operation failed (attempt {}/{}): {:#}; retrying in {:?}...",
                        attempt + 1,
                        policy.max_retries + 1,
                        e,
                        delay
                    );
                    std::thread::sleep(delay);
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Operation failed after retries")))
}

/// Optional wall-clock limit for a whole run
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Option<Instant>,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn after(limit: Option<Duration>) -> Self {
        Self {
            expires_at: limit.map(|l| Instant::now() + l),
            limit,
        }
    }

    pub fn unbounded() -> Self {
        Self::after(None)
    }

    /// Time left, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn check(&self) -> Result<()> {
        if let (Some(at), Some(limit)) = (self.expires_at, self.limit) {
            if Instant::now() >= at {
                bail!("Run deadline of {:?} exceeded", limit);
            }
        }
        Ok(())
    }

    /// Await `fut`, failing once the deadline passes
    pub async fn run<F, T>(&self, what: &str, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        match self.remaining() {
            None => fut.await,
            Some(left) => match tokio::time::timeout(left, fut).await {
                Ok(result) => result,
                Err(_) => bail!("Timed out waiting for {} (run deadline exceeded)", what),
            },
        }
    }
}

/// Validate the path of a SQLite database that must already exist
pub fn validate_sqlite_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("SQLite database path cannot be empty");
    }

    if !path.exists() {
        bail!("SQLite database '{}' does not exist", path.display());
    }

    if !path.is_file() {
        bail!("SQLite database path '{}' is not a regular file", path.display());
    }

    Ok(())
}

/// Row-level progress bar in the style used by every command
pub fn progress_bar(len: u64) -> Result<ProgressBar> {
    let progress = ProgressBar::new(len);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("##-"),
    );
    Ok(progress)
}

/// Sanitize an identifier for display
///
/// Removes control characters and limits length to keep log lines readable.
///
/// ```
/// # use opgrants_migrator::utils::sanitize_identifier;
/// assert_eq!(sanitize_identifier("businessLGA"), "businessLGA");
/// assert_eq!(sanitize_identifier("col\nname"), "colname");
/// ```
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            jitter: false,
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay_ms: 100,
            max_delay_ms: 350,
            jitter: false,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(10), Duration::from_millis(350));
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let policy = RetryPolicy {
            max_retries: 1,
            initial_delay_ms: 400,
            max_delay_ms: 400,
            jitter: true,
        };
        for _ in 0..20 {
            let delay = policy.delay_for(0);
            assert!(delay >= Duration::from_millis(400));
            assert!(delay <= Duration::from_millis(500));
        }
    }

    #[test]
    fn test_jitter_saturates_at_huge_delays() {
        let policy = RetryPolicy {
            max_retries: 1,
            initial_delay_ms: u64::MAX,
            max_delay_ms: u64::MAX,
            jitter: true,
        };
        for attempt in 0..3 {
            assert_eq!(policy.delay_for(attempt), Duration::from_millis(u64::MAX));
        }
    }

    #[tokio::test]
    async fn test_retry_with_backoff_success() {
        let mut attempts = 0;
        let result = retry_with_backoff(
            || {
                attempts += 1;
                async move {
                    if attempts < 3 {
                        anyhow::bail!("Temporary failure")
                    } else {
                        Ok("Success")
                    }
                }
            },
            &fast_policy(5),
        )
        .await;

        assert_eq!(result.unwrap(), "Success");
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_with_backoff_failure() {
        let mut attempts = 0;
        let result: Result<&str> = retry_with_backoff(
            || {
                attempts += 1;
                async move { anyhow::bail!("Permanent failure") }
            },
            &fast_policy(2),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 3); // Initial + 2 retries
    }

    #[test]
    fn test_retry_blocking_single_attempt() {
        let mut attempts = 0;
        let result: Result<()> = retry_blocking(
            || {
                attempts += 1;
                anyhow::bail!("nope")
            },
            &RetryPolicy::none(),
        );
        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_deadline_unbounded_never_expires() {
        let deadline = Deadline::unbounded();
        assert!(deadline.check().is_ok());
        assert!(deadline.remaining().is_none());
    }

    #[test]
    fn test_deadline_expired() {
        let deadline = Deadline::after(Some(Duration::ZERO));
        let err = deadline.check().unwrap_err();
        assert!(err.to_string().contains("deadline"));
    }

    #[tokio::test]
    async fn test_deadline_times_out_future() {
        let deadline = Deadline::after(Some(Duration::from_millis(10)));
        let result: Result<()> = deadline
            .run("sleep", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(result.unwrap_err().to_string().contains("Timed out"));
    }

    #[test]
    fn test_validate_sqlite_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_sqlite_path(Path::new("")).is_err());
        assert!(validate_sqlite_path(&dir.path().join("missing.db")).is_err());
        assert!(validate_sqlite_path(dir.path()).is_err());

        let file = dir.path().join("kaddep.db");
        std::fs::write(&file, b"").unwrap();
        assert!(validate_sqlite_path(&file).is_ok());
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("table\x00name"), "tablename");
        let long_name = "a".repeat(200);
        assert_eq!(sanitize_identifier(&long_name).len(), 100);
    }
}

//! A continuous write/read stream over a sequence of bounded, content-hashed
//! objects, with retry on transport faults and hash mismatches (§4.3, §4.4).

pub mod reader;
pub mod writer;

pub use reader::ChunkedReader;
pub use writer::ChunkedWriter;

use crate::error::Error;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Fixed-delay retry, scaled by `--ratio` at the CLI layer (§6). `None`
/// for `max_attempts` retries indefinitely, matching the metadata-upload
/// contract in §4.6 ("retry indefinitely with 5-second backoff").
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn scaled(ratio: f64) -> Self {
        RetryPolicy {
            delay: Duration::from_secs_f64(5.0 * ratio.max(0.0)),
            max_attempts: Some(5),
        }
    }

    /// The metadata-upload policy (§4.6): never gives up.
    pub fn unbounded(ratio: f64) -> Self {
        RetryPolicy {
            delay: Duration::from_secs_f64(5.0 * ratio.max(0.0)),
            max_attempts: None,
        }
    }

    #[cfg(test)]
    pub fn fast_test() -> Self {
        RetryPolicy {
            delay: Duration::from_millis(1),
            max_attempts: Some(3),
        }
    }
}

/// Errors that represent a fault in the transport or a verifiable integrity
/// mismatch are worth retrying; configuration and closed-stream errors are
/// not (§7).
fn is_retryable(err: &Error) -> bool {
    matches!(
        err,
        Error::TransientTransport(_) | Error::ContentHashMismatch { .. } | Error::Io(_)
    )
}

pub(crate) async fn retry<T, F, Fut>(policy: RetryPolicy, mut attempt_fn: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(err) if is_retryable(&err) => {
                if let Some(max) = policy.max_attempts {
                    if attempt >= max {
                        return Err(err);
                    }
                }
                warn!(attempt, error = %err, "retrying after backoff");
                tokio::time::sleep(policy.delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_succeeds_on_nth_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, Error> = retry(RetryPolicy::fast_test(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::TransientTransport("flaky".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_does_not_retry_config_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = retry(RetryPolicy::fast_test(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(Error::Config("bad cipher name".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = retry(RetryPolicy::fast_test(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(Error::TransientTransport("always flaky".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

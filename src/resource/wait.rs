//! Status polling for asynchronous APIs

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error, PartialEq)]
pub enum WaitError {
    #[error("timeout while waiting for state to become '{}' (last state: '{last}', timeout: {timeout:?})", target.join(", "))]
    Timeout {
        target: Vec<String>,
        last: String,
        timeout: Duration,
    },
    #[error("unexpected state '{state}', wanted target '{}'{}", target.join(", "), reason.as_ref().map(|r| format!(". last error: {r}")).unwrap_or_default())]
    UnexpectedState {
        state: String,
        target: Vec<String>,
        reason: Option<String>,
    },
    #[error("couldn't find resource (target: '{}')", target.join(", "))]
    NotFound { target: Vec<String> },
}

/// One poll result: the current object and its status, or `None` if gone
pub type Observed<T> = Option<(T, String)>;

/// Waits for an object's status to move from a pending set into a target set.
///
/// An empty target set means "wait until the object is gone".
#[derive(Debug, Clone)]
pub struct StatusWaiter {
    pub pending: Vec<String>,
    pub target: Vec<String>,
    pub timeout: Duration,
    pub delay: Duration,
    pub poll_interval: Duration,
}

impl StatusWaiter {
    pub fn new(pending: &[&str], target: &[&str], timeout: Duration) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            timeout,
            delay: Duration::ZERO,
            poll_interval: Duration::from_secs(10),
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Poll `refresh` until a target status (or disappearance, for an empty
    /// target set). Returns the last observed object.
    pub async fn wait<T, F, Fut>(&self, mut refresh: F) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observed<T>>>,
    {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let deadline = Instant::now() + self.timeout;
        let mut last_status: String;

        loop {
            match refresh().await? {
                None if self.target.is_empty() => return Ok(None),
                None => {
                    return Err(WaitError::NotFound {
                        target: self.target.clone(),
                    }
                    .into())
                }
                Some((object, status)) => {
                    if self.target.contains(&status) {
                        return Ok(Some(object));
                    }
                    if !self.pending.contains(&status) {
                        return Err(WaitError::UnexpectedState {
                            state: status,
                            target: self.target.clone(),
                            reason: None,
                        }
                        .into());
                    }
                    tracing::debug!("Waiting: status '{}' (target {:?})", status, self.target);
                    last_status = status;
                }
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(WaitError::Timeout {
                    target: self.target.clone(),
                    last: last_status,
                    timeout: self.timeout,
                }
                .into());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Retry `op` while `retryable` says the error is transient (e.g. IAM
/// propagation), up to `timeout`
pub async fn retry_when<T, E, F, Fut, P>(
    timeout: Duration,
    interval: Duration,
    mut op: F,
    retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let deadline = Instant::now() + timeout;
    loop {
        match op().await {
            Err(err) if retryable(&err) && Instant::now() + interval <= deadline => {
                tracing::warn!("Retrying after transient error: {}", err);
                tokio::time::sleep(interval).await;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_reaches_target() {
        let polls = &AtomicUsize::new(0);
        let waiter = StatusWaiter::new(&["Creating"], &["Available"], Duration::from_secs(60))
            .poll_interval(Duration::from_secs(5));
        let result = waiter
            .wait(move || async move {
                let n = polls.fetch_add(1, Ordering::SeqCst);
                let status = if n < 2 { "Creating" } else { "Available" };
                Ok(Some((n, status.to_string())))
            })
            .await
            .unwrap();
        assert_eq!(result, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_state() {
        let waiter = StatusWaiter::new(&["Creating"], &["Available"], Duration::from_secs(60));
        let err = waiter
            .wait(|| async { Ok(Some(((), "Failed".to_string()))) })
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WaitError>(),
            Some(WaitError::UnexpectedState { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let waiter = StatusWaiter::new(&["Creating"], &["Available"], Duration::from_secs(30))
            .poll_interval(Duration::from_secs(10));
        let err = waiter
            .wait(|| async { Ok(Some(((), "Creating".to_string()))) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timeout"));
        match err.downcast_ref::<WaitError>() {
            Some(WaitError::Timeout { last, .. }) => assert_eq!(last, "Creating"),
            other => panic!("expected a timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_target_waits_for_gone() {
        let polls = &AtomicUsize::new(0);
        let waiter = StatusWaiter::new(&["Deleting"], &[], Duration::from_secs(60));
        let result: Option<()> = waiter
            .wait(move || async move {
                if polls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(Some(((), "Deleting".to_string())))
                } else {
                    Ok(None)
                }
            })
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_when_transient() {
        let calls = &AtomicUsize::new(0);
        let result: Result<u32, String> = retry_when(
            Duration::from_secs(60),
            Duration::from_secs(1),
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err("role cannot be assumed".to_string())
                } else {
                    Ok(7)
                }
            },
            |e| e.contains("assumed"),
        )
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}

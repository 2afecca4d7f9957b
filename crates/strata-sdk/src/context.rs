//! Caller-supplied deadline and cancellation for memory and provider calls.
//!
//! Every operation that may wait on I/O takes a [`RequestContext`]. When the
//! token fires or the deadline passes, the in-flight future is dropped and the
//! operation returns [`StrataError::Cancelled`].

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{CancelReason, StrataError, StrataResult};

/// Deadline and cancellation token carried by a single logical request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl RequestContext {
    /// A context with no deadline that is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            token: CancellationToken::new(),
        }
    }

    /// Attach an explicit deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Use a caller-owned cancellation token.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Derive a context whose token is cancelled with this one but can also be
    /// cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            token: self.token.child_token(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Return an error if the context is already done.
    pub fn check(&self, operation: &'static str, id: Option<&str>) -> StrataResult<()> {
        if self.token.is_cancelled() {
            return Err(StrataError::cancelled(operation, id, CancelReason::Cancelled));
        }
        if matches!(self.deadline, Some(d) if Instant::now() >= d) {
            return Err(StrataError::cancelled(operation, id, CancelReason::DeadlineExceeded));
        }
        Ok(())
    }

    /// Drive `fut` until it completes, the token fires, or the deadline passes.
    pub async fn run<F, T>(&self, operation: &'static str, id: Option<&str>, fut: F) -> StrataResult<T>
    where
        F: Future<Output = StrataResult<T>>,
    {
        self.check(operation, id)?;

        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                Err(StrataError::cancelled(operation, id, CancelReason::Cancelled))
            }
            _ = deadline => {
                Err(StrataError::cancelled(operation, id, CancelReason::DeadlineExceeded))
            }
            result = fut => result,
        }
    }

    /// Sleep for `duration`, waking early with an error if the context ends.
    pub async fn sleep(&self, operation: &'static str, duration: Duration) -> StrataResult<()> {
        self.run(operation, None, async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = RequestContext::background();
        let value = ctx.run("op", None, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert!(ctx.remaining().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_abandons_slow_future() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(50));
        let err = ctx
            .run("retrieve", Some("item-1"), async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        match err {
            StrataError::Cancelled { operation, id, reason } => {
                assert_eq!(operation, "retrieve");
                assert_eq!(id.as_deref(), Some("item-1"));
                assert_eq!(reason, CancelReason::DeadlineExceeded);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_propagates_to_child() {
        let parent = RequestContext::background();
        let child = parent.child();
        parent.cancel();

        let err = child.check("store", None).unwrap_err();
        assert!(err.is_cancelled());

        let err = child.run("store", None, async { Ok(()) }).await.unwrap_err();
        assert!(matches!(
            err,
            StrataError::Cancelled { reason: CancelReason::Cancelled, .. }
        ));
    }

    #[tokio::test]
    async fn test_cancel_mid_flight() {
        let ctx = RequestContext::background();
        let handle = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });

        let err = ctx
            .run("query", None, async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}

//! Request-scoped cancellation and deadline.

use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("request cancelled")]
    Cancelled,
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation token plus deadline shared by every stage of one request.
///
/// Cloning is cheap and every clone observes the same cancellation and deadline.
#[derive(Clone, Debug)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Instant,
}

impl RequestContext {
    /// Derives a request context from `parent`; cancelling the parent cancels the request.
    pub fn new(parent: &CancellationToken, timeout: Duration) -> Self {
        RequestContext {
            cancel: parent.child_token(),
            deadline: Instant::now() + timeout,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Why the request stopped, if it has.
    pub fn err(&self) -> Option<ContextError> {
        if Instant::now() >= self.deadline {
            Some(ContextError::DeadlineExceeded)
        } else if self.cancel.is_cancelled() {
            Some(ContextError::Cancelled)
        } else {
            None
        }
    }

    /// Resolves once the request is cancelled or its deadline passes.
    pub async fn done(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = sleep_until(self.deadline) => {}
        }
    }
}

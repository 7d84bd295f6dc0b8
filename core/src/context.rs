//! Bounded, cancellable scope for a single directory probe

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default budget for one connection probe or one search-base query
pub const PROBE_LDAP_TIMEOUT: Duration = Duration::from_secs(90);

/// A probe scope derived from a parent token.
///
/// Cancelling the parent cancels every context derived from it. Dropping a
/// context cancels only its own child token.
#[derive(Debug)]
pub struct ProbeContext {
    token: CancellationToken,
    deadline: Instant,
    timeout: Duration,
}

impl ProbeContext {
    /// Derive a new context from `parent` that expires after `timeout`
    pub fn with_timeout(parent: &CancellationToken, timeout: Duration) -> Self {
        Self {
            token: parent.child_token(),
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.deadline
    }

    /// Run `operation` until it completes, the deadline passes, or the scope is cancelled
    pub async fn run<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(Error::Timeout(self.timeout)),
            result = operation => result,
        }
    }
}

impl Drop for ProbeContext {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

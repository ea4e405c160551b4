//! Per-call cancellation and deadline handling.

use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::error::IncidentError;

/// Caller-supplied limits for one service call.
///
/// `timeout` bounds each individual store or queue call, not the whole
/// operation. Cancellation is only honoured at checkpoints placed before
/// irreversible side effects.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl CallContext {
    pub fn new(cancel: CancellationToken, timeout: Option<Duration>) -> Self {
        Self { cancel, timeout }
    }

    /// Context without a deadline that is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails with [`IncidentError::Cancelled`] if the caller gave up.
    pub fn checkpoint(&self, before: &'static str) -> Result<(), IncidentError> {
        if self.cancel.is_cancelled() {
            return Err(IncidentError::Cancelled(before));
        }
        Ok(())
    }

    /// Runs `fut` under the configured timeout, converting expiry into the
    /// caller's error type.
    pub async fn bounded<F, T, E>(
        &self,
        fut: F,
        on_timeout: impl FnOnce(Duration) -> E,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(on_timeout(limit)),
            },
            None => fut.await,
        }
    }
}

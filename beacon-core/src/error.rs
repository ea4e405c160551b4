use std::time::Duration;

use beacon_model::{IncidentId, ModelError};
use thiserror::Error;

/// Failures talking to the incident record store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("incident not found: {0}")]
    NotFound(IncidentId),

    #[error("incident {0} already exists")]
    DuplicateKey(IncidentId),

    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("record serialization failed: {0}")]
    Serialization(String),

    #[error("record store call timed out after {0:?}")]
    Timeout(Duration),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_)
            | sqlx::Error::Encode(_) => Self::Serialization(err.to_string()),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

/// Failures sending to, receiving from, or acknowledging on a queue.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("failed to send message to queue {queue}: {reason}")]
    Publish { queue: String, reason: String },

    #[error("failed to receive messages from queue {queue}: {reason}")]
    Receive { queue: String, reason: String },

    #[error("failed to acknowledge message on queue {queue}: {reason}")]
    Acknowledge { queue: String, reason: String },

    #[error("receipt handle {0} is unknown or no longer current")]
    StaleReceipt(String),

    #[error("change event codec error: {0}")]
    Codec(#[from] ModelError),

    #[error("queue call timed out after {0:?}")]
    Timeout(Duration),
}

/// Table or queue creation failed. Fatal at process start.
#[derive(Error, Debug)]
#[error("failed to provision {resource}: {reason}")]
pub struct ProvisionError {
    pub resource: String,
    pub reason: String,
}

impl ProvisionError {
    pub fn new(resource: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }
}

/// An event handler could not process a delivered event.
#[derive(Error, Debug)]
#[error("event handler failed: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(reason: impl ToString) -> Self {
        Self(reason.to_string())
    }
}

/// Operation-level failure returned by the incident service.
#[derive(Error, Debug)]
pub enum IncidentError {
    #[error("incident not found: {0}")]
    NotFound(IncidentId),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("incident {0} already exists")]
    DuplicateKey(IncidentId),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("operation cancelled before {0}")]
    Cancelled(&'static str),
}

impl IncidentError {
    /// Whether a caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            IncidentError::NotFound(_)
            | IncidentError::InvalidRequest(_)
            | IncidentError::DuplicateKey(_) => false,
            IncidentError::Store(StoreError::Serialization(_)) => false,
            IncidentError::Store(_)
            | IncidentError::Queue(_)
            | IncidentError::Cancelled(_) => true,
        }
    }
}

impl From<StoreError> for IncidentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => IncidentError::NotFound(id),
            StoreError::DuplicateKey(id) => IncidentError::DuplicateKey(id),
            other => IncidentError::Store(other),
        }
    }
}

impl From<ModelError> for IncidentError {
    fn from(err: ModelError) -> Self {
        IncidentError::InvalidRequest(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IncidentError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type QueueResult<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_maps_to_service_not_found() {
        let err: IncidentError =
            StoreError::NotFound(IncidentId::from("INC1")).into();
        assert!(matches!(err, IncidentError::NotFound(ref id) if id.as_str() == "INC1"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn infrastructure_failures_are_retryable() {
        let err: IncidentError =
            StoreError::Unavailable("connection refused".into()).into();
        assert!(err.is_retryable());

        let err: IncidentError =
            StoreError::Timeout(Duration::from_secs(1)).into();
        assert!(err.is_retryable());
    }
}

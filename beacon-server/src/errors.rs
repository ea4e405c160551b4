use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use beacon_core::{IncidentError, QueueError, StoreError};
use serde_json::json;
use std::fmt;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    /// Stable machine-readable category.
    pub kind: &'static str,
}

impl AppError {
    pub fn new(
        status: StatusCode,
        kind: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            kind,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "duplicate_key", message)
    }

    pub fn unavailable(kind: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, kind, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, "timeout", message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
                "kind": self.kind,
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<IncidentError> for AppError {
    fn from(err: IncidentError) -> Self {
        let message = err.to_string();
        match err {
            IncidentError::NotFound(_) => Self::not_found(message),
            IncidentError::InvalidRequest(_) => Self::bad_request(message),
            IncidentError::DuplicateKey(_) => Self::conflict(message),
            IncidentError::Store(StoreError::Timeout(_))
            | IncidentError::Queue(QueueError::Timeout(_)) => {
                Self::timeout(message)
            }
            IncidentError::Store(StoreError::Serialization(_)) => {
                Self::internal(message)
            }
            IncidentError::Store(_) => {
                Self::unavailable("store_unavailable", message)
            }
            IncidentError::Queue(_) => {
                Self::unavailable("queue_unavailable", message)
            }
            IncidentError::Cancelled(_) => Self::unavailable("cancelled", message),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use beacon_core::model::IncidentId;

    use super::*;

    #[test]
    fn service_errors_map_to_statuses() {
        let cases = [
            (
                IncidentError::NotFound(IncidentId::from("INC1")),
                StatusCode::NOT_FOUND,
            ),
            (
                IncidentError::InvalidRequest("title".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                IncidentError::DuplicateKey(IncidentId::from("INC1")),
                StatusCode::CONFLICT,
            ),
            (
                IncidentError::Store(StoreError::Unavailable("down".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                IncidentError::Store(StoreError::Timeout(Duration::from_secs(1))),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                IncidentError::Cancelled("store write"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }
}

//! HTTP handlers for the incident operations.
//!
//! Each request runs its service call on a detached task. Dropping the
//! request future (client disconnect) cancels the call's token, so the task
//! stops at its next cancellation checkpoint; a mutation that already
//! committed still publishes its change event.
//!
//! Mutations report whether their change event was enqueued through the
//! [`NOTIFICATION_HEADER`] response header (`published` or `failed`). A failed
//! announcement keeps the 2xx status because the write itself succeeded.

use std::future::Future;

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::Json,
};
use beacon_core::{
    CallContext, IncidentError, Notification,
    model::{Incident, IncidentId, NewIncident, StatusUpdate},
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::{
    errors::{AppError, AppResult},
    infra::app_state::AppState,
};

/// Outcome of enqueueing the change event: `published` or `failed`.
pub const NOTIFICATION_HEADER: &str = "x-beacon-notification";
/// Message id of the enqueued change event.
pub const NOTIFICATION_ID_HEADER: &str = "x-beacon-notification-id";
/// Why the change event could not be enqueued.
pub const NOTIFICATION_ERROR_HEADER: &str = "x-beacon-notification-error";

#[derive(Debug, Serialize)]
pub struct DeleteIncidentResponse {
    pub success: bool,
}

fn notification_headers(notification: &Notification) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match notification {
        Notification::Published { message_id } => {
            headers.insert(NOTIFICATION_HEADER, HeaderValue::from_static("published"));
            if let Ok(value) = HeaderValue::from_str(&message_id.0.to_string()) {
                headers.insert(NOTIFICATION_ID_HEADER, value);
            }
        }
        Notification::Failed { reason } => {
            headers.insert(NOTIFICATION_HEADER, HeaderValue::from_static("failed"));
            // Reasons carrying control characters are dropped, the state is not.
            if let Ok(value) = HeaderValue::from_str(reason) {
                headers.insert(NOTIFICATION_ERROR_HEADER, value);
            }
        }
    }
    headers
}

pub(crate) async fn run_detached<T, F, Fut>(
    state: &AppState,
    operation: F,
) -> AppResult<T>
where
    F: FnOnce(CallContext) -> Fut,
    Fut: Future<Output = Result<T, IncidentError>> + Send + 'static,
    T: Send + 'static,
{
    let token = CancellationToken::new();
    let _cancel_on_drop = token.clone().drop_guard();
    let ctx = CallContext::new(token, state.call_timeout);

    match tokio::spawn(operation(ctx)).await {
        Ok(result) => result.map_err(AppError::from),
        Err(join_err) => {
            error!(error = %join_err, "incident operation task failed");
            Err(AppError::internal("incident operation failed"))
        }
    }
}

pub async fn create_incident_handler(
    State(state): State<AppState>,
    payload: Result<Json<NewIncident>, JsonRejection>,
) -> AppResult<(StatusCode, HeaderMap, Json<Incident>)> {
    let Json(request) = payload?;
    let service = state.service();

    let recorded = run_detached(&state, move |ctx| async move {
        service.create_incident(&ctx, request).await
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        notification_headers(&recorded.notification),
        Json(recorded.value),
    ))
}

pub async fn get_incident_handler(
    State(state): State<AppState>,
    Path(incident_id): Path<String>,
) -> AppResult<Json<Incident>> {
    let service = state.service();
    let id = IncidentId::new(incident_id);

    let incident = run_detached(&state, move |ctx| async move {
        service.get_incident(&ctx, &id).await
    })
    .await?;

    Ok(Json(incident))
}

pub async fn update_incident_handler(
    State(state): State<AppState>,
    Path(incident_id): Path<String>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> AppResult<(HeaderMap, Json<Incident>)> {
    let Json(update) = payload?;
    let service = state.service();
    let id = IncidentId::new(incident_id);

    let recorded = run_detached(&state, move |ctx| async move {
        service.update_incident(&ctx, &id, update).await
    })
    .await?;

    Ok((notification_headers(&recorded.notification), Json(recorded.value)))
}

pub async fn delete_incident_handler(
    State(state): State<AppState>,
    Path(incident_id): Path<String>,
) -> AppResult<(HeaderMap, Json<DeleteIncidentResponse>)> {
    let service = state.service();
    let id = IncidentId::new(incident_id);

    let recorded = run_detached(&state, move |ctx| async move {
        service.delete_incident(&ctx, &id).await
    })
    .await?;

    Ok((
        notification_headers(&recorded.notification),
        Json(DeleteIncidentResponse { success: true }),
    ))
}

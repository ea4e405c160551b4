use axum::{
    Router,
    routing::{get, post},
};

use crate::{AppState, handlers::incidents};

pub const INCIDENTS: &str = "/incidents";
pub const INCIDENT_ITEM: &str = "/incidents/{incident_id}";

/// Create all v1 API routes
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route(INCIDENTS, post(incidents::create_incident_handler))
        .route(
            INCIDENT_ITEM,
            get(incidents::get_incident_handler)
                .patch(incidents::update_incident_handler)
                .delete(incidents::delete_incident_handler),
        )
}

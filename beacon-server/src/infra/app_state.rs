use std::{fmt, sync::Arc, time::Duration};

use beacon_core::IncidentOperations;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn IncidentOperations>,
    /// Applied to every store and queue call made for a request.
    pub call_timeout: Option<Duration>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        service: Arc<dyn IncidentOperations>,
        call_timeout: Option<Duration>,
    ) -> Self {
        Self {
            service,
            call_timeout,
        }
    }

    pub fn service(&self) -> Arc<dyn IncidentOperations> {
        Arc::clone(&self.service)
    }
}

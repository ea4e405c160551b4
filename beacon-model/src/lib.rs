//! Core data model definitions shared across Beacon crates.
//!
//! The incident record and the change-event wire format live here so that the
//! service, the consumer and any downstream reader agree on a single shape.
#![allow(missing_docs)]

pub mod error;
pub mod events;
pub mod incident;

pub use error::{ModelError, Result as ModelResult};
pub use events::{ChangeEvent, ChangeOperation};
pub use incident::{
    Incident, IncidentId, NewIncident, StatusUpdate, status,
};

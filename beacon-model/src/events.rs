//! Change events announced on the incident queue.
//!
//! The wire format is a flat JSON object whose values are all strings:
//! `operation`, `incidentId`, `title`, `description`, `status`,
//! `creationDate`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::incident::Incident;

/// Kind of mutation that produced a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeOperation::Create => "CREATE",
            ChangeOperation::Update => "UPDATE",
            ChangeOperation::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of an incident at the time of a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub operation: ChangeOperation,
    #[serde(flatten)]
    pub incident: Incident,
}

impl ChangeEvent {
    pub fn new(operation: ChangeOperation, incident: Incident) -> Self {
        Self {
            operation,
            incident,
        }
    }

    pub fn created(incident: Incident) -> Self {
        Self::new(ChangeOperation::Create, incident)
    }

    pub fn updated(incident: Incident) -> Self {
        Self::new(ChangeOperation::Update, incident)
    }

    pub fn deleted(incident: Incident) -> Self {
        Self::new(ChangeOperation::Delete, incident)
    }

    /// Encodes the event as the flat JSON message body.
    pub fn to_wire(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a message body produced by [`ChangeEvent::to_wire`].
    pub fn from_wire(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }
}

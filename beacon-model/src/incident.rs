use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Conventional status values. The store accepts any non-empty string.
pub mod status {
    pub const OPEN: &str = "open";
    pub const IN_PROGRESS: &str = "in-progress";
    pub const CLOSED: &str = "closed";
}

/// Service-assigned identifier of an incident record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(String);

impl IncidentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IncidentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for IncidentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for IncidentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A stored incident record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub incident_id: IncidentId,
    pub title: String,
    pub description: String,
    pub status: String,
    pub creation_date: String,
}

impl Incident {
    /// Returns a copy of this record carrying `status`.
    pub fn with_status(&self, status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..self.clone()
        }
    }
}

/// Client-supplied fields for a new incident. The identifier is never part of
/// the request; the service mints it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIncident {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub creation_date: String,
}

impl NewIncident {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        status: impl Into<String>,
        creation_date: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            status: status.into(),
            creation_date: creation_date.into(),
        }
    }

    /// Checks required fields. Title and description must not be blank.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(ModelError::MissingField("title"));
        }
        if self.description.trim().is_empty() {
            return Err(ModelError::MissingField("description"));
        }
        Ok(())
    }

    /// Binds the request to a freshly minted identifier.
    ///
    /// A blank status becomes [`status::OPEN`]; a blank creation date is
    /// stamped with the current UTC time (RFC 3339).
    pub fn into_incident(self, incident_id: IncidentId) -> Result<Incident> {
        self.validate()?;

        let status = if self.status.trim().is_empty() {
            status::OPEN.to_string()
        } else {
            self.status
        };
        let creation_date = if self.creation_date.trim().is_empty() {
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        } else {
            self.creation_date
        };

        Ok(Incident {
            incident_id,
            title: self.title,
            description: self.description,
            status,
            creation_date,
        })
    }
}

/// Partial update payload. Only the status is mutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

impl StatusUpdate {
    pub fn validate(&self) -> Result<()> {
        if self.status.trim().is_empty() {
            return Err(ModelError::MissingField("status"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_incident_keeps_client_fields() {
        let incident = NewIncident::new(
            "Fire",
            "Warehouse fire",
            "open",
            "2024-01-01T00:00:00Z",
        )
        .into_incident(IncidentId::from("INC1"))
        .expect("valid request");

        assert_eq!(incident.incident_id.as_str(), "INC1");
        assert_eq!(incident.title, "Fire");
        assert_eq!(incident.description, "Warehouse fire");
        assert_eq!(incident.status, "open");
        assert_eq!(incident.creation_date, "2024-01-01T00:00:00Z");
    }

    #[test]
    fn blank_status_and_date_get_defaults() {
        let incident = NewIncident::new("Flood", "Basement", "  ", "")
            .into_incident(IncidentId::from("INC2"))
            .expect("valid request");

        assert_eq!(incident.status, status::OPEN);
        assert!(
            chrono::DateTime::parse_from_rfc3339(&incident.creation_date)
                .is_ok(),
            "creation date should be stamped as RFC 3339"
        );
    }

    #[test]
    fn missing_title_is_rejected() {
        let err = NewIncident::new("", "something", "open", "")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingField("title")));

        let err = NewIncident::new("Fire", " ", "open", "")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingField("description")));
    }

    #[test]
    fn incident_serializes_with_camel_case_keys() {
        let incident = Incident {
            incident_id: IncidentId::from("INC9"),
            title: "t".into(),
            description: "d".into(),
            status: "open".into(),
            creation_date: "2024-01-01T00:00:00Z".into(),
        };
        let value = serde_json::to_value(&incident).expect("serialize");
        assert_eq!(value["incidentId"], "INC9");
        assert_eq!(value["creationDate"], "2024-01-01T00:00:00Z");
    }
}

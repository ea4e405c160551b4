use beacon_model::IncidentId;
use chrono::Utc;

/// Prefix carried by every minted incident identifier.
pub const INCIDENT_ID_PREFIX: &str = "INC";

/// Mints an identifier from the current wall-clock time in nanoseconds.
///
/// Two creations landing on the same nanosecond collide; the store rejects
/// the second insert as a duplicate key rather than overwriting.
pub fn mint_incident_id() -> IncidentId {
    let now = Utc::now();
    let nanos = now.timestamp_nanos_opt().unwrap_or_else(|| {
        now.timestamp_micros().saturating_mul(1_000)
    });
    IncidentId::new(format!("{INCIDENT_ID_PREFIX}{nanos}"))
}

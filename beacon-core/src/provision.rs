use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of an idempotent check-exists-then-create call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provisioning {
    /// The resource did not exist and was created by this call.
    Created,
    /// The resource was already present; nothing changed.
    Existing,
}

impl Provisioning {
    pub fn was_created(self) -> bool {
        matches!(self, Provisioning::Created)
    }
}

impl fmt::Display for Provisioning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provisioning::Created => f.write_str("created"),
            Provisioning::Existing => f.write_str("existing"),
        }
    }
}

/// Returns true when `name` is safe to splice into SQL as an identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    name.len() <= 63
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_validation() {
        assert!(is_valid_identifier("incidents"));
        assert!(is_valid_identifier("_incidents_v2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2incidents"));
        assert!(!is_valid_identifier("incidents; DROP TABLE x"));
        assert!(!is_valid_identifier(&"a".repeat(64)));
    }
}

//! Credential wrapper that keeps secrets out of logs and API views.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A credential value (bearer token) that must never appear in logs,
/// error messages, or API responses.
///
/// `Secret` serializes transparently so that task records can round-trip
/// through the durable store, but its `Debug` and `Display` implementations
/// are redacted. Components that present tasks to callers must omit secret
/// fields entirely rather than rely on redaction.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wraps a credential value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the wrapped value for handing to an external client.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true when no credential was supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_are_redacted() {
        let secret = Secret::new("very-private");
        assert_eq!(format!("{secret:?}"), "Secret(****)");
        assert_eq!(format!("{secret}"), "****");
    }

    #[test]
    fn expose_returns_the_value() {
        let secret = Secret::new("very-private");
        assert_eq!(secret.expose(), "very-private");
    }

    #[test]
    fn serializes_transparently() {
        let secret = Secret::new("tok");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"tok\"");
    }

    #[test]
    fn empty_secret_reports_empty() {
        assert!(Secret::default().is_empty());
        assert!(!Secret::new("x").is_empty());
    }
}

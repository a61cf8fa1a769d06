//! Portal-side certificate alias.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Identity;

const ALIAS_PREFIX: &str = "CERTIFICADO_";

/// Label under which the portal registers an uploaded CSR.
///
/// Built as `CERTIFICADO_<sanitized>_<epoch millis>`; the timestamp suffix is
/// what makes it unique per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alias(String);

impl Alias {
    /// Generate an alias for the identity at the given instant.
    pub fn generate(identity: &Identity, at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}{}_{}",
            ALIAS_PREFIX,
            identity.sanitized_name(),
            at.timestamp_millis()
        ))
    }

    /// Generate an alias for the identity now.
    pub fn now(identity: &Identity) -> Self {
        Self::generate(identity, Utc::now())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Alias {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

//! Cache namespaces.

use crate::CacheError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A fixed category of cached data.
///
/// The namespace is the first key segment and selects the TTL policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// User profiles and preferences.
    User,
    /// Workspace (tenant) settings.
    Workspace,
    /// Leads and their enrichment data.
    Lead,
    /// Campaign definitions.
    Campaign,
    /// Aggregated analytics.
    Analytics,
    /// AI model responses.
    Ai,
    /// Session tokens. Never cached.
    Session,
}

impl Namespace {
    /// Returns the key segment for this namespace.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Workspace => "workspace",
            Self::Lead => "lead",
            Self::Campaign => "campaign",
            Self::Analytics => "analytics",
            Self::Ai => "ai",
            Self::Session => "session",
        }
    }

    /// Checks if values of this namespace may ever be cached.
    ///
    /// `Session` carries security-sensitive tokens and is excluded
    /// regardless of configuration.
    #[must_use]
    pub const fn is_ever_cacheable(&self) -> bool {
        !matches!(self, Self::Session)
    }

    /// All namespaces.
    #[must_use]
    pub const fn all() -> [Self; 7] {
        [
            Self::User,
            Self::Workspace,
            Self::Lead,
            Self::Campaign,
            Self::Analytics,
            Self::Ai,
            Self::Session,
        ]
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|ns| ns.as_str() == s)
            .ok_or_else(|| CacheError::InvalidNamespace(s.to_string()))
    }
}

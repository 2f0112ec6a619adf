//! namespace type - the tenancy boundary grouping nodes under one owner.
//!
//! a node's peers are computed as the union of same-namespace nodes and
//! nodes exposed to it by the access policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// unique identifier for a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceId(pub u64);

impl From<u64> for NamespaceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// maximum length of a namespace name (dns label rules).
pub const MAX_NAMESPACE_NAME_LEN: usize = 63;

/// a tenancy unit owning nodes and pre-auth keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespace {
    /// unique identifier.
    pub id: NamespaceId,

    /// unique name, dns-label shaped.
    pub name: String,

    /// when the namespace was created.
    pub created_at: DateTime<Utc>,

    /// when the namespace was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Namespace {
    /// create a new namespace after validating the name.
    pub fn new(id: NamespaceId, name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        validate_name(&name)?;
        let now = Utc::now();
        Ok(Self {
            id,
            name,
            created_at: now,
            updated_at: now,
        })
    }
}

/// validate a namespace name against dns label rules.
///
/// names are lowercase, at most 63 chars, consist of `[a-z0-9.-]`, and
/// neither start nor end with a hyphen or dot. dots are allowed so that
/// email-derived namespaces like `alice.example.com` work.
pub fn validate_name(name: &str) -> Result<(), Error> {
    if name.is_empty() || name.len() > MAX_NAMESPACE_NAME_LEN {
        return Err(Error::InvalidNamespaceName(name.to_string()));
    }
    if name.starts_with(['-', '.']) || name.ends_with(['-', '.']) {
        return Err(Error::InvalidNamespaceName(name.to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(Error::InvalidNamespaceName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["alice", "alice.example.com", "team-1", "a"] {
            assert!(validate_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "Alice", "-alice", "alice-", ".alice", "alice.", "al ice"] {
            assert!(validate_name(name).is_err(), "{name} should be invalid");
        }
    }

    #[test]
    fn test_name_length_limit() {
        let long = "a".repeat(64);
        assert!(validate_name(&long).is_err());
        let ok = "a".repeat(63);
        assert!(validate_name(&ok).is_ok());
    }

    #[test]
    fn test_new_rejects_invalid() {
        assert!(Namespace::new(NamespaceId(1), "Bad Name").is_err());
        assert!(Namespace::new(NamespaceId(1), "good-name").is_ok());
    }
}

//! pre-authentication key type for automated node registration.
//!
//! pre-auth keys use split token storage: a short `key_prefix` for display
//! and lookup, and a sha-256 `key_hash` for verification. the full secret
//! is only returned at creation time and is never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::auth_key_token::AuthKeyToken;
use crate::namespace::NamespaceId;

/// a pre-authentication key usable in place of interactive auth.
///
/// keys can be:
/// - **reusable**: can register multiple nodes
/// - **ephemeral**: nodes registered with it are deleted after disconnect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreAuthKey {
    /// unique identifier.
    pub id: u64,

    /// display prefix of the secret (safe for logs and api responses).
    pub key_prefix: String,

    /// sha-256 hash of the full secret, hex-encoded.
    pub key_hash: String,

    /// namespace the key registers nodes into.
    pub namespace_id: NamespaceId,

    /// whether this key can be used multiple times.
    pub reusable: bool,

    /// whether nodes registered with this key are ephemeral.
    pub ephemeral: bool,

    /// whether this key has been used (for one-shot keys).
    pub used: bool,

    /// when this key expires.
    pub expiration: Option<DateTime<Utc>>,

    /// when this key was created.
    pub created_at: DateTime<Utc>,
}

impl PreAuthKey {
    /// build a key record from a freshly generated token.
    pub fn from_token(id: u64, token: &AuthKeyToken, namespace_id: NamespaceId) -> Self {
        Self {
            id,
            key_prefix: token.prefix().to_string(),
            key_hash: hex::encode(token.hash()),
            namespace_id,
            reusable: false,
            ephemeral: false,
            used: false,
            expiration: None,
            created_at: Utc::now(),
        }
    }

    /// verify a presented token against the stored hash in constant time.
    pub fn verify(&self, token: &AuthKeyToken) -> bool {
        let Ok(stored_hash) = hex::decode(&self.key_hash) else {
            return false;
        };
        let computed = token.hash();
        computed.ct_eq(&stored_hash).into()
    }

    /// check if this key is expired.
    pub fn is_expired(&self) -> bool {
        match &self.expiration {
            None => false,
            Some(exp) => Utc::now() > *exp,
        }
    }

    /// check if this key is valid for use.
    pub fn is_valid(&self) -> bool {
        !self.is_expired() && (self.reusable || !self.used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> (AuthKeyToken, PreAuthKey) {
        let token = AuthKeyToken::generate();
        let key = PreAuthKey::from_token(1, &token, NamespaceId(1));
        (token, key)
    }

    #[test]
    fn test_fresh_key_valid() {
        let (_, key) = key();
        assert!(key.is_valid());
    }

    #[test]
    fn test_used_one_shot_invalid() {
        let (_, mut key) = key();
        key.used = true;
        assert!(!key.is_valid());
    }

    #[test]
    fn test_used_reusable_valid() {
        let (_, mut key) = key();
        key.used = true;
        key.reusable = true;
        assert!(key.is_valid());
    }

    #[test]
    fn test_expired_invalid() {
        let (_, mut key) = key();
        key.expiration = Some(Utc::now() - chrono::Duration::hours(1));
        assert!(key.is_expired());
        assert!(!key.is_valid());
    }

    #[test]
    fn test_verify() {
        let (token, key) = key();
        assert!(key.verify(&token));
        assert!(!key.verify(&AuthKeyToken::generate()));
    }

    #[test]
    fn test_prefix_matches_token() {
        let (token, key) = key();
        assert_eq!(key.key_prefix, token.prefix());
    }
}

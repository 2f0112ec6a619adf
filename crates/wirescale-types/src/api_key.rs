//! api key type for admin callers.
//!
//! keys are presented as `Authorization: Bearer <prefix>.<secret>`. the
//! searchable prefix is stored as-is; only a bcrypt hash of the secret
//! remainder is persisted. the full key is returned once, at creation.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// length of the searchable key prefix.
pub const API_KEY_PREFIX_LEN: usize = 8;

/// length of the secret remainder.
const SECRET_LEN: usize = 32;

const BCRYPT_COST: u32 = 10;

/// a bearer secret for admin api callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    /// unique identifier.
    pub id: u64,

    /// searchable key prefix (first 8 chars of the presented key).
    pub prefix: String,

    /// bcrypt hash of the secret remainder.
    pub hash: String,

    /// when this key expires.
    pub expiration: Option<DateTime<Utc>>,

    /// last time this key authenticated a request.
    pub last_seen: Option<DateTime<Utc>>,

    /// when this key was created.
    pub created_at: DateTime<Utc>,
}

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

impl ApiKey {
    /// generate a new api key.
    ///
    /// returns the record to store and the full `prefix.secret` string to
    /// hand to the operator. the secret is not recoverable afterwards.
    pub fn generate(id: u64, expiration: Option<DateTime<Utc>>) -> Result<(Self, String), Error> {
        let prefix = random_string(API_KEY_PREFIX_LEN);
        let secret = random_string(SECRET_LEN);
        let hash = bcrypt::hash(&secret, BCRYPT_COST).map_err(|_| Error::ApiKeyGeneration)?;

        let key = Self {
            id,
            prefix: prefix.clone(),
            hash,
            expiration,
            last_seen: None,
            created_at: Utc::now(),
        };
        Ok((key, format!("{}.{}", prefix, secret)))
    }

    /// split a presented bearer value into (prefix, secret).
    pub fn split(presented: &str) -> Result<(&str, &str), Error> {
        let (prefix, secret) = presented.split_once('.').ok_or(Error::InvalidApiKey)?;
        if prefix.len() != API_KEY_PREFIX_LEN || secret.is_empty() {
            return Err(Error::InvalidApiKey);
        }
        Ok((prefix, secret))
    }

    /// verify a presented secret remainder against the stored hash.
    pub fn verify(&self, secret: &str) -> bool {
        bcrypt::verify(secret, &self.hash).unwrap_or(false)
    }

    /// check if this key is expired.
    pub fn is_expired(&self) -> bool {
        match &self.expiration {
            None => false,
            Some(exp) => Utc::now() > *exp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_verify() {
        let (key, full) = ApiKey::generate(1, None).unwrap();
        let (prefix, secret) = ApiKey::split(&full).unwrap();
        assert_eq!(prefix, key.prefix);
        assert!(key.verify(secret));
        assert!(!key.verify("wrong-secret"));
    }

    #[test]
    fn test_split_rejects_missing_dot() {
        assert!(ApiKey::split("noseparator").is_err());
    }

    #[test]
    fn test_split_rejects_bad_prefix_len() {
        assert!(ApiKey::split("short.secretsecret").is_err());
    }

    #[test]
    fn test_expiry() {
        let (mut key, _) = ApiKey::generate(1, None).unwrap();
        assert!(!key.is_expired());
        key.expiration = Some(Utc::now() - chrono::Duration::hours(1));
        assert!(key.is_expired());
    }
}

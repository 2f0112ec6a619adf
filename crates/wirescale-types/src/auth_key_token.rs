//! pre-auth key token: the 48-char hex secret handed to the operator.
//!
//! the full token is only returned at creation time. the server stores a
//! short prefix for display plus a sha-256 hash for verification.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Error;

/// total length of a pre-auth key secret in hex characters.
pub const AUTH_KEY_LEN: usize = 48;

/// length of the stored display prefix.
const PREFIX_LEN: usize = 12;

/// a full pre-auth key secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthKeyToken(String);

impl AuthKeyToken {
    /// generate a new random token (48 hex chars from a csprng).
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; AUTH_KEY_LEN / 2];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// the display prefix stored alongside the hash.
    pub fn prefix(&self) -> &str {
        &self.0[..PREFIX_LEN]
    }

    /// sha-256 hash of the full token.
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hasher.finalize().into()
    }
}

impl FromStr for AuthKeyToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != AUTH_KEY_LEN || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidAuthKey);
        }
        Ok(Self(s.to_lowercase()))
    }
}

impl fmt::Display for AuthKeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

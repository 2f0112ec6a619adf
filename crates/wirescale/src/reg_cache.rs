//! registration cache: short-lived keyed store for pending auth flows.
//!
//! pending registrations are values in a ttl map, not first-class session
//! objects - a process restart invalidates in-flight browser flows and the
//! client simply retries.

use std::time::Duration;

use moka::sync::Cache;
use wirescale_types::{HostInfo, MachineKey, NodeKey};

/// length of cache tokens in hex characters.
pub const TOKEN_LEN: usize = 32;

/// generate a random 32-hex lookup token.
pub fn generate_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; TOKEN_LEN / 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// a process-local token -> value map with a fixed entry ttl.
///
/// expiry is handled by the cache itself; a janitor is not required for
/// correctness.
#[derive(Clone)]
pub struct RegistrationCache<V: Clone + Send + Sync + 'static> {
    cache: Cache<String, V>,
}

impl<V: Clone + Send + Sync + 'static> RegistrationCache<V> {
    /// create a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder().time_to_live(ttl).build(),
        }
    }

    /// store a value under a token.
    pub fn put(&self, token: String, value: V) {
        self.cache.insert(token, value);
    }

    /// look up a value, if present and unexpired.
    pub fn get(&self, token: &str) -> Option<V> {
        self.cache.get(token)
    }

    /// look up and consume a value. a second take for the same token
    /// returns `None`.
    pub fn take(&self, token: &str) -> Option<V> {
        let value = self.cache.get(token)?;
        self.cache.invalidate(token);
        Some(value)
    }

    /// drop an entry.
    pub fn remove(&self, token: &str) {
        self.cache.invalidate(token);
    }
}

/// context held while a node waits for an out-of-band auth path.
#[derive(Debug, Clone)]
pub struct PendingRegistration {
    /// the machine key that initiated auth.
    pub machine_key: MachineKey,

    /// the node key presented in the register request.
    pub node_key: NodeKey,

    /// host info from the register request.
    pub hostinfo: Option<HostInfo>,

    /// registration expiry requested by the client.
    pub expiry: Option<chrono::DateTime<chrono::Utc>>,
}

/// context held between the idp redirect and its callback.
#[derive(Debug, Clone)]
pub struct OidcState {
    /// hex form of the machine key being authenticated.
    pub machine_key_hex: String,

    /// nonce for id-token verification.
    pub nonce: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_put_get() {
        let cache: RegistrationCache<String> = RegistrationCache::new(Duration::from_secs(60));
        cache.put("token-a".to_string(), "value".to_string());
        assert_eq!(cache.get("token-a"), Some("value".to_string()));
        assert_eq!(cache.get("token-b"), None);
    }

    #[test]
    fn test_take_consumes() {
        let cache: RegistrationCache<u32> = RegistrationCache::new(Duration::from_secs(60));
        cache.put("t".to_string(), 7);
        assert_eq!(cache.take("t"), Some(7));
        assert_eq!(cache.take("t"), None);
    }

    #[test]
    fn test_expiry() {
        let cache: RegistrationCache<u32> = RegistrationCache::new(Duration::from_millis(20));
        cache.put("t".to_string(), 7);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(cache.get("t"), None);
    }
}

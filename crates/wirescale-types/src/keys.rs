//! cryptographic key types for the node-facing protocol.
//!
//! these types wrap raw curve25519 key bytes and serialize to the wire
//! format the client expects: bare lowercase hex (64 chars for a full key).
//! the actual sealing/opening operations live in wirescale-proto.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::Error;

/// helper to implement hex serde and text parsing for a key newtype.
macro_rules! impl_key {
    ($type:ty, $name:expr) => {
        impl $type {
            /// create a key from raw bytes.
            pub fn from_bytes(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }

            /// parse a key from its hex text form.
            pub fn from_hex(s: &str) -> Result<Self, Error> {
                let bytes = hex::decode(s).map_err(|_| Error::InvalidKey($name))?;
                Ok(Self(bytes))
            }

            /// the raw bytes of the key.
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            /// the hex text form of the key.
            pub fn to_hex(&self) -> String {
                hex::encode(&self.0)
            }

            /// check if this is a zero or empty key.
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|&b| b == 0)
            }

            /// a short string representation for logging.
            pub fn short_string(&self) -> String {
                if self.0.len() >= 4 {
                    format!("{}:{:02x}{:02x}...", $name, self.0[0], self.0[1])
                } else {
                    format!("{}:???", $name)
                }
            }
        }

        impl Serialize for $type {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $type {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                let bytes = hex::decode(&s)
                    .map_err(|e| de::Error::custom(format!("invalid hex in key: {}", e)))?;
                Ok(Self(bytes))
            }
        }
    };
}

/// machine key - the long-term key identifying a physical device.
///
/// stable across node key rotations, used to authenticate requests:
/// registration and map bodies are sealed with the machine-key/server box.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MachineKey(Vec<u8>);

impl_key!(MachineKey, "mkey");

/// node key - the rotating session key peers use for wireguard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodeKey(Vec<u8>);

impl_key!(NodeKey, "nodekey");

/// disco key - used by peers for path discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DiscoKey(Vec<u8>);

impl_key!(DiscoKey, "discokey");

impl DiscoKey {
    /// check if the key is unset.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_key_hex_roundtrip() {
        let key = MachineKey::from_bytes(vec![0xab; 32]);
        let parsed = MachineKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn test_node_key_serialize_bare_hex() {
        let key = NodeKey::from_bytes(vec![0x02; 32]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(
            json,
            "\"0202020202020202020202020202020202020202020202020202020202020202\""
        );
    }

    #[test]
    fn test_node_key_deserialize() {
        let json = "\"0202020202020202020202020202020202020202020202020202020202020202\"";
        let key: NodeKey = serde_json::from_str(json).unwrap();
        assert_eq!(key.as_bytes(), &[0x02; 32]);
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(MachineKey::from_hex("not-hex").is_err());
    }

    #[test]
    fn test_is_zero() {
        assert!(NodeKey::from_bytes(vec![0; 32]).is_zero());
        assert!(!NodeKey::from_bytes(vec![0x02; 32]).is_zero());
    }

    #[test]
    fn test_short_string() {
        let key = MachineKey::from_bytes(vec![0xab, 0xcd, 0xef, 0x12]);
        assert_eq!(key.short_string(), "mkey:abcd...");
        assert_eq!(MachineKey::default().short_string(), "mkey:???");
    }
}

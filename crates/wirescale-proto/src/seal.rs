//! nacl-box codec for the machine endpoints.
//!
//! every body on `/machine/...` is sealed between the node and the server:
//! x25519 ecdh between the two keys, xsalsa20-poly1305 with a random
//! 24-byte nonce prepended to the ciphertext. streaming map frames are
//! additionally prefixed with a 4-byte little-endian payload length.

use bytes::Bytes;
use crypto_box::{
    PublicKey, SalsaBox, SecretKey,
    aead::{Aead, AeadCore, OsRng, generic_array::GenericArray},
};

use crate::Error;

/// nonce length for the nacl box construction.
pub const NONCE_LEN: usize = 24;

/// the server's long-term curve25519 keypair.
#[derive(Clone)]
pub struct ServerKeypair {
    secret: SecretKey,
}

impl ServerKeypair {
    /// generate a fresh keypair from the system csprng.
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::generate(&mut OsRng),
        }
    }

    /// reconstruct a keypair from stored secret bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let raw: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::InvalidKeyLength(bytes.len()))?;
        Ok(Self {
            secret: SecretKey::from(raw),
        })
    }

    /// the secret key bytes, for persistence.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// the public key bytes clients seal to.
    pub fn public_bytes(&self) -> [u8; 32] {
        *self.secret.public_key().as_bytes()
    }

    /// the public key in the hex form served on `/key`.
    pub fn public_hex(&self) -> String {
        hex::encode(self.public_bytes())
    }

    fn boxed(&self, their_public: &[u8]) -> Result<SalsaBox, Error> {
        let raw: [u8; 32] = their_public
            .try_into()
            .map_err(|_| Error::InvalidKeyLength(their_public.len()))?;
        Ok(SalsaBox::new(&PublicKey::from(raw), &self.secret))
    }

    /// seal a plaintext to the given peer public key.
    ///
    /// output layout: `nonce (24 bytes) || ciphertext`.
    pub fn seal(&self, their_public: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let cipher = self.boxed(their_public)?;
        let nonce = SalsaBox::generate_nonce(&mut OsRng);
        let ciphertext = cipher.encrypt(&nonce, plaintext).map_err(|_| Error::SealFailed)?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(nonce.as_slice());
        payload.extend_from_slice(&ciphertext);
        Ok(payload)
    }

    /// open a sealed payload from the given peer public key.
    pub fn open(&self, their_public: &[u8], payload: &[u8]) -> Result<Vec<u8>, Error> {
        if payload.len() < NONCE_LEN {
            return Err(Error::ShortPayload);
        }
        let cipher = self.boxed(their_public)?;
        let nonce = GenericArray::from_slice(&payload[..NONCE_LEN]);
        cipher
            .decrypt(nonce, &payload[NONCE_LEN..])
            .map_err(|_| Error::OpenFailed)
    }
}

impl std::fmt::Debug for ServerKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the secret
        f.debug_struct("ServerKeypair")
            .field("public", &hex::encode(self.public_bytes()))
            .finish()
    }
}

/// seal a json-encodable value to a peer key.
pub fn seal<T: serde::Serialize>(
    keypair: &ServerKeypair,
    their_public: &[u8],
    value: &T,
) -> Result<Vec<u8>, Error> {
    let plaintext = serde_json::to_vec(value)?;
    keypair.seal(their_public, &plaintext)
}

/// open a sealed payload and decode the json inside.
pub fn open<T: serde::de::DeserializeOwned>(
    keypair: &ServerKeypair,
    their_public: &[u8],
    payload: &[u8],
) -> Result<T, Error> {
    let plaintext = keypair.open(their_public, payload)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

/// frame a payload with a 4-byte little-endian length prefix.
pub fn frame(payload: &[u8]) -> Result<Bytes, Error> {
    let len = u32::try_from(payload.len()).map_err(|_| Error::FrameTooLarge)?;
    let mut body = Vec::with_capacity(4 + payload.len());
    body.extend_from_slice(&len.to_le_bytes());
    body.extend_from_slice(payload);
    Ok(Bytes::from(body))
}

/// seal a json-encodable value and frame it for the map stream.
pub fn seal_framed<T: serde::Serialize>(
    keypair: &ServerKeypair,
    their_public: &[u8],
    value: &T,
) -> Result<Bytes, Error> {
    let sealed = seal(keypair, their_public, value)?;
    frame(&sealed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ping {
        msg: String,
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let server = ServerKeypair::generate();
        let client = ServerKeypair::generate();

        let value = Ping {
            msg: "hello".to_string(),
        };
        let sealed = seal(&server, &client.public_bytes(), &value).unwrap();
        let opened: Ping = open(&client, &server.public_bytes(), &sealed).unwrap();
        assert_eq!(opened, value);
    }

    #[test]
    fn test_open_rejects_wrong_key() {
        let server = ServerKeypair::generate();
        let client = ServerKeypair::generate();
        let other = ServerKeypair::generate();

        let sealed = server.seal(&client.public_bytes(), b"secret").unwrap();
        assert!(other.open(&server.public_bytes(), &sealed).is_err());
    }

    #[test]
    fn test_open_rejects_tampered_payload() {
        let server = ServerKeypair::generate();
        let client = ServerKeypair::generate();

        let mut sealed = server.seal(&client.public_bytes(), b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(client.open(&server.public_bytes(), &sealed).is_err());
    }

    #[test]
    fn test_open_rejects_short_payload() {
        let server = ServerKeypair::generate();
        let client = ServerKeypair::generate();
        assert!(matches!(
            client.open(&server.public_bytes(), &[0u8; 10]),
            Err(Error::ShortPayload)
        ));
    }

    #[test]
    fn test_keypair_persistence_roundtrip() {
        let keypair = ServerKeypair::generate();
        let restored = ServerKeypair::from_secret_bytes(&keypair.secret_bytes()).unwrap();
        assert_eq!(keypair.public_bytes(), restored.public_bytes());
    }

    #[test]
    fn test_frame_layout() {
        let framed = frame(b"abcd").unwrap();
        assert_eq!(&framed[..4], &4u32.to_le_bytes());
        assert_eq!(&framed[4..], b"abcd");
    }

    #[test]
    fn test_public_hex_length() {
        assert_eq!(ServerKeypair::generate().public_hex().len(), 64);
    }
}

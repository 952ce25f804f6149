//! Identity and pre-key material.

use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::crypto::encryption::random_bytes;

/// A public identity key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey([u8; 32]);

impl IdentityKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        IdentityKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex fingerprint shown to the user when resolving identity mismatches.
    pub fn fingerprint(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("IdentityKey").field(&self.fingerprint()).finish()
    }
}

/// Our long-term identity key pair.
#[derive(Clone)]
pub struct IdentityKeyPair {
    secret: StaticSecret,
    public: IdentityKey,
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public", &self.public)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl IdentityKeyPair {
    /// Generates a fresh identity.
    pub fn generate() -> Self {
        Self::from_secret_bytes(random_bytes::<32>())
    }

    /// Restores an identity from its secret bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = IdentityKey(PublicKey::from(&secret).to_bytes());
        IdentityKeyPair { secret, public }
    }

    pub fn public_key(&self) -> IdentityKey {
        self.public
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    pub(crate) fn diffie_hellman(&self, their_public: &[u8; 32]) -> [u8; 32] {
        self.secret
            .diffie_hellman(&PublicKey::from(*their_public))
            .to_bytes()
    }
}

/// A one-time pre-key we published.
#[derive(Clone, Serialize, Deserialize)]
pub struct PreKeyRecord {
    pub id: u32,
    secret: [u8; 32],
}

impl std::fmt::Debug for PreKeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreKeyRecord").field("id", &self.id).finish()
    }
}

impl Drop for PreKeyRecord {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.secret);
    }
}

impl PreKeyRecord {
    /// Generates a new pre-key with the given id.
    pub fn generate(id: u32) -> Self {
        PreKeyRecord {
            id,
            secret: random_bytes::<32>(),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        PublicKey::from(&StaticSecret::from(self.secret)).to_bytes()
    }

    pub(crate) fn key_pair(&self) -> IdentityKeyPair {
        IdentityKeyPair::from_secret_bytes(self.secret)
    }
}

/// What a peer needs to start a session with us without a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKeyBundle {
    pub prekey_id: u32,
    pub prekey_public: [u8; 32],
    pub identity_key: IdentityKey,
}

//! Storage the session protocol runs on.

use super::{Address, IdentityKey, IdentityKeyPair, PreKeyRecord, SessionRecord};
use crate::storage::StorageError;

/// Per-address session records.
pub trait SessionStore {
    /// Loads the record for `address`, or an empty one.
    fn load_session(&self, address: &Address) -> Result<SessionRecord, StorageError>;

    fn store_session(&self, address: &Address, record: &SessionRecord)
        -> Result<(), StorageError>;

    fn delete_session(&self, address: &Address) -> Result<(), StorageError>;

    fn contains_session(&self, address: &Address) -> Result<bool, StorageError> {
        Ok(self.load_session(address)?.has_current_state())
    }
}

/// Our identity and the identities we have seen for others.
pub trait IdentityKeyStore {
    /// Returns our identity key pair.
    fn local_identity(&self) -> Result<IdentityKeyPair, StorageError>;

    fn save_identity(&self, name: &str, identity: &IdentityKey) -> Result<(), StorageError>;

    fn load_identity(&self, name: &str) -> Result<Option<IdentityKey>, StorageError>;

    /// An identity is trusted if we have never seen one for `name` or it
    /// matches the one we saw.
    fn is_trusted_identity(&self, name: &str, identity: &IdentityKey) -> Result<bool, StorageError> {
        Ok(match self.load_identity(name)? {
            Some(known) => known == *identity,
            None => true,
        })
    }
}

/// One-time pre-keys we published.
pub trait PreKeyStore {
    fn load_prekey(&self, id: u32) -> Result<Option<PreKeyRecord>, StorageError>;

    fn store_prekey(&self, record: &PreKeyRecord) -> Result<(), StorageError>;

    fn remove_prekey(&self, id: u32) -> Result<(), StorageError>;
}

/// Everything [`super::SessionEngine`] needs.
pub trait ProtocolStore: SessionStore + IdentityKeyStore + PreKeyStore {}

impl<T: SessionStore + IdentityKeyStore + PreKeyStore> ProtocolStore for T {}

// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session engine over a [`ProtocolStore`].
//!
//! Session secrets come from three Diffie-Hellman agreements between the
//! two identity keys and the ephemeral base keys of the handshake, run
//! through HKDF into one chain secret per direction. Each message key is
//! derived from the chain secret and the message counter, so messages can
//! be decrypted in any order but only once.

use std::sync::{Arc, Mutex, MutexGuard};

use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, warn};

use super::keys::PreKeyBundle;
use super::message::{
    KeyExchangeMessage, PreKeyWhisperMessage, WhisperMessage, KEY_EXCHANGE_INITIATE,
    KEY_EXCHANGE_RESPONSE,
};
use super::state::{PendingKeyExchange, SessionRecord, SessionState, UnacknowledgedPreKey};
use super::{
    Address, CiphertextKind, CiphertextMessage, IdentityKey, IdentityKeyPair, PreKeyRecord,
    ProtocolError, ProtocolStore, SessionProtocol,
};
use crate::crypto::{self, SymmetricKey, HKDF};

const SESSION_INFO: &[u8] = b"SMSSecure_Session_v3";
const MESSAGE_INFO: &[u8] = b"SMSSecure_MessageKey";

/// Which side of the handshake we were on. The initiator's first chain is
/// its sending chain.
#[derive(Clone, Copy)]
enum Role {
    Initiator,
    Responder,
}

/// Session protocol implementation backed by a shared store.
pub struct SessionEngine<S: ProtocolStore> {
    store: Arc<Mutex<S>>,
}

impl<S: ProtocolStore> Clone for SessionEngine<S> {
    fn clone(&self) -> Self {
        SessionEngine {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ProtocolStore> SessionEngine<S> {
    pub fn new(store: Arc<Mutex<S>>) -> Self {
        SessionEngine { store }
    }

    fn store(&self) -> Result<MutexGuard<'_, S>, ProtocolError> {
        self.store
            .lock()
            .map_err(|_| ProtocolError::Store("store lock poisoned".to_string()))
    }

    /// Returns our public identity key.
    pub fn identity_key(&self) -> Result<IdentityKey, ProtocolError> {
        Ok(self.store()?.local_identity()?.public_key())
    }

    /// Generates and stores a pre-key, returning the bundle to publish.
    pub fn generate_prekey_bundle(&self, prekey_id: u32) -> Result<PreKeyBundle, ProtocolError> {
        let store = self.store()?;
        let identity = store.local_identity()?;
        let record = PreKeyRecord::generate(prekey_id);
        store.store_prekey(&record)?;
        Ok(PreKeyBundle {
            prekey_id,
            prekey_public: record.public_key(),
            identity_key: identity.public_key(),
        })
    }

    /// Starts a session from a peer's published pre-key bundle.
    ///
    /// Messages sent on the session are pre-key messages until the peer
    /// answers.
    pub fn process_prekey_bundle(
        &self,
        address: &Address,
        bundle: &PreKeyBundle,
    ) -> Result<(), ProtocolError> {
        let store = self.store()?;
        check_trusted(&*store, address, &bundle.identity_key)?;

        let identity = store.local_identity()?;
        let base = IdentityKeyPair::generate();
        let master = agreement(
            Role::Initiator,
            &identity,
            &base,
            &bundle.identity_key,
            &bundle.prekey_public,
        );
        let base_public = *base.public_key().as_bytes();
        let mut state = derive_state(Role::Initiator, &master, bundle.identity_key, base_public);
        state.unacknowledged_prekey = Some(UnacknowledgedPreKey {
            prekey_id: bundle.prekey_id,
            base_key: base_public,
        });

        let mut record = store.load_session(address)?;
        record.current = Some(state);
        record.pending = None;
        store.store_session(address, &record)?;
        store.save_identity(address.name(), &bundle.identity_key)?;
        debug!(address = %address, "session created from pre-key bundle");
        Ok(())
    }
}

impl<S: ProtocolStore> SessionProtocol for SessionEngine<S> {
    fn contains_session(&self, address: &Address) -> Result<bool, ProtocolError> {
        Ok(self.store()?.contains_session(address)?)
    }

    fn has_pending_key_exchange(&self, address: &Address) -> Result<bool, ProtocolError> {
        Ok(self.store()?.load_session(address)?.has_pending_key_exchange())
    }

    fn delete_session(&mut self, address: &Address) -> Result<(), ProtocolError> {
        self.store()?.delete_session(address)?;
        debug!(address = %address, "session deleted");
        Ok(())
    }

    fn encrypt(
        &mut self,
        address: &Address,
        plaintext: &[u8],
    ) -> Result<CiphertextMessage, ProtocolError> {
        let store = self.store()?;
        let mut record = store.load_session(address)?;
        let state = record
            .current
            .as_mut()
            .ok_or_else(|| ProtocolError::NoSession(address.to_string()))?;

        let counter = state.send_counter;
        let key = message_key(&state.sending_chain, counter);
        let ciphertext = crypto::encrypt(&key, plaintext)
            .map_err(|e| ProtocolError::InvalidKey(e.to_string()))?;
        state.send_counter = counter
            .checked_add(1)
            .ok_or_else(|| ProtocolError::InvalidKey("send counter exhausted".to_string()))?;

        let whisper = WhisperMessage {
            counter,
            ciphertext,
        }
        .serialize()?;

        let message = match &state.unacknowledged_prekey {
            Some(pending) => {
                let identity = store.local_identity()?;
                CiphertextMessage {
                    kind: CiphertextKind::PreKey,
                    body: PreKeyWhisperMessage {
                        prekey_id: pending.prekey_id,
                        base_key: pending.base_key,
                        identity_key: identity.public_key(),
                        message: whisper,
                    }
                    .serialize()?,
                }
            }
            None => CiphertextMessage {
                kind: CiphertextKind::Whisper,
                body: whisper,
            },
        };

        store.store_session(address, &record)?;
        Ok(message)
    }

    fn decrypt_message(
        &mut self,
        address: &Address,
        message: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        let whisper = WhisperMessage::parse(message)?;
        let store = self.store()?;
        let mut record = store.load_session(address)?;
        let state = record
            .current
            .as_mut()
            .ok_or_else(|| ProtocolError::NoSession(address.to_string()))?;

        let plaintext = decrypt_with_state(state, &whisper)?;
        // The peer answered on the session, so it has our bootstrap.
        state.unacknowledged_prekey = None;
        store.store_session(address, &record)?;
        Ok(plaintext)
    }

    fn decrypt_prekey_message(
        &mut self,
        address: &Address,
        message: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        let prekey_message = PreKeyWhisperMessage::parse(message)?;
        let whisper = WhisperMessage::parse(&prekey_message.message)?;
        let store = self.store()?;
        check_trusted(&*store, address, &prekey_message.identity_key)?;

        let mut record = store.load_session(address)?;

        // A repeat of a bootstrap we already processed decrypts on the
        // existing session.
        if let Some(state) = record.current.as_mut() {
            if state.base_key == prekey_message.base_key {
                let plaintext = decrypt_with_state(state, &whisper)?;
                store.store_session(address, &record)?;
                return Ok(plaintext);
            }
        }

        let prekey = store
            .load_prekey(prekey_message.prekey_id)?
            .ok_or(ProtocolError::InvalidKeyId(prekey_message.prekey_id))?;
        let identity = store.local_identity()?;
        let master = agreement(
            Role::Responder,
            &identity,
            &prekey.key_pair(),
            &prekey_message.identity_key,
            &prekey_message.base_key,
        );
        let mut state = derive_state(
            Role::Responder,
            &master,
            prekey_message.identity_key,
            prekey_message.base_key,
        );
        let plaintext = decrypt_with_state(&mut state, &whisper)?;

        record.current = Some(state);
        record.pending = None;
        store.store_session(address, &record)?;
        store.remove_prekey(prekey_message.prekey_id)?;
        store.save_identity(address.name(), &prekey_message.identity_key)?;
        debug!(address = %address, prekey_id = prekey_message.prekey_id, "session created from pre-key message");
        Ok(plaintext)
    }

    fn initiate_key_exchange(&mut self, address: &Address) -> Result<Vec<u8>, ProtocolError> {
        let store = self.store()?;
        let identity = store.local_identity()?;
        let base = IdentityKeyPair::generate();
        let sequence = random_sequence()?;

        let mut record = store.load_session(address)?;
        record.pending = Some(PendingKeyExchange {
            sequence,
            base_secret: base.secret_bytes(),
        });
        store.store_session(address, &record)?;

        debug!(address = %address, sequence, "key exchange initiated");
        Ok(KeyExchangeMessage {
            sequence,
            flags: KEY_EXCHANGE_INITIATE,
            base_key: *base.public_key().as_bytes(),
            identity_key: identity.public_key(),
        }
        .serialize()?)
    }

    fn process_key_exchange(
        &mut self,
        address: &Address,
        message: &[u8],
    ) -> Result<Option<Vec<u8>>, ProtocolError> {
        let exchange = KeyExchangeMessage::parse(message)?;
        let store = self.store()?;
        check_trusted(&*store, address, &exchange.identity_key)?;

        let identity = store.local_identity()?;
        let mut record = store.load_session(address)?;

        if exchange.is_response() {
            let pending = match &record.pending {
                Some(pending) if pending.sequence == exchange.sequence => pending.clone(),
                _ => {
                    warn!(address = %address, "key exchange response without matching initiate");
                    return Err(ProtocolError::StaleKeyExchange);
                }
            };
            let base = IdentityKeyPair::from_secret_bytes(pending.base_secret);
            let master = agreement(
                Role::Initiator,
                &identity,
                &base,
                &exchange.identity_key,
                &exchange.base_key,
            );
            let state = derive_state(
                Role::Initiator,
                &master,
                exchange.identity_key,
                *base.public_key().as_bytes(),
            );
            record.current = Some(state);
            record.pending = None;
            store.store_session(address, &record)?;
            store.save_identity(address.name(), &exchange.identity_key)?;
            debug!(address = %address, "key exchange completed");
            return Ok(None);
        }

        if !exchange.is_initiate() {
            return Err(ProtocolError::InvalidMessage(format!(
                "key exchange without initiate or response flag: {:#04x}",
                exchange.flags
            )));
        }

        // Both sides initiated at once: the larger base key keeps its own
        // handshake and the other side answers it.
        if let Some(pending) = &record.pending {
            let ours = IdentityKeyPair::from_secret_bytes(pending.base_secret).public_key();
            if ours.as_bytes() > &exchange.base_key {
                debug!(address = %address, "simultaneous key exchange, keeping ours");
                return Err(ProtocolError::StaleKeyExchange);
            }
        }

        let base = IdentityKeyPair::generate();
        let master = agreement(
            Role::Responder,
            &identity,
            &base,
            &exchange.identity_key,
            &exchange.base_key,
        );
        let state = derive_state(
            Role::Responder,
            &master,
            exchange.identity_key,
            exchange.base_key,
        );
        record.current = Some(state);
        record.pending = None;
        store.store_session(address, &record)?;
        store.save_identity(address.name(), &exchange.identity_key)?;
        debug!(address = %address, sequence = exchange.sequence, "key exchange answered");

        Ok(Some(
            KeyExchangeMessage {
                sequence: exchange.sequence,
                flags: KEY_EXCHANGE_RESPONSE,
                base_key: *base.public_key().as_bytes(),
                identity_key: identity.public_key(),
            }
            .serialize()?,
        ))
    }
}

fn check_trusted<S: ProtocolStore>(
    store: &S,
    address: &Address,
    identity_key: &IdentityKey,
) -> Result<(), ProtocolError> {
    if store.is_trusted_identity(address.name(), identity_key)? {
        Ok(())
    } else {
        warn!(address = %address, "untrusted identity key");
        Err(ProtocolError::UntrustedIdentity {
            name: address.name().to_string(),
            identity_key: *identity_key,
        })
    }
}

/// Computes the shared master secret.
///
/// Both sides concatenate the same three agreements in the same order:
/// initiator base with responder base, initiator identity with responder
/// base, initiator base with responder identity.
fn agreement(
    role: Role,
    our_identity: &IdentityKeyPair,
    our_base: &IdentityKeyPair,
    their_identity: &IdentityKey,
    their_base: &[u8; 32],
) -> Vec<u8> {
    let mut master = Vec::with_capacity(96);
    master.extend_from_slice(&our_base.diffie_hellman(their_base));
    match role {
        Role::Initiator => {
            master.extend_from_slice(&our_identity.diffie_hellman(their_base));
            master.extend_from_slice(&our_base.diffie_hellman(their_identity.as_bytes()));
        }
        Role::Responder => {
            master.extend_from_slice(&our_base.diffie_hellman(their_identity.as_bytes()));
            master.extend_from_slice(&our_identity.diffie_hellman(their_base));
        }
    }
    master
}

fn derive_state(
    role: Role,
    master: &[u8],
    remote_identity: IdentityKey,
    base_key: [u8; 32],
) -> SessionState {
    let (first, second) = HKDF::derive_key_pair(None, master, SESSION_INFO);
    let (sending, receiving) = match role {
        Role::Initiator => (first, second),
        Role::Responder => (second, first),
    };
    SessionState::new(remote_identity, base_key, sending, receiving)
}

fn message_key(chain: &[u8; 32], counter: u32) -> SymmetricKey {
    let counter_bytes = counter.to_be_bytes();
    SymmetricKey::from_bytes(HKDF::derive::<32>(None, chain, &[MESSAGE_INFO, &counter_bytes]))
}

fn decrypt_with_state(
    state: &mut SessionState,
    whisper: &WhisperMessage,
) -> Result<Vec<u8>, ProtocolError> {
    if state.has_received(whisper.counter) {
        return Err(ProtocolError::DuplicateMessage);
    }
    let key = message_key(&state.receiving_chain, whisper.counter);
    let plaintext = crypto::decrypt(&key, &whisper.ciphertext)
        .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?;
    state.mark_received(whisper.counter);
    Ok(plaintext)
}

fn random_sequence() -> Result<u32, ProtocolError> {
    let mut bytes = [0u8; 4];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| ProtocolError::InvalidKey("random generation failed".to_string()))?;
    // Keep the sequence small and non-zero.
    Ok((u32::from_be_bytes(bytes) & 0xFFFF) | 1)
}

//! Post-handshake session keys
//!
//! Both sides perform a static X25519 Diffie-Hellman between their
//! long-term agreement keys, then expand the shared secret with
//! HKDF-SHA-256 into one key per direction. The salt binds the swarm and
//! both handshake nonces, so two sessions between the same identities never
//! share keys. Application records are sealed with ChaCha20-Poly1305 under
//! a per-direction counter nonce.

use beenet_core::SwarmId;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

/// Domain prefix mixed into the HKDF salt
const DOMAIN_SESSION: &[u8] = b"bee-session";

const INFO_I2R: &[u8] = b"initiator->responder";
const INFO_R2I: &[u8] = b"responder->initiator";

/// Session crypto errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("peer supplied a non-contributory key")]
    DegenerateKey,
    #[error("AEAD encryption failed")]
    Encryption,
    #[error("AEAD decryption failed")]
    Decryption,
}

/// Directional symmetric keys for one session.
///
/// Created when a handshake completes; dropped when the session closes.
#[derive(Clone)]
pub struct SessionKeys {
    /// Key sealing outgoing records
    pub send_key: [u8; 32],
    /// Key opening incoming records
    pub recv_key: [u8; 32],
}

/// Derive directional session keys from the handshake state.
///
/// Both sides call this with mirrored `initiator` flags and obtain the
/// mirror key pair.
pub fn derive_session_keys(
    our_secret: &StaticSecret,
    their_agreement: &[u8; 32],
    swarm: &SwarmId,
    client_nonce: u64,
    server_nonce: u64,
    initiator: bool,
) -> Result<SessionKeys, SessionError> {
    let shared = our_secret.diffie_hellman(&X25519Public::from(*their_agreement));
    if !shared.was_contributory() {
        return Err(SessionError::DegenerateKey);
    }

    let mut salt = blake3::Hasher::new();
    salt.update(DOMAIN_SESSION);
    salt.update(swarm.as_bytes());
    salt.update(&client_nonce.to_be_bytes());
    salt.update(&server_nonce.to_be_bytes());
    let salt = salt.finalize();

    let hkdf = Hkdf::<Sha256>::new(Some(salt.as_bytes()), shared.as_bytes());

    let (send_info, recv_info) = if initiator {
        (INFO_I2R, INFO_R2I)
    } else {
        (INFO_R2I, INFO_I2R)
    };

    let mut send_key = [0u8; 32];
    let mut recv_key = [0u8; 32];
    hkdf.expand(send_info, &mut send_key)
        .map_err(|_| SessionError::KeyDerivation)?;
    hkdf.expand(recv_info, &mut recv_key)
        .map_err(|_| SessionError::KeyDerivation)?;

    Ok(SessionKeys { send_key, recv_key })
}

/// AEAD cipher pair for one session.
pub struct SessionCipher {
    send: ChaCha20Poly1305,
    recv: ChaCha20Poly1305,
    send_counter: u64,
}

impl SessionCipher {
    /// Build the cipher pair from derived keys.
    pub fn new(keys: &SessionKeys) -> Result<Self, SessionError> {
        let send = ChaCha20Poly1305::new_from_slice(&keys.send_key)
            .map_err(|_| SessionError::KeyDerivation)?;
        let recv = ChaCha20Poly1305::new_from_slice(&keys.recv_key)
            .map_err(|_| SessionError::KeyDerivation)?;
        Ok(Self {
            send,
            recv,
            send_counter: 0,
        })
    }

    /// Seal a record; returns the counter used and the ciphertext.
    ///
    /// The counter travels with the record so the peer can rebuild the
    /// nonce.
    pub fn seal(
        &mut self,
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<(u64, Vec<u8>), SessionError> {
        let counter = self.send_counter;
        self.send_counter += 1;
        let ciphertext = self
            .send
            .encrypt(
                &counter_nonce(counter),
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|_| SessionError::Encryption)?;
        Ok((counter, ciphertext))
    }

    /// Open a record sealed by the peer under the given counter.
    pub fn open(
        &self,
        ciphertext: &[u8],
        associated_data: &[u8],
        counter: u64,
    ) -> Result<Vec<u8>, SessionError> {
        self.recv
            .decrypt(
                &counter_nonce(counter),
                Payload {
                    msg: ciphertext,
                    aad: associated_data,
                },
            )
            .map_err(|_| SessionError::Decryption)
    }
}

fn counter_nonce(counter: u64) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[4..12].copy_from_slice(&counter.to_le_bytes());
    Nonce::from(bytes)
}

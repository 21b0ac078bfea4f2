//! Long-term bee identity
//!
//! Every bee owns two long-term key pairs: an Ed25519 signing pair whose
//! public half is the canonical BID, and an X25519 key-agreement pair used
//! by the session handshake. The two are persisted together.

use crate::error::{Error, Result};
use crate::handle::normalize_nickname;
use crate::honeytag;
use data_encoding::BASE32_NOPAD;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::StaticSecret;

/// String prefix for rendered BIDs
pub const BID_PREFIX: &str = "bee:";

/// Domain prefix for deriving the agreement secret from a signing seed
const DOMAIN_AGREEMENT: &[u8] = b"bee-agreement";

/// Canonical bee identifier: the raw Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Bid(pub [u8; 32]);

impl Bid {
    /// Get as raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse the `bee:<base32>` string form.
    pub fn parse(s: &str) -> Result<Self> {
        let encoded = s
            .strip_prefix(BID_PREFIX)
            .ok_or_else(|| Error::InvalidBid(format!("missing {BID_PREFIX} prefix")))?;
        let bytes = BASE32_NOPAD
            .decode(encoded.to_ascii_uppercase().as_bytes())
            .map_err(|e| Error::InvalidBid(format!("base32 decode: {e}")))?;
        let raw: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::InvalidBid("key must be 32 bytes".into()))?;
        Ok(Self(raw))
    }

    /// The Ed25519 verifying key this BID names.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).map_err(|e| Error::InvalidPublicKey(e.to_string()))
    }
}

impl std::fmt::Display for Bid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let encoded = BASE32_NOPAD.encode(&self.0).to_ascii_lowercase();
        write!(f, "{BID_PREFIX}{encoded}")
    }
}

impl std::fmt::Debug for Bid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bid({})", hex::encode(&self.0[..8]))
    }
}

impl std::str::FromStr for Bid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Serializable long-term key material.
///
/// Persistence location and format framing are the caller's concern; this
/// record round-trips exactly through serde.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityKeys {
    /// Ed25519 signing key seed
    pub signing_seed: [u8; 32],
    /// X25519 key-agreement secret
    pub agreement_secret: [u8; 32],
}

/// A bee's long-term identity: signing key plus key-agreement key.
#[derive(Clone)]
pub struct Identity {
    signing: SigningKey,
    agreement: StaticSecret,
}

impl Identity {
    /// Generate a fresh identity from OS randomness.
    ///
    /// The agreement secret is independently generated, not derived from
    /// the signing seed; both halves persist together via [`IdentityKeys`].
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let agreement = StaticSecret::random_from_rng(OsRng);
        Self { signing, agreement }
    }

    /// Deterministically derive an identity from a 32-byte seed.
    ///
    /// The agreement secret is BLAKE3("bee-agreement" || seed).
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(seed);
        let mut hasher = blake3::Hasher::new();
        hasher.update(DOMAIN_AGREEMENT);
        hasher.update(seed);
        let agreement = StaticSecret::from(*hasher.finalize().as_bytes());
        Self { signing, agreement }
    }

    /// Reconstruct an identity from persisted key material.
    pub fn from_keys(keys: &IdentityKeys) -> Self {
        Self {
            signing: SigningKey::from_bytes(&keys.signing_seed),
            agreement: StaticSecret::from(keys.agreement_secret),
        }
    }

    /// Export the key material for persistence.
    pub fn to_keys(&self) -> IdentityKeys {
        IdentityKeys {
            signing_seed: self.signing.to_bytes(),
            agreement_secret: self.agreement.to_bytes(),
        }
    }

    /// The canonical BID for this identity.
    pub fn bid(&self) -> Bid {
        Bid(self.signing.verifying_key().to_bytes())
    }

    /// Pronounceable fingerprint of the BID.
    pub fn honeytag(&self) -> String {
        honeytag::honeytag(&self.bid())
    }

    /// Swarm-scoped handle `nickname~honeytag` for this identity.
    pub fn handle(&self, nickname: &str) -> Result<String> {
        let nickname = normalize_nickname(nickname)?;
        Ok(format!("{}~{}", nickname, self.honeytag()))
    }

    /// Sign a message with the long-term signing key.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }

    /// The Ed25519 signing key.
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    /// The Ed25519 verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// The X25519 key-agreement secret.
    pub fn agreement_secret(&self) -> &StaticSecret {
        &self.agreement
    }

    /// The X25519 key-agreement public key.
    pub fn agreement_public(&self) -> [u8; 32] {
        *x25519_dalek::PublicKey::from(&self.agreement).as_bytes()
    }

    /// Verify a signature against an arbitrary public key.
    pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> Result<()> {
        let key = VerifyingKey::from_bytes(public_key)
            .map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
        let sig = Signature::from_bytes(signature);
        key.verify(message, &sig).map_err(|_| Error::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let id = Identity::generate();
        let msg = b"waggle dance";
        let sig = id.sign(msg);

        assert!(Identity::verify(id.bid().as_bytes(), msg, &sig).is_ok());
    }

    #[test]
    fn test_bid_roundtrip() {
        let id = Identity::generate();
        let bid = id.bid();
        let rendered = bid.to_string();

        assert!(rendered.starts_with(BID_PREFIX));
        assert_eq!(Bid::parse(&rendered).unwrap(), bid);
    }

    #[test]
    fn test_bid_rejects_garbage() {
        assert!(Bid::parse("bee:!!!").is_err());
        assert!(Bid::parse("nope:abcd").is_err());
        assert!(Bid::parse("bee:me").is_err());
    }

    #[test]
    fn test_keys_roundtrip() {
        let id = Identity::from_seed(&[7u8; 32]);
        let keys = id.to_keys();
        let restored = Identity::from_keys(&keys);

        assert_eq!(id.bid(), restored.bid());
        assert_eq!(id.agreement_public(), restored.agreement_public());
    }

    #[test]
    fn test_from_seed_deterministic() {
        let a = Identity::from_seed(&[1u8; 32]);
        let b = Identity::from_seed(&[1u8; 32]);
        assert_eq!(a.bid(), b.bid());
        assert_eq!(a.agreement_public(), b.agreement_public());

        let c = Identity::from_seed(&[2u8; 32]);
        assert_ne!(a.bid(), c.bid());
    }

    #[test]
    fn test_handle_ends_with_honeytag() {
        let id = Identity::generate();
        let handle = id.handle("worker-bee").unwrap();
        assert!(handle.ends_with(&format!("~{}", id.honeytag())));
    }
}

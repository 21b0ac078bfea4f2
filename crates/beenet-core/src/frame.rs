//! Wire envelopes and the record signing discipline
//!
//! Every message on the wire travels inside a [`BaseFrame`]: a canonically
//! encoded envelope carrying the sender BID, a strictly increasing sequence
//! number, a millisecond timestamp, a numeric kind, the kind-specific body
//! bytes, and an Ed25519 signature over the canonical bytes of everything
//! but the signature itself. The same sign-with-field-cleared discipline is
//! exposed generically for presence, provider, and handle records.

use crate::canonical::{from_cbor, to_canonical_cbor};
use crate::error::{Error, Result};
use crate::identity::Bid;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current protocol version carried in every envelope
pub const PROTOCOL_VERSION: u16 = 1;

/// Known message kinds.
///
/// Kinds 60-68 are reserved for failure-detection gossip and are not
/// dispatched by this implementation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Kind {
    /// Liveness probe
    Ping = 1,
    /// Liveness response
    Pong = 2,
    /// DHT record read
    DhtGet = 10,
    /// DHT record write
    DhtPut = 11,
    /// Presence announcement
    AnnouncePresence = 20,
    /// Pub/sub application message
    PubSub = 30,
    /// Content chunk request
    FetchChunk = 40,
    /// Content chunk response
    ChunkData = 41,
    /// Honeytag naming operation
    HoneytagOp = 50,
    /// Gossip: advertise known message ids
    IHave = 70,
    /// Gossip: request message ids
    IWant = 71,
    /// Gossip: join a topic mesh
    Graft = 72,
    /// Gossip: leave a topic mesh
    Prune = 73,
    /// Gossip: mesh liveness beacon
    Heartbeat = 74,
}

impl TryFrom<u16> for Kind {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            1 => Ok(Self::Ping),
            2 => Ok(Self::Pong),
            10 => Ok(Self::DhtGet),
            11 => Ok(Self::DhtPut),
            20 => Ok(Self::AnnouncePresence),
            30 => Ok(Self::PubSub),
            40 => Ok(Self::FetchChunk),
            41 => Ok(Self::ChunkData),
            50 => Ok(Self::HoneytagOp),
            70 => Ok(Self::IHave),
            71 => Ok(Self::IWant),
            72 => Ok(Self::Graft),
            73 => Ok(Self::Prune),
            74 => Ok(Self::Heartbeat),
            other => Err(Error::UnknownKind(other)),
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A record with a designated signature field.
///
/// Signing canonically encodes the record with the signature cleared, signs
/// those bytes, and stores the result in the field; verification reverses
/// the steps. BaseFrame, PresenceRecord, ProvideRecord, HandleIndex, and
/// both handshake hellos all follow this rule.
pub trait Signable: Serialize + Clone {
    /// Mutable access to the signature field
    fn signature_mut(&mut self) -> &mut Vec<u8>;
    /// The stored signature bytes
    fn signature(&self) -> &[u8];
}

/// Canonical bytes of a record with its signature cleared.
pub fn signing_bytes<T: Signable>(record: &T) -> Result<Vec<u8>> {
    let mut unsigned = record.clone();
    unsigned.signature_mut().clear();
    to_canonical_cbor(&unsigned)
}

/// Sign a record in place.
pub fn sign_record<T: Signable>(record: &mut T, key: &SigningKey) -> Result<()> {
    let bytes = signing_bytes(record)?;
    *record.signature_mut() = key.sign(&bytes).to_vec();
    Ok(())
}

/// Verify a record's stored signature.
pub fn verify_record<T: Signable>(record: &T, key: &VerifyingKey) -> Result<()> {
    let raw: [u8; 64] = record
        .signature()
        .try_into()
        .map_err(|_| Error::InvalidSignature)?;
    let bytes = signing_bytes(record)?;
    key.verify(&bytes, &Signature::from_bytes(&raw))
        .map_err(|_| Error::InvalidSignature)
}

/// Canonical wire envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaseFrame {
    /// Protocol version
    pub version: u16,
    /// Numeric message kind
    pub kind: u16,
    /// Sender BID
    pub from: Bid,
    /// Strictly increasing per-sender sequence number
    pub seq: u64,
    /// Milliseconds since the Unix epoch
    pub ts_ms: u64,
    /// Kind-specific body bytes
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
    /// Ed25519 signature over the canonical bytes of the other fields
    #[serde(with = "serde_bytes")]
    pub sig: Vec<u8>,
}

impl Signable for BaseFrame {
    fn signature_mut(&mut self) -> &mut Vec<u8> {
        &mut self.sig
    }

    fn signature(&self) -> &[u8] {
        &self.sig
    }
}

impl BaseFrame {
    /// Build an unsigned envelope stamped with the current time.
    pub fn new(kind: Kind, from: Bid, seq: u64, body: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            kind: kind as u16,
            from,
            seq,
            ts_ms: unix_millis(),
            body,
            sig: Vec::new(),
        }
    }

    /// Build, sign, and return an envelope in one step.
    pub fn signed(kind: Kind, from: Bid, seq: u64, body: Vec<u8>, key: &SigningKey) -> Result<Self> {
        let mut frame = Self::new(kind, from, seq, body);
        sign_record(&mut frame, key)?;
        Ok(frame)
    }

    /// Sign in place with the sender's key.
    pub fn sign(&mut self, key: &SigningKey) -> Result<()> {
        sign_record(self, key)
    }

    /// Verify the stored signature.
    pub fn verify(&self, key: &VerifyingKey) -> Result<()> {
        if self.version != PROTOCOL_VERSION {
            return Err(Error::VersionMismatch {
                got: self.version,
                want: PROTOCOL_VERSION,
            });
        }
        verify_record(self, key)
    }

    /// The typed message kind.
    pub fn message_kind(&self) -> Result<Kind> {
        Kind::try_from(self.kind)
    }

    /// Canonical wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        to_canonical_cbor(self)
    }

    /// Decode from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        from_cbor(bytes)
    }
}

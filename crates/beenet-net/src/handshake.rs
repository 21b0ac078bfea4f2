//! Session handshake
//!
//! Takes an already-established byte stream and produces directional
//! session keys plus a proven binding of peer BID and swarm. The exchange
//! is a single signed ClientHello answered by a signed ServerHello; both
//! hellos follow the common record signing discipline. Optional admission
//! proofs ride along: a keyed PSK MAC and a swarm-issuer admission token.
//!
//! Initiator view of the state machine:
//!
//! ```text
//!     new ──create_client_hello──► awaiting_server_hello
//!                                        │
//!                           process_server_hello
//!                                        ▼
//!                                    complete
//! ```
//!
//! Either side moves to `failed` on signature failure, swarm mismatch, PSK
//! mismatch, token failure, or nonce replay. Those are all fatal; only
//! transport-level read failures mid-handshake are worth a retry with a
//! fresh nonce.

use crate::keyring::KeyRegistry;
use crate::session::{derive_session_keys, SessionError, SessionKeys};
use beenet_core::frame::{sign_record, unix_millis, verify_record, Signable, PROTOCOL_VERSION};
use beenet_core::{Bid, Error as CoreError, Identity, SwarmId};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashSet;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Handshake errors; every variant aborts the session.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("protocol version mismatch: got {got}, want {want}")]
    VersionMismatch { got: u16, want: u16 },
    #[error("swarm mismatch: hello is for {got}, local swarm is {want}")]
    SwarmMismatch { got: SwarmId, want: SwarmId },
    #[error("psk required but hello carried none")]
    PskRequired,
    #[error("psk mismatch")]
    PskMismatch,
    #[error("admission token required but hello carried none")]
    TokenRequired,
    #[error("admission token expired at {0}")]
    TokenExpired(u64),
    #[error("admission token rejected")]
    TokenInvalid,
    #[error("hello signature failure")]
    SignatureFailure,
    #[error("unknown sender identity {0}")]
    UnknownSender(Bid),
    #[error("handshake nonce {0} replayed")]
    NonceReplayed(u64),
    #[error("handshake not in state {0}")]
    InvalidState(&'static str),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<CoreError> for HandshakeError {
    fn from(e: CoreError) -> Self {
        Self::Encoding(e.to_string())
    }
}

/// First handshake message, initiator -> responder.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientHello {
    pub version: u16,
    pub swarm_id: SwarmId,
    pub from: Bid,
    pub nonce: u64,
    pub caps: Vec<String>,
    /// Initiator's X25519 key-agreement public key
    pub agreement_key: [u8; 32],
    pub psk_hint: Option<String>,
    pub psk_proof: Option<Vec<u8>>,
    pub token: Option<String>,
    pub token_proof: Option<Vec<u8>>,
    pub token_expiry: Option<u64>,
    #[serde(with = "serde_bytes")]
    pub sig: Vec<u8>,
}

impl Signable for ClientHello {
    fn signature_mut(&mut self) -> &mut Vec<u8> {
        &mut self.sig
    }

    fn signature(&self) -> &[u8] {
        &self.sig
    }
}

/// Second handshake message, responder -> initiator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerHello {
    pub version: u16,
    pub swarm_id: SwarmId,
    pub from: Bid,
    pub nonce: u64,
    pub caps: Vec<String>,
    /// Responder's X25519 key-agreement public key
    pub agreement_key: [u8; 32],
    pub psk_proof: Option<Vec<u8>>,
    #[serde(with = "serde_bytes")]
    pub sig: Vec<u8>,
}

impl Signable for ServerHello {
    fn signature_mut(&mut self) -> &mut Vec<u8> {
        &mut self.sig
    }

    fn signature(&self) -> &[u8] {
        &self.sig
    }
}

/// Pre-shared key configuration.
///
/// Secrets shorter than 32 bytes are zero-padded up to 32 before keying the
/// MAC; longer secrets are used as-is.
#[derive(Clone)]
pub struct PskConfig {
    pub hint: String,
    pub secret: Vec<u8>,
}

impl PskConfig {
    fn mac_key(&self) -> Vec<u8> {
        let mut key = self.secret.clone();
        if key.len() < 32 {
            key.resize(32, 0);
        }
        key
    }
}

/// Responder-side admission policy.
#[derive(Clone)]
pub struct AdmissionPolicy {
    /// Swarm issuer's verifying key
    pub issuer_key: VerifyingKey,
    /// Tokens currently allowed to join
    pub allowed_tokens: HashSet<String>,
}

/// Initiator-side admission token with the issuer's signature.
#[derive(Clone)]
pub struct ClientToken {
    pub token: String,
    /// Absolute expiry, seconds since the Unix epoch
    pub expiry_secs: u64,
    pub proof: Vec<u8>,
}

/// Sign bytes for an admission token: `token:swarm:expiry`.
fn token_sign_bytes(token: &str, swarm: &SwarmId, expiry_secs: u64) -> Vec<u8> {
    format!("{token}:{swarm}:{expiry_secs}").into_bytes()
}

/// Issue an admission token for a swarm (issuer-side helper).
pub fn issue_token(
    issuer: &SigningKey,
    token: &str,
    swarm: &SwarmId,
    expiry_secs: u64,
) -> ClientToken {
    let proof = issuer
        .sign(&token_sign_bytes(token, swarm, expiry_secs))
        .to_vec();
    ClientToken {
        token: token.to_string(),
        expiry_secs,
        proof,
    }
}

/// Per-session handshake configuration.
#[derive(Clone)]
pub struct HandshakeConfig {
    pub swarm_id: SwarmId,
    pub caps: Vec<String>,
    pub psk: Option<PskConfig>,
    /// Responder: when set, admission tokens are mandatory
    pub admission: Option<AdmissionPolicy>,
    /// Initiator: attached to the ClientHello when set
    pub token: Option<ClientToken>,
}

impl HandshakeConfig {
    pub fn new(swarm_id: SwarmId) -> Self {
        Self {
            swarm_id,
            caps: Vec::new(),
            psk: None,
            admission: None,
            token: None,
        }
    }

    pub fn with_psk(mut self, psk: PskConfig) -> Self {
        self.psk = Some(psk);
        self
    }

    pub fn with_admission(mut self, policy: AdmissionPolicy) -> Self {
        self.admission = Some(policy);
        self
    }

    pub fn with_token(mut self, token: ClientToken) -> Self {
        self.token = Some(token);
        self
    }
}

/// Fresh 64-bit handshake nonce: millisecond clock mixed with randomness,
/// collision-resistant across concurrent handshakes on one identity.
fn fresh_nonce() -> u64 {
    unix_millis() ^ rand::rngs::OsRng.next_u64()
}

/// HMAC-SHA-256 over the canonical hello bytes with `sig` and `psk_proof`
/// cleared.
fn client_psk_mac(hello: &ClientHello, psk: &PskConfig) -> Result<Vec<u8>, HandshakeError> {
    let mut unsigned = hello.clone();
    unsigned.sig.clear();
    unsigned.psk_proof = None;
    let bytes = beenet_core::canonical::to_canonical_cbor(&unsigned)
        .map_err(|e| HandshakeError::Encoding(e.to_string()))?;
    psk_mac(&bytes, psk)
}

fn server_psk_mac(hello: &ServerHello, psk: &PskConfig) -> Result<Vec<u8>, HandshakeError> {
    let mut unsigned = hello.clone();
    unsigned.sig.clear();
    unsigned.psk_proof = None;
    let bytes = beenet_core::canonical::to_canonical_cbor(&unsigned)
        .map_err(|e| HandshakeError::Encoding(e.to_string()))?;
    psk_mac(&bytes, psk)
}

fn psk_mac(bytes: &[u8], psk: &PskConfig) -> Result<Vec<u8>, HandshakeError> {
    let mut mac =
        HmacSha256::new_from_slice(&psk.mac_key()).map_err(|_| HandshakeError::PskMismatch)?;
    mac.update(bytes);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time MAC comparison.
fn mac_matches(expected: &[u8], got: &[u8]) -> bool {
    expected.len() == got.len() && bool::from(expected.ct_eq(got))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    New,
    AwaitingServerHello,
    Complete,
    Failed,
}

/// Initiator half of the handshake.
pub struct Initiator {
    identity: Identity,
    config: HandshakeConfig,
    state: State,
    nonce: u64,
    keys: Option<SessionKeys>,
    peer: Option<Bid>,
}

impl Initiator {
    pub fn new(identity: Identity, config: HandshakeConfig) -> Self {
        Self {
            identity,
            config,
            state: State::New,
            nonce: 0,
            keys: None,
            peer: None,
        }
    }

    /// Build and sign the ClientHello.
    pub fn create_client_hello(&mut self) -> Result<ClientHello, HandshakeError> {
        if self.state != State::New {
            return Err(HandshakeError::InvalidState("new"));
        }
        self.nonce = fresh_nonce();

        let mut hello = ClientHello {
            version: PROTOCOL_VERSION,
            swarm_id: self.config.swarm_id,
            from: self.identity.bid(),
            nonce: self.nonce,
            caps: self.config.caps.clone(),
            agreement_key: self.identity.agreement_public(),
            psk_hint: None,
            psk_proof: None,
            token: None,
            token_proof: None,
            token_expiry: None,
            sig: Vec::new(),
        };

        if let Some(token) = &self.config.token {
            hello.token = Some(token.token.clone());
            hello.token_proof = Some(token.proof.clone());
            hello.token_expiry = Some(token.expiry_secs);
        }
        if let Some(psk) = &self.config.psk {
            hello.psk_hint = Some(psk.hint.clone());
            hello.psk_proof = Some(client_psk_mac(&hello, psk)?);
        }
        sign_record(&mut hello, self.identity.signing_key())?;

        self.state = State::AwaitingServerHello;
        Ok(hello)
    }

    /// Process the responder's ServerHello and derive session keys.
    pub fn process_server_hello(
        &mut self,
        hello: &ServerHello,
        registry: &KeyRegistry,
    ) -> Result<(), HandshakeError> {
        if self.state != State::AwaitingServerHello {
            return Err(HandshakeError::InvalidState("awaiting_server_hello"));
        }
        let outcome = self.check_server_hello(hello, registry);
        if outcome.is_err() {
            self.state = State::Failed;
        }
        outcome
    }

    fn check_server_hello(
        &mut self,
        hello: &ServerHello,
        registry: &KeyRegistry,
    ) -> Result<(), HandshakeError> {
        if hello.version != PROTOCOL_VERSION {
            return Err(HandshakeError::VersionMismatch {
                got: hello.version,
                want: PROTOCOL_VERSION,
            });
        }
        if hello.swarm_id != self.config.swarm_id {
            return Err(HandshakeError::SwarmMismatch {
                got: hello.swarm_id,
                want: self.config.swarm_id,
            });
        }
        if let Some(psk) = &self.config.psk {
            let proof = hello.psk_proof.as_ref().ok_or(HandshakeError::PskRequired)?;
            let expected = server_psk_mac(hello, psk)?;
            if !mac_matches(&expected, proof) {
                return Err(HandshakeError::PskMismatch);
            }
        }
        let key = registry
            .lookup(&hello.from)
            .ok_or(HandshakeError::UnknownSender(hello.from))?;
        verify_record(hello, &key).map_err(|_| HandshakeError::SignatureFailure)?;

        let keys = derive_session_keys(
            self.identity.agreement_secret(),
            &hello.agreement_key,
            &self.config.swarm_id,
            self.nonce,
            hello.nonce,
            true,
        )?;

        debug!(peer = %hello.from, "handshake complete (initiator)");
        self.keys = Some(keys);
        self.peer = Some(hello.from);
        self.state = State::Complete;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    pub fn session_keys(&self) -> Option<&SessionKeys> {
        self.keys.as_ref()
    }

    /// The authenticated peer BID, once complete.
    pub fn peer(&self) -> Option<Bid> {
        self.peer
    }
}

/// Responder half of the handshake.
pub struct Responder {
    identity: Identity,
    config: HandshakeConfig,
    state: State,
    seen_nonces: HashSet<u64>,
    keys: Option<SessionKeys>,
    peer: Option<Bid>,
}

impl Responder {
    pub fn new(identity: Identity, config: HandshakeConfig) -> Self {
        Self {
            identity,
            config,
            state: State::New,
            seen_nonces: HashSet::new(),
            keys: None,
            peer: None,
        }
    }

    /// Validate a ClientHello and answer with a signed ServerHello.
    ///
    /// A responder may process hellos for successive session attempts;
    /// the nonce set rejects replays of any hello it already answered.
    pub fn process_client_hello(
        &mut self,
        hello: &ClientHello,
        registry: &KeyRegistry,
    ) -> Result<ServerHello, HandshakeError> {
        let outcome = self.check_client_hello(hello, registry);
        if outcome.is_err() {
            self.state = State::Failed;
        }
        outcome
    }

    fn check_client_hello(
        &mut self,
        hello: &ClientHello,
        registry: &KeyRegistry,
    ) -> Result<ServerHello, HandshakeError> {
        if hello.version != PROTOCOL_VERSION {
            return Err(HandshakeError::VersionMismatch {
                got: hello.version,
                want: PROTOCOL_VERSION,
            });
        }
        if hello.swarm_id != self.config.swarm_id {
            return Err(HandshakeError::SwarmMismatch {
                got: hello.swarm_id,
                want: self.config.swarm_id,
            });
        }
        if let Some(psk) = &self.config.psk {
            let hint = hello.psk_hint.as_ref().ok_or(HandshakeError::PskRequired)?;
            let proof = hello.psk_proof.as_ref().ok_or(HandshakeError::PskRequired)?;
            if hint != &psk.hint {
                return Err(HandshakeError::PskMismatch);
            }
            let expected = client_psk_mac(hello, psk)?;
            if !mac_matches(&expected, proof) {
                return Err(HandshakeError::PskMismatch);
            }
        }
        if let Some(policy) = &self.config.admission {
            let token = hello.token.as_ref().ok_or(HandshakeError::TokenRequired)?;
            let proof = hello.token_proof.as_ref().ok_or(HandshakeError::TokenRequired)?;
            let expiry = hello.token_expiry.ok_or(HandshakeError::TokenRequired)?;
            if !policy.allowed_tokens.contains(token) {
                return Err(HandshakeError::TokenInvalid);
            }
            if unix_millis() / 1000 > expiry {
                return Err(HandshakeError::TokenExpired(expiry));
            }
            let raw: [u8; 64] = proof
                .as_slice()
                .try_into()
                .map_err(|_| HandshakeError::TokenInvalid)?;
            policy
                .issuer_key
                .verify(
                    &token_sign_bytes(token, &self.config.swarm_id, expiry),
                    &Signature::from_bytes(&raw),
                )
                .map_err(|_| HandshakeError::TokenInvalid)?;
        }
        let key = registry
            .lookup(&hello.from)
            .ok_or(HandshakeError::UnknownSender(hello.from))?;
        verify_record(hello, &key).map_err(|_| HandshakeError::SignatureFailure)?;

        if !self.seen_nonces.insert(hello.nonce) {
            return Err(HandshakeError::NonceReplayed(hello.nonce));
        }

        let server_nonce = fresh_nonce();
        let mut reply = ServerHello {
            version: PROTOCOL_VERSION,
            swarm_id: self.config.swarm_id,
            from: self.identity.bid(),
            nonce: server_nonce,
            caps: self.config.caps.clone(),
            agreement_key: self.identity.agreement_public(),
            psk_proof: None,
            sig: Vec::new(),
        };
        if let Some(psk) = &self.config.psk {
            reply.psk_proof = Some(server_psk_mac(&reply, psk)?);
        }
        sign_record(&mut reply, self.identity.signing_key())?;

        let keys = derive_session_keys(
            self.identity.agreement_secret(),
            &hello.agreement_key,
            &self.config.swarm_id,
            hello.nonce,
            server_nonce,
            false,
        )?;

        debug!(peer = %hello.from, "handshake complete (responder)");
        self.keys = Some(keys);
        self.peer = Some(hello.from);
        self.state = State::Complete;
        Ok(reply)
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    pub fn session_keys(&self) -> Option<&SessionKeys> {
        self.keys.as_ref()
    }

    /// The authenticated peer BID, once complete.
    pub fn peer(&self) -> Option<Bid> {
        self.peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn fresh_parties() -> (Identity, Identity, KeyRegistry) {
        let client = Identity::generate();
        let server = Identity::generate();
        let registry = KeyRegistry::new();
        registry.register_identity(&client);
        registry.register_identity(&server);
        (client, server, registry)
    }

    fn random_psk() -> Vec<u8> {
        let mut secret = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        secret
    }

    #[test]
    fn test_handshake_with_psk() {
        let (client_id, server_id, registry) = fresh_parties();
        let swarm = SwarmId::generate();
        let secret = random_psk();
        let psk = PskConfig {
            hint: "test-psk".into(),
            secret,
        };

        let mut client = Initiator::new(
            client_id,
            HandshakeConfig::new(swarm).with_psk(psk.clone()),
        );
        let mut server = Responder::new(server_id, HandshakeConfig::new(swarm).with_psk(psk));

        let client_hello = client.create_client_hello().unwrap();
        assert_eq!(client_hello.psk_hint.as_deref(), Some("test-psk"));
        assert!(!client_hello.psk_proof.as_ref().unwrap().is_empty());

        let server_hello = server.process_client_hello(&client_hello, &registry).unwrap();
        assert!(server_hello.psk_proof.is_some());
        assert!(server.is_complete());

        client.process_server_hello(&server_hello, &registry).unwrap();
        assert!(client.is_complete());

        let client_keys = client.session_keys().unwrap();
        let server_keys = server.session_keys().unwrap();
        assert_eq!(client_keys.send_key, server_keys.recv_key);
        assert_eq!(client_keys.recv_key, server_keys.send_key);
        assert_ne!(client_keys.send_key, [0u8; 32]);
    }

    #[test]
    fn test_wrong_psk_rejected() {
        let (client_id, server_id, registry) = fresh_parties();
        let swarm = SwarmId::generate();

        let client_psk = PskConfig {
            hint: "test-psk".into(),
            secret: random_psk(),
        };
        let server_psk = PskConfig {
            hint: "test-psk".into(),
            secret: random_psk(),
        };

        let mut client = Initiator::new(client_id, HandshakeConfig::new(swarm).with_psk(client_psk));
        let mut server = Responder::new(server_id, HandshakeConfig::new(swarm).with_psk(server_psk));

        let client_hello = client.create_client_hello().unwrap();
        assert!(matches!(
            server.process_client_hello(&client_hello, &registry),
            Err(HandshakeError::PskMismatch)
        ));
        assert!(!server.is_complete());
    }

    #[test]
    fn test_missing_psk_rejected() {
        let (client_id, server_id, registry) = fresh_parties();
        let swarm = SwarmId::generate();
        let psk = PskConfig {
            hint: "hinted".into(),
            secret: random_psk(),
        };

        let mut client = Initiator::new(client_id, HandshakeConfig::new(swarm));
        let mut server = Responder::new(server_id, HandshakeConfig::new(swarm).with_psk(psk));

        let client_hello = client.create_client_hello().unwrap();
        assert!(matches!(
            server.process_client_hello(&client_hello, &registry),
            Err(HandshakeError::PskRequired)
        ));
    }

    #[test]
    fn test_short_psk_is_padded() {
        let (client_id, server_id, registry) = fresh_parties();
        let swarm = SwarmId::generate();
        let psk = PskConfig {
            hint: "short".into(),
            secret: b"tiny".to_vec(),
        };

        let mut client = Initiator::new(client_id, HandshakeConfig::new(swarm).with_psk(psk.clone()));
        let mut server = Responder::new(server_id, HandshakeConfig::new(swarm).with_psk(psk));

        let hello = client.create_client_hello().unwrap();
        let reply = server.process_client_hello(&hello, &registry).unwrap();
        client.process_server_hello(&reply, &registry).unwrap();
        assert!(client.is_complete() && server.is_complete());
    }

    #[test]
    fn test_swarm_mismatch_rejected() {
        let (client_id, server_id, registry) = fresh_parties();

        let mut client = Initiator::new(client_id, HandshakeConfig::new(SwarmId::generate()));
        let mut server = Responder::new(server_id, HandshakeConfig::new(SwarmId::generate()));

        let hello = client.create_client_hello().unwrap();
        assert!(matches!(
            server.process_client_hello(&hello, &registry),
            Err(HandshakeError::SwarmMismatch { .. })
        ));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let (client_id, server_id, registry) = fresh_parties();
        let swarm = SwarmId::generate();

        let mut client = Initiator::new(client_id.clone(), HandshakeConfig::new(swarm));
        let mut server = Responder::new(server_id, HandshakeConfig::new(swarm));

        let mut hello = client.create_client_hello().unwrap();
        hello.version = 42;
        sign_record(&mut hello, client_id.signing_key()).unwrap();

        assert!(matches!(
            server.process_client_hello(&hello, &registry),
            Err(HandshakeError::VersionMismatch { got: 42, .. })
        ));
    }

    #[test]
    fn test_unknown_sender_rejected() {
        let (client_id, server_id, _) = fresh_parties();
        let registry = KeyRegistry::new(); // empty: nobody is known
        let swarm = SwarmId::generate();

        let mut client = Initiator::new(client_id, HandshakeConfig::new(swarm));
        let mut server = Responder::new(server_id, HandshakeConfig::new(swarm));

        let hello = client.create_client_hello().unwrap();
        assert!(matches!(
            server.process_client_hello(&hello, &registry),
            Err(HandshakeError::UnknownSender(_))
        ));
    }

    #[test]
    fn test_tampered_hello_rejected() {
        let (client_id, server_id, registry) = fresh_parties();
        let swarm = SwarmId::generate();

        let mut client = Initiator::new(client_id, HandshakeConfig::new(swarm));
        let mut server = Responder::new(server_id, HandshakeConfig::new(swarm));

        let mut hello = client.create_client_hello().unwrap();
        hello.nonce ^= 1;
        assert!(matches!(
            server.process_client_hello(&hello, &registry),
            Err(HandshakeError::SignatureFailure)
        ));
    }

    #[test]
    fn test_nonce_replay_rejected() {
        let (client_id, server_id, registry) = fresh_parties();
        let swarm = SwarmId::generate();

        let mut client = Initiator::new(client_id, HandshakeConfig::new(swarm));
        let mut server = Responder::new(server_id, HandshakeConfig::new(swarm));

        let hello = client.create_client_hello().unwrap();
        server.process_client_hello(&hello, &registry).unwrap();
        assert!(matches!(
            server.process_client_hello(&hello, &registry),
            Err(HandshakeError::NonceReplayed(_))
        ));
    }

    #[test]
    fn test_admission_token_accepted() {
        let (client_id, server_id, registry) = fresh_parties();
        let swarm = SwarmId::generate();
        let issuer = Identity::generate();

        let token = issue_token(issuer.signing_key(), "golden-ticket", &swarm, u64::MAX / 1000);
        let policy = AdmissionPolicy {
            issuer_key: issuer.verifying_key(),
            allowed_tokens: ["golden-ticket".to_string()].into_iter().collect(),
        };

        let mut client = Initiator::new(client_id, HandshakeConfig::new(swarm).with_token(token));
        let mut server =
            Responder::new(server_id, HandshakeConfig::new(swarm).with_admission(policy));

        let hello = client.create_client_hello().unwrap();
        assert!(hello.token.is_some() && hello.token_proof.is_some());
        let reply = server.process_client_hello(&hello, &registry).unwrap();
        client.process_server_hello(&reply, &registry).unwrap();
        assert!(client.is_complete() && server.is_complete());
    }

    #[test]
    fn test_admission_token_expired() {
        let (client_id, server_id, registry) = fresh_parties();
        let swarm = SwarmId::generate();
        let issuer = Identity::generate();

        let token = issue_token(issuer.signing_key(), "stale", &swarm, 1);
        let policy = AdmissionPolicy {
            issuer_key: issuer.verifying_key(),
            allowed_tokens: ["stale".to_string()].into_iter().collect(),
        };

        let mut client = Initiator::new(client_id, HandshakeConfig::new(swarm).with_token(token));
        let mut server =
            Responder::new(server_id, HandshakeConfig::new(swarm).with_admission(policy));

        let hello = client.create_client_hello().unwrap();
        assert!(matches!(
            server.process_client_hello(&hello, &registry),
            Err(HandshakeError::TokenExpired(1))
        ));
    }

    #[test]
    fn test_admission_token_missing() {
        let (client_id, server_id, registry) = fresh_parties();
        let swarm = SwarmId::generate();
        let issuer = Identity::generate();
        let policy = AdmissionPolicy {
            issuer_key: issuer.verifying_key(),
            allowed_tokens: HashSet::new(),
        };

        let mut client = Initiator::new(client_id, HandshakeConfig::new(swarm));
        let mut server =
            Responder::new(server_id, HandshakeConfig::new(swarm).with_admission(policy));

        let hello = client.create_client_hello().unwrap();
        assert!(matches!(
            server.process_client_hello(&hello, &registry),
            Err(HandshakeError::TokenRequired)
        ));
    }

    #[test]
    fn test_admission_token_wrong_issuer() {
        let (client_id, server_id, registry) = fresh_parties();
        let swarm = SwarmId::generate();
        let issuer = Identity::generate();
        let impostor = Identity::generate();

        let token = issue_token(impostor.signing_key(), "forged", &swarm, u64::MAX / 1000);
        let policy = AdmissionPolicy {
            issuer_key: issuer.verifying_key(),
            allowed_tokens: ["forged".to_string()].into_iter().collect(),
        };

        let mut client = Initiator::new(client_id, HandshakeConfig::new(swarm).with_token(token));
        let mut server =
            Responder::new(server_id, HandshakeConfig::new(swarm).with_admission(policy));

        let hello = client.create_client_hello().unwrap();
        assert!(matches!(
            server.process_client_hello(&hello, &registry),
            Err(HandshakeError::TokenInvalid)
        ));
    }
}

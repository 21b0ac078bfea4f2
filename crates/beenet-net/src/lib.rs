//! Beenet network layer
//!
//! Session establishment and the narrow interfaces the mesh core consumes:
//!
//! - [`transport`]: stream-oriented Transport/Connection/Listener traits,
//!   a TCP implementation, and an in-memory pair for tests
//! - [`framing`]: length-prefixed frame codec
//! - [`handshake`]: mutual-auth hello exchange with PSK and admission tokens
//! - [`session`]: post-handshake AEAD session keys
//! - [`keyring`]: BID -> verifying key registry
//! - [`dht`]: put/get DHT abstraction plus the well-known key derivations
//! - [`records`]: signed presence, handle, and name records
//! - [`invite`]: `beenet:swarm/...` invite URIs

pub mod dht;
pub mod framing;
pub mod handshake;
pub mod invite;
pub mod keyring;
pub mod records;
pub mod session;
pub mod transport;

pub use dht::{Dht, DhtError, MemoryDht};
pub use handshake::{ClientHello, HandshakeConfig, HandshakeError, Initiator, Responder, ServerHello};
pub use keyring::KeyRegistry;
pub use session::{SessionCipher, SessionError, SessionKeys};
pub use transport::{Connection, Listener, Transport, TransportError, PROTOCOL_NAME};

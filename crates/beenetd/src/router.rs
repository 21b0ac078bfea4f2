//! Message router: dispatch by numeric kind
//!
//! Every inbound frame passes one gate before its handler runs: the
//! envelope must decode, the sender must match the session's
//! authenticated peer, the signature must verify, and the sequence must
//! clear the peer's replay window. Replay rejections are dropped and
//! logged, never surfaced to the peer.

use crate::peers::{PeerSender, PeerTable};
use beenet_content::fetch::{ChunkDataBody, FetchChunkBody};
use beenet_content::{ChunkStore, PendingFetches};
use beenet_core::canonical::{from_cbor, to_canonical_cbor};
use beenet_core::frame::{unix_millis, verify_record};
use beenet_core::{BaseFrame, Bid, Kind, SwarmId};
use beenet_gossip::engine::GossipError;
use beenet_gossip::Gossip;
use beenet_net::dht::{handle_key, name_key, presence_key, Dht};
use beenet_net::records::{HandleIndex, NameRecord, PresenceRecord};
use beenet_net::KeyRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Router errors
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error(transparent)]
    Gossip(#[from] GossipError),
    #[error("store error: {0}")]
    Store(#[from] beenet_content::store::StoreError),
    #[error("dht error: {0}")]
    Dht(String),
}

/// Body of DHT_GET: a well-known 32-byte key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DhtGetBody {
    pub key: [u8; 32],
}

/// Body of DHT_PUT, also used to answer DHT_GET.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DhtPutBody {
    pub key: [u8; 32],
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,
}

/// Naming operations carried by HONEYTAG_OP frames.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum HoneytagOpBody {
    /// Publish a signed handle index entry
    PublishHandle(HandleIndex),
    /// Ask for the handle index entry of a handle
    ResolveHandle { handle: String },
    /// Publish a signed swarm-scoped name record
    PublishName(NameRecord),
    /// Ask for the name record bound to a name
    ResolveName { name: String },
}

/// Dispatches verified envelopes to the subsystem handlers.
pub struct Router<D: Dht> {
    swarm: SwarmId,
    registry: Arc<KeyRegistry>,
    store: Arc<ChunkStore>,
    pending: Arc<PendingFetches>,
    dht: Arc<D>,
    gossip: Arc<Gossip<PeerSender>>,
    peers: Arc<PeerTable>,
    sender: Arc<PeerSender>,
}

impl<D: Dht> Router<D> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        swarm: SwarmId,
        registry: Arc<KeyRegistry>,
        store: Arc<ChunkStore>,
        pending: Arc<PendingFetches>,
        dht: Arc<D>,
        gossip: Arc<Gossip<PeerSender>>,
        peers: Arc<PeerTable>,
        sender: Arc<PeerSender>,
    ) -> Self {
        Self {
            swarm,
            registry,
            store,
            pending,
            dht,
            gossip,
            peers,
            sender,
        }
    }

    /// Validate and dispatch one decrypted frame from a session.
    pub async fn handle_frame(&self, session_peer: &Bid, bytes: &[u8]) -> Result<(), RouterError> {
        let frame = BaseFrame::decode(bytes).map_err(|e| RouterError::Decode(e.to_string()))?;

        if frame.from != *session_peer {
            return Err(RouterError::Auth(format!(
                "frame sender {} does not match session peer {session_peer}",
                frame.from
            )));
        }

        // The BID is the sender's public key; the registry seam still wins
        // when it knows the peer.
        let key = match self.registry.lookup(&frame.from) {
            Some(key) => key,
            None => frame
                .from
                .verifying_key()
                .map_err(|e| RouterError::Auth(e.to_string()))?,
        };
        frame
            .verify(&key)
            .map_err(|e| RouterError::Auth(e.to_string()))?;

        let Some(tracker) = self.peers.tracker(session_peer) else {
            return Err(RouterError::Auth(format!("no session for {session_peer}")));
        };
        if !tracker.validate_recv(frame.seq) {
            // Replay or out-of-window: drop locally, do not surface.
            debug!(from = %frame.from, seq = frame.seq, "replay window rejected frame");
            return Ok(());
        }

        match frame.message_kind() {
            Ok(Kind::Ping) => self.handle_ping(&frame).await,
            Ok(Kind::Pong) => {
                debug!(from = %frame.from, "pong");
                Ok(())
            }
            Ok(Kind::FetchChunk) => self.handle_fetch_chunk(&frame).await,
            Ok(Kind::ChunkData) => self.handle_chunk_data(&frame),
            Ok(Kind::DhtGet) => self.handle_dht_get(&frame).await,
            Ok(Kind::DhtPut) => self.handle_dht_put(&frame).await,
            Ok(Kind::AnnouncePresence) => self.handle_presence(&frame).await,
            Ok(Kind::HoneytagOp) => self.handle_honeytag_op(&frame).await,
            Ok(
                Kind::PubSub | Kind::IHave | Kind::IWant | Kind::Graft | Kind::Prune
                | Kind::Heartbeat,
            ) => {
                self.gossip.handle_frame(&frame).await?;
                Ok(())
            }
            Err(_) => {
                debug!(kind = frame.kind, from = %frame.from, "unknown kind dropped");
                Ok(())
            }
        }
    }

    async fn handle_ping(&self, frame: &BaseFrame) -> Result<(), RouterError> {
        self.sender
            .send_body(&frame.from, Kind::Pong, frame.body.clone())
            .await?;
        Ok(())
    }

    async fn handle_fetch_chunk(&self, frame: &BaseFrame) -> Result<(), RouterError> {
        let body: FetchChunkBody =
            from_cbor(&frame.body).map_err(|e| RouterError::Decode(e.to_string()))?;

        let Some(data) = self.store.get(&body.cid)? else {
            debug!(cid = %body.cid, from = %frame.from, "chunk not held");
            return Ok(());
        };

        let reply = ChunkDataBody {
            cid: body.cid,
            request_seq: frame.seq,
            data,
        };
        let bytes =
            to_canonical_cbor(&reply).map_err(|e| RouterError::Decode(e.to_string()))?;
        self.sender
            .send_body(&frame.from, Kind::ChunkData, bytes)
            .await?;
        Ok(())
    }

    fn handle_chunk_data(&self, frame: &BaseFrame) -> Result<(), RouterError> {
        let body: ChunkDataBody =
            from_cbor(&frame.body).map_err(|e| RouterError::Decode(e.to_string()))?;
        if !self.pending.resolve(body.request_seq, body.data) {
            debug!(
                request_seq = body.request_seq,
                from = %frame.from,
                "chunk data with no waiting fetch"
            );
        }
        Ok(())
    }

    async fn handle_dht_get(&self, frame: &BaseFrame) -> Result<(), RouterError> {
        let body: DhtGetBody =
            from_cbor(&frame.body).map_err(|e| RouterError::Decode(e.to_string()))?;
        let value = self
            .dht
            .get(body.key)
            .await
            .map_err(|e| RouterError::Dht(e.to_string()))?;

        if let Some(value) = value {
            let reply = DhtPutBody {
                key: body.key,
                value,
            };
            let bytes =
                to_canonical_cbor(&reply).map_err(|e| RouterError::Decode(e.to_string()))?;
            self.sender
                .send_body(&frame.from, Kind::DhtPut, bytes)
                .await?;
        }
        Ok(())
    }

    async fn handle_dht_put(&self, frame: &BaseFrame) -> Result<(), RouterError> {
        let body: DhtPutBody =
            from_cbor(&frame.body).map_err(|e| RouterError::Decode(e.to_string()))?;
        self.dht
            .put(body.key, body.value)
            .await
            .map_err(|e| RouterError::Dht(e.to_string()))
    }

    async fn handle_presence(&self, frame: &BaseFrame) -> Result<(), RouterError> {
        let record: PresenceRecord =
            from_cbor(&frame.body).map_err(|e| RouterError::Decode(e.to_string()))?;

        if record.swarm_id != self.swarm {
            return Err(RouterError::Auth("presence for a different swarm".into()));
        }
        record
            .validate(unix_millis())
            .map_err(|e| RouterError::Auth(e.to_string()))?;
        let key = record
            .bid
            .verifying_key()
            .map_err(|e| RouterError::Auth(e.to_string()))?;
        verify_record(&record, &key).map_err(|e| RouterError::Auth(e.to_string()))?;

        let bytes =
            to_canonical_cbor(&record).map_err(|e| RouterError::Decode(e.to_string()))?;
        self.dht
            .put(presence_key(&self.swarm, &record.bid), bytes)
            .await
            .map_err(|e| RouterError::Dht(e.to_string()))?;

        // Presence doubles as a key introduction.
        self.registry.register(record.bid, key);
        Ok(())
    }

    async fn handle_honeytag_op(&self, frame: &BaseFrame) -> Result<(), RouterError> {
        let op: HoneytagOpBody =
            from_cbor(&frame.body).map_err(|e| RouterError::Decode(e.to_string()))?;
        match op {
            HoneytagOpBody::PublishHandle(index) => {
                if index.is_expired(unix_millis()) {
                    return Ok(());
                }
                let key = index
                    .bid
                    .verifying_key()
                    .map_err(|e| RouterError::Auth(e.to_string()))?;
                verify_record(&index, &key).map_err(|e| RouterError::Auth(e.to_string()))?;

                let bytes =
                    to_canonical_cbor(&index).map_err(|e| RouterError::Decode(e.to_string()))?;
                self.dht
                    .put(handle_key(&self.swarm, &index.handle), bytes)
                    .await
                    .map_err(|e| RouterError::Dht(e.to_string()))
            }
            HoneytagOpBody::ResolveHandle { handle } => {
                let value = self
                    .dht
                    .get(handle_key(&self.swarm, &handle))
                    .await
                    .map_err(|e| RouterError::Dht(e.to_string()))?;
                if let Some(value) = value {
                    let index: HandleIndex =
                        from_cbor(&value).map_err(|e| RouterError::Decode(e.to_string()))?;
                    if index.is_expired(unix_millis()) {
                        return Ok(());
                    }
                    let reply = to_canonical_cbor(&HoneytagOpBody::PublishHandle(index))
                        .map_err(|e| RouterError::Decode(e.to_string()))?;
                    self.sender
                        .send_body(&frame.from, Kind::HoneytagOp, reply)
                        .await?;
                }
                Ok(())
            }
            HoneytagOpBody::PublishName(record) => {
                if record.swarm_id != self.swarm {
                    return Err(RouterError::Auth("name record for a different swarm".into()));
                }
                if record.is_expired(unix_millis()) {
                    return Ok(());
                }
                let key = record
                    .bid
                    .verifying_key()
                    .map_err(|e| RouterError::Auth(e.to_string()))?;
                verify_record(&record, &key).map_err(|e| RouterError::Auth(e.to_string()))?;

                let bytes =
                    to_canonical_cbor(&record).map_err(|e| RouterError::Decode(e.to_string()))?;
                self.dht
                    .put(name_key(&self.swarm, &record.name), bytes)
                    .await
                    .map_err(|e| RouterError::Dht(e.to_string()))
            }
            HoneytagOpBody::ResolveName { name } => {
                let value = self
                    .dht
                    .get(name_key(&self.swarm, &name))
                    .await
                    .map_err(|e| RouterError::Dht(e.to_string()))?;
                if let Some(value) = value {
                    let record: NameRecord =
                        from_cbor(&value).map_err(|e| RouterError::Decode(e.to_string()))?;
                    if record.is_expired(unix_millis()) {
                        return Ok(());
                    }
                    let reply = to_canonical_cbor(&HoneytagOpBody::PublishName(record))
                        .map_err(|e| RouterError::Decode(e.to_string()))?;
                    self.sender
                        .send_body(&frame.from, Kind::HoneytagOp, reply)
                        .await?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::PeerHandle;
    use beenet_core::{Identity, SequenceTracker};
    use beenet_gossip::engine::GossipConfig;
    use beenet_net::dht::MemoryDht;
    use beenet_net::records::build_presence;
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    struct Fixture {
        router: Router<MemoryDht>,
        local: Identity,
        peer: Identity,
        peer_rx: mpsc::Receiver<BaseFrame>,
        peer_seq: Arc<SequenceTracker>,
        store: Arc<ChunkStore>,
        pending: Arc<PendingFetches>,
        dht: Arc<MemoryDht>,
        swarm: SwarmId,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let local = Identity::generate();
        let peer = Identity::generate();
        let swarm = SwarmId::generate();

        let peers = Arc::new(PeerTable::new());
        let (tx, peer_rx) = mpsc::channel(32);
        peers.insert(
            peer.bid(),
            PeerHandle {
                outbound: tx,
                tracker: Arc::new(SequenceTracker::new()),
                addr: ([127, 0, 0, 1], 0).into(),
            },
        );

        let seq = Arc::new(SequenceTracker::new());
        let sender = Arc::new(PeerSender::new(local.clone(), seq.clone(), peers.clone()));
        let (gossip, _deliveries) = Gossip::new(
            local.clone(),
            swarm,
            GossipConfig::default(),
            sender.clone(),
            seq,
        );

        let registry = Arc::new(KeyRegistry::new());
        let store = Arc::new(ChunkStore::open(dir.path()).unwrap());
        let pending = Arc::new(PendingFetches::new());
        let dht = Arc::new(MemoryDht::new());

        let router = Router::new(
            swarm,
            registry,
            store.clone(),
            pending.clone(),
            dht.clone(),
            Arc::new(gossip),
            peers,
            sender,
        );

        Fixture {
            router,
            local,
            peer,
            peer_rx,
            peer_seq: Arc::new(SequenceTracker::new()),
            store,
            pending,
            dht,
            swarm,
            _dir: dir,
        }
    }

    fn frame_from(peer: &Identity, seq_src: &SequenceTracker, kind: Kind, body: Vec<u8>) -> Vec<u8> {
        BaseFrame::signed(kind, peer.bid(), seq_src.next_send(), body, peer.signing_key())
            .unwrap()
            .encode()
            .unwrap()
    }

    #[tokio::test]
    async fn test_ping_answered_with_pong() {
        let mut fx = fixture();
        let bytes = frame_from(&fx.peer, &fx.peer_seq, Kind::Ping, vec![1, 2]);

        fx.router.handle_frame(&fx.peer.bid(), &bytes).await.unwrap();

        let reply = fx.peer_rx.recv().await.unwrap();
        assert_eq!(reply.kind, Kind::Pong as u16);
        assert_eq!(reply.body, vec![1, 2]);
        assert_eq!(reply.from, fx.local.bid());
    }

    #[tokio::test]
    async fn test_sender_mismatch_rejected() {
        let fx = fixture();
        let impostor = Identity::generate();
        let bytes = frame_from(&impostor, &fx.peer_seq, Kind::Ping, vec![]);

        assert!(matches!(
            fx.router.handle_frame(&fx.peer.bid(), &bytes).await,
            Err(RouterError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_replayed_frame_dropped_silently() {
        let mut fx = fixture();
        let bytes = frame_from(&fx.peer, &fx.peer_seq, Kind::Ping, vec![]);

        fx.router.handle_frame(&fx.peer.bid(), &bytes).await.unwrap();
        assert!(fx.peer_rx.recv().await.is_some());

        // Same frame again: dropped without an error and without a reply.
        fx.router.handle_frame(&fx.peer.bid(), &bytes).await.unwrap();
        assert!(fx.peer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fetch_chunk_served_from_store() {
        let mut fx = fixture();
        let cid = fx.store.put_bytes(b"waggle data").unwrap();

        let body = to_canonical_cbor(&FetchChunkBody { cid }).unwrap();
        let bytes = frame_from(&fx.peer, &fx.peer_seq, Kind::FetchChunk, body);
        fx.router.handle_frame(&fx.peer.bid(), &bytes).await.unwrap();

        let reply = fx.peer_rx.recv().await.unwrap();
        assert_eq!(reply.kind, Kind::ChunkData as u16);
        let data: ChunkDataBody = from_cbor(&reply.body).unwrap();
        assert_eq!(data.data, b"waggle data");
        assert_eq!(data.cid, cid);
    }

    #[tokio::test]
    async fn test_chunk_data_resolves_pending_fetch() {
        let fx = fixture();
        let slot = fx.pending.register(41);

        let body = to_canonical_cbor(&ChunkDataBody {
            cid: beenet_content::Cid::of(b"payload"),
            request_seq: 41,
            data: b"payload".to_vec(),
        })
        .unwrap();
        let bytes = frame_from(&fx.peer, &fx.peer_seq, Kind::ChunkData, body);
        fx.router.handle_frame(&fx.peer.bid(), &bytes).await.unwrap();

        assert_eq!(slot.await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_dht_put_then_get() {
        let mut fx = fixture();
        let key = [9u8; 32];

        let put = to_canonical_cbor(&DhtPutBody {
            key,
            value: b"stored".to_vec(),
        })
        .unwrap();
        let bytes = frame_from(&fx.peer, &fx.peer_seq, Kind::DhtPut, put);
        fx.router.handle_frame(&fx.peer.bid(), &bytes).await.unwrap();
        assert_eq!(fx.dht.get(key).await.unwrap(), Some(b"stored".to_vec()));

        let get = to_canonical_cbor(&DhtGetBody { key }).unwrap();
        let bytes = frame_from(&fx.peer, &fx.peer_seq, Kind::DhtGet, get);
        fx.router.handle_frame(&fx.peer.bid(), &bytes).await.unwrap();

        let reply = fx.peer_rx.recv().await.unwrap();
        assert_eq!(reply.kind, Kind::DhtPut as u16);
        let body: DhtPutBody = from_cbor(&reply.body).unwrap();
        assert_eq!(body.value, b"stored");
    }

    #[tokio::test]
    async fn test_presence_stored_and_key_learned() {
        let fx = fixture();
        let record = build_presence(&fx.peer, fx.swarm, "forager", vec!["addr".into()], vec![])
            .unwrap();

        let body = to_canonical_cbor(&record).unwrap();
        let bytes = frame_from(&fx.peer, &fx.peer_seq, Kind::AnnouncePresence, body);
        fx.router.handle_frame(&fx.peer.bid(), &bytes).await.unwrap();

        let stored = fx
            .dht
            .get(presence_key(&fx.swarm, &fx.peer.bid()))
            .await
            .unwrap();
        assert!(stored.is_some());
        assert!(fx.router.registry.contains(&fx.peer.bid()));
    }

    #[tokio::test]
    async fn test_presence_wrong_swarm_rejected() {
        let fx = fixture();
        let record = build_presence(&fx.peer, SwarmId::generate(), "forager", vec![], vec![])
            .unwrap();

        let body = to_canonical_cbor(&record).unwrap();
        let bytes = frame_from(&fx.peer, &fx.peer_seq, Kind::AnnouncePresence, body);
        assert!(matches!(
            fx.router.handle_frame(&fx.peer.bid(), &bytes).await,
            Err(RouterError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_honeytag_publish_and_resolve() {
        let mut fx = fixture();
        let index = beenet_net::records::build_handle_index(&fx.peer, "scout").unwrap();
        let handle = index.handle.clone();

        let body = to_canonical_cbor(&HoneytagOpBody::PublishHandle(index)).unwrap();
        let bytes = frame_from(&fx.peer, &fx.peer_seq, Kind::HoneytagOp, body);
        fx.router.handle_frame(&fx.peer.bid(), &bytes).await.unwrap();

        let body = to_canonical_cbor(&HoneytagOpBody::ResolveHandle {
            handle: handle.clone(),
        })
        .unwrap();
        let bytes = frame_from(&fx.peer, &fx.peer_seq, Kind::HoneytagOp, body);
        fx.router.handle_frame(&fx.peer.bid(), &bytes).await.unwrap();

        let reply = fx.peer_rx.recv().await.unwrap();
        assert_eq!(reply.kind, Kind::HoneytagOp as u16);
        let op: HoneytagOpBody = from_cbor(&reply.body).unwrap();
        match op {
            HoneytagOpBody::PublishHandle(resolved) => {
                assert_eq!(resolved.handle, handle);
                assert_eq!(resolved.bid, fx.peer.bid());
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_name_publish_and_resolve() {
        let mut fx = fixture();
        let record =
            beenet_net::records::build_name_record(&fx.peer, fx.swarm, "royal-jelly").unwrap();

        let body = to_canonical_cbor(&HoneytagOpBody::PublishName(record)).unwrap();
        let bytes = frame_from(&fx.peer, &fx.peer_seq, Kind::HoneytagOp, body);
        fx.router.handle_frame(&fx.peer.bid(), &bytes).await.unwrap();

        let stored = fx
            .dht
            .get(name_key(&fx.swarm, "royal-jelly"))
            .await
            .unwrap();
        assert!(stored.is_some());

        let body = to_canonical_cbor(&HoneytagOpBody::ResolveName {
            name: "royal-jelly".into(),
        })
        .unwrap();
        let bytes = frame_from(&fx.peer, &fx.peer_seq, Kind::HoneytagOp, body);
        fx.router.handle_frame(&fx.peer.bid(), &bytes).await.unwrap();

        let reply = fx.peer_rx.recv().await.unwrap();
        assert_eq!(reply.kind, Kind::HoneytagOp as u16);
        let op: HoneytagOpBody = from_cbor(&reply.body).unwrap();
        match op {
            HoneytagOpBody::PublishName(resolved) => {
                assert_eq!(resolved.name, "royal-jelly");
                assert_eq!(resolved.bid, fx.peer.bid());
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_name_record_wrong_swarm_rejected() {
        let fx = fixture();
        let record =
            beenet_net::records::build_name_record(&fx.peer, SwarmId::generate(), "stray")
                .unwrap();

        let body = to_canonical_cbor(&HoneytagOpBody::PublishName(record)).unwrap();
        let bytes = frame_from(&fx.peer, &fx.peer_seq, Kind::HoneytagOp, body);
        assert!(matches!(
            fx.router.handle_frame(&fx.peer.bid(), &bytes).await,
            Err(RouterError::Auth(_))
        ));
        assert!(fx
            .dht
            .get(name_key(&fx.swarm, "stray"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unknown_kind_dropped() {
        let fx = fixture();
        let frame = BaseFrame::signed(
            Kind::Ping,
            fx.peer.bid(),
            fx.peer_seq.next_send(),
            vec![],
            fx.peer.signing_key(),
        )
        .unwrap();
        let mut frame = frame;
        frame.kind = 65; // SWIM family, not dispatched
        beenet_core::frame::sign_record(&mut frame, fx.peer.signing_key()).unwrap();

        fx.router
            .handle_frame(&fx.peer.bid(), &frame.encode().unwrap())
            .await
            .unwrap();
    }
}

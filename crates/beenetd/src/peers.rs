//! Connected peer table and the outbound frame path
//!
//! Each established session registers a [`PeerHandle`]: the channel its
//! writer task drains, the replay tracker for inbound frames, and the
//! remote address. [`PeerSender`] is the one outbound seam the gossip
//! engine and the content fetcher both send through.

use beenet_content::fetch::FetchChunkBody;
use beenet_content::{Cid, ContentError, ErrorCode};
use beenet_core::canonical::to_canonical_cbor;
use beenet_core::{BaseFrame, Bid, Identity, Kind, SequenceTracker};
use beenet_gossip::engine::{FrameSender, GossipError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// State for one established session.
pub struct PeerHandle {
    /// Frames queued for the session writer
    pub outbound: mpsc::Sender<BaseFrame>,
    /// Replay tracker for frames arriving from this peer
    pub tracker: Arc<SequenceTracker>,
    /// Remote address
    pub addr: SocketAddr,
}

/// Registry of connected peers.
#[derive(Default)]
pub struct PeerTable {
    peers: RwLock<HashMap<Bid, PeerHandle>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer's session.
    pub fn insert(&self, bid: Bid, handle: PeerHandle) {
        self.peers.write().insert(bid, handle);
    }

    /// Drop a peer's session state.
    pub fn remove(&self, bid: &Bid) {
        self.peers.write().remove(bid);
    }

    /// The peer's outbound channel, if connected.
    pub fn outbound(&self, bid: &Bid) -> Option<mpsc::Sender<BaseFrame>> {
        self.peers.read().get(bid).map(|h| h.outbound.clone())
    }

    /// The peer's inbound replay tracker, if connected.
    pub fn tracker(&self, bid: &Bid) -> Option<Arc<SequenceTracker>> {
        self.peers.read().get(bid).map(|h| Arc::clone(&h.tracker))
    }

    /// BIDs of all connected peers.
    pub fn list(&self) -> Vec<Bid> {
        self.peers.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    pub fn is_connected(&self, bid: &Bid) -> bool {
        self.peers.read().contains_key(bid)
    }
}

/// Outbound frame sender shared by the gossip engine, the content
/// fetcher, and the router.
pub struct PeerSender {
    identity: Identity,
    /// Node-global send sequence
    seq: Arc<SequenceTracker>,
    peers: Arc<PeerTable>,
}

impl PeerSender {
    pub fn new(identity: Identity, seq: Arc<SequenceTracker>, peers: Arc<PeerTable>) -> Self {
        Self {
            identity,
            seq,
            peers,
        }
    }

    /// Build, sign, and queue a frame toward a peer.
    pub async fn send_body(
        &self,
        to: &Bid,
        kind: Kind,
        body: Vec<u8>,
    ) -> Result<(), GossipError> {
        let frame = BaseFrame::signed(
            kind,
            self.identity.bid(),
            self.seq.next_send(),
            body,
            self.identity.signing_key(),
        )?;
        self.send(to, frame).await
    }
}

impl FrameSender for PeerSender {
    async fn send(&self, to: &Bid, frame: BaseFrame) -> Result<(), GossipError> {
        let outbound = self
            .peers
            .outbound(to)
            .ok_or_else(|| GossipError::Send(format!("peer {to} not connected")))?;
        outbound
            .send(frame)
            .await
            .map_err(|_| GossipError::Send(format!("session to {to} closed")))
    }

    async fn broadcast(&self, frame: BaseFrame) -> Result<(), GossipError> {
        for bid in self.peers.list() {
            if let Err(error) = self.send(&bid, frame.clone()).await {
                warn!(peer = %bid, %error, "broadcast send failed");
            }
        }
        Ok(())
    }
}

impl beenet_content::ChunkSender for PeerSender {
    fn next_seq(&self, _provider: &Bid) -> u64 {
        self.seq.next_send()
    }

    async fn send_fetch(&self, provider: &Bid, cid: &Cid, seq: u64) -> Result<(), ContentError> {
        let body = to_canonical_cbor(&FetchChunkBody { cid: *cid }).map_err(|e| {
            ContentError::new(ErrorCode::InvalidRequest, "fetch body encoding failed")
                .with_source(e)
        })?;
        let frame = BaseFrame::signed(
            Kind::FetchChunk,
            self.identity.bid(),
            seq,
            body,
            self.identity.signing_key(),
        )
        .map_err(|e| {
            ContentError::new(ErrorCode::InvalidRequest, "fetch frame signing failed")
                .with_source(e)
        })?;

        let outbound = self.peers.outbound(provider).ok_or_else(|| {
            ContentError::new(
                ErrorCode::NetworkFailure,
                format!("provider {provider} not connected"),
            )
            .with_provider(*provider)
        })?;
        outbound.send(frame).await.map_err(|_| {
            ContentError::new(ErrorCode::NetworkFailure, "session closed")
                .with_provider(*provider)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beenet_content::ChunkSender;

    fn handle(tx: mpsc::Sender<BaseFrame>) -> PeerHandle {
        PeerHandle {
            outbound: tx,
            tracker: Arc::new(SequenceTracker::new()),
            addr: ([127, 0, 0, 1], 0).into(),
        }
    }

    #[tokio::test]
    async fn test_send_routes_to_peer() {
        let peers = Arc::new(PeerTable::new());
        let (tx, mut rx) = mpsc::channel(8);
        let peer = Bid([1u8; 32]);
        peers.insert(peer, handle(tx));

        let sender = PeerSender::new(
            Identity::generate(),
            Arc::new(SequenceTracker::new()),
            peers,
        );
        sender.send_body(&peer, Kind::Ping, vec![]).await.unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.kind, Kind::Ping as u16);
        assert_eq!(frame.seq, 1);
    }

    #[tokio::test]
    async fn test_send_to_unknown_peer_fails() {
        let sender = PeerSender::new(
            Identity::generate(),
            Arc::new(SequenceTracker::new()),
            Arc::new(PeerTable::new()),
        );
        assert!(sender
            .send_body(&Bid([9u8; 32]), Kind::Ping, vec![])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_fetch_uses_reserved_seq() {
        let peers = Arc::new(PeerTable::new());
        let (tx, mut rx) = mpsc::channel(8);
        let provider = Bid([2u8; 32]);
        peers.insert(provider, handle(tx));

        let sender = PeerSender::new(
            Identity::generate(),
            Arc::new(SequenceTracker::new()),
            peers,
        );
        let seq = sender.next_seq(&provider);
        sender
            .send_fetch(&provider, &Cid::of(b"chunk"), seq)
            .await
            .unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.seq, seq);
        assert_eq!(frame.kind, Kind::FetchChunk as u16);
    }

    #[test]
    fn test_table_bookkeeping() {
        let peers = PeerTable::new();
        let (tx, _rx) = mpsc::channel(1);
        let bid = Bid([3u8; 32]);

        peers.insert(bid, handle(tx));
        assert!(peers.is_connected(&bid));
        assert_eq!(peers.list(), vec![bid]);

        peers.remove(&bid);
        assert!(peers.is_empty());
        assert!(peers.tracker(&bid).is_none());
    }
}

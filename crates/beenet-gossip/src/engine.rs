//! Gossip engine: publish, forward, and mesh maintenance
//!
//! Application messages travel as a signed [`PubSubEnvelope`] wrapped in a
//! signed PUBSUB BaseFrame. Forwarding is eager push to at most
//! `forward_fanout` random mesh peers; the seen cache suppresses
//! duplicates and self-echo. Mesh membership moves through GRAFT/PRUNE,
//! advertisements through IHAVE/IWANT, and a heartbeat beacons liveness to
//! every mesh peer once per interval.

use crate::mesh::TopicMesh;
use crate::seen::SeenCache;
use crate::topic::topic_id;
use beenet_core::canonical::{from_cbor, to_canonical_cbor};
use beenet_core::frame::{sign_record, unix_millis, verify_record, Signable};
use beenet_core::{BaseFrame, Bid, Identity, Kind, SequenceTracker, SwarmId};
use data_encoding::BASE32_NOPAD;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

/// Gossip errors
#[derive(Debug, Error)]
pub enum GossipError {
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("not subscribed to topic {0}")]
    NotSubscribed(String),
}

impl From<beenet_core::Error> for GossipError {
    fn from(e: beenet_core::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

/// Gossip tunables.
#[derive(Clone, Debug)]
pub struct GossipConfig {
    /// Lower bound on mesh degree before grafting
    pub mesh_min: usize,
    /// Upper bound on mesh degree before pruning
    pub mesh_max: usize,
    /// Forwarding fanout per received message
    pub forward_fanout: usize,
    /// Heartbeat beacon period
    pub heartbeat_interval: Duration,
    /// Seen-cache entry lifetime
    pub seen_ttl: Duration,
    /// Seen-cache sweep period
    pub sweep_interval: Duration,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            mesh_min: 6,
            mesh_max: 12,
            forward_fanout: 3,
            heartbeat_interval: Duration::from_secs(1),
            seen_ttl: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Sends signed frames into per-peer sessions.
pub trait FrameSender: Send + Sync + 'static {
    /// Send a frame to one peer.
    fn send(
        &self,
        to: &Bid,
        frame: BaseFrame,
    ) -> impl Future<Output = Result<(), GossipError>> + Send;

    /// Best-effort broadcast to every connected peer.
    fn broadcast(&self, frame: BaseFrame) -> impl Future<Output = Result<(), GossipError>> + Send;
}

/// Signed application message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PubSubEnvelope {
    /// Content-derived message id over `payload || from || seq`
    pub mid: String,
    pub from: Bid,
    pub seq: u64,
    pub ts_ms: u64,
    /// Wire topic id
    pub topic: String,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub sig: Vec<u8>,
}

impl Signable for PubSubEnvelope {
    fn signature_mut(&mut self) -> &mut Vec<u8> {
        &mut self.sig
    }

    fn signature(&self) -> &[u8] {
        &self.sig
    }
}

/// Message id: `base32(BLAKE3(payload || from || seq))`.
pub fn message_id(payload: &[u8], from: &Bid, seq: u64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(payload);
    hasher.update(from.as_bytes());
    hasher.update(&seq.to_be_bytes());
    BASE32_NOPAD
        .encode(hasher.finalize().as_bytes())
        .to_ascii_lowercase()
}

/// IHAVE control body: advertised message ids for a topic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IHaveBody {
    pub topic: String,
    pub mids: Vec<String>,
}

/// IWANT control body: requested message ids.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IWantBody {
    pub mids: Vec<String>,
}

/// GRAFT control body: join the sender's mesh for a topic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraftBody {
    pub topic: String,
}

/// PRUNE control body: leave, optionally hinting alternate peers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PruneBody {
    pub topic: String,
    pub peers: Vec<Bid>,
}

/// HEARTBEAT control body: topics the sender keeps meshes for.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeartbeatBody {
    pub topics: Vec<String>,
}

/// A message handed up to the application.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub topic: String,
    pub from: Bid,
    pub payload: Vec<u8>,
}

/// The gossip engine for one bee in one swarm.
pub struct Gossip<S: FrameSender> {
    identity: Identity,
    swarm: SwarmId,
    config: GossipConfig,
    sender: Arc<S>,
    /// Meshes keyed by wire topic id
    meshes: RwLock<HashMap<String, TopicMesh>>,
    seen: SeenCache,
    /// Recently forwarded frames by mid, with their topic, served to
    /// IWANT requests and advertised via IHAVE
    mcache: RwLock<HashMap<String, (String, BaseFrame)>>,
    /// Node-global send counter, shared with every other frame producer
    seq: Arc<SequenceTracker>,
    delivery: mpsc::Sender<Delivery>,
}

impl<S: FrameSender> Gossip<S> {
    /// Create an engine and the channel deliveries arrive on.
    ///
    /// `seq` is the node's outgoing sequence tracker; sharing it keeps the
    /// per-sender sequence strictly increasing across all frame kinds.
    pub fn new(
        identity: Identity,
        swarm: SwarmId,
        config: GossipConfig,
        sender: Arc<S>,
        seq: Arc<SequenceTracker>,
    ) -> (Self, mpsc::Receiver<Delivery>) {
        let (delivery, deliveries) = mpsc::channel(256);
        let seen = SeenCache::new(config.seen_ttl);
        (
            Self {
                identity,
                swarm,
                config,
                sender,
                meshes: RwLock::new(HashMap::new()),
                seen,
                mcache: RwLock::new(HashMap::new()),
                seq,
                delivery,
            },
            deliveries,
        )
    }

    /// Subscribe to a topic; idempotent. Returns the wire topic id.
    pub fn subscribe(&self, topic_name: &str) -> String {
        let id = topic_id(&self.swarm, topic_name);
        self.meshes.write().entry(id.clone()).or_default();
        id
    }

    /// Unsubscribe: PRUNE every mesh peer, then drop the mesh. Idempotent.
    pub async fn unsubscribe(&self, topic_name: &str) -> Result<(), GossipError> {
        let id = topic_id(&self.swarm, topic_name);
        let Some(mesh) = self.meshes.write().remove(&id) else {
            return Ok(());
        };
        for peer in &mesh.peers {
            let frame = self.control_frame(
                Kind::Prune,
                &PruneBody {
                    topic: id.clone(),
                    peers: Vec::new(),
                },
            )?;
            if let Err(error) = self.sender.send(peer, frame).await {
                warn!(%peer, %error, "prune send failed");
            }
        }
        Ok(())
    }

    /// Whether the local node keeps a mesh for a topic id.
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.meshes.read().contains_key(topic)
    }

    /// Wire ids of all subscribed topics.
    pub fn topics(&self) -> Vec<String> {
        self.meshes.read().keys().cloned().collect()
    }

    /// Mesh degree for a topic id.
    pub fn mesh_size(&self, topic: &str) -> usize {
        self.meshes.read().get(topic).map(|m| m.len()).unwrap_or(0)
    }

    /// Directly add a mesh peer (used on GRAFT and by the daemon when a
    /// session opens).
    pub fn add_mesh_peer(&self, topic: &str, peer: Bid) -> bool {
        match self.meshes.write().get_mut(topic) {
            Some(mesh) => mesh.add_peer(peer),
            None => false,
        }
    }

    /// Publish a payload to a topic; returns the message id.
    pub async fn publish(
        &self,
        topic_name: &str,
        payload: Vec<u8>,
    ) -> Result<String, GossipError> {
        let topic = topic_id(&self.swarm, topic_name);
        if !self.is_subscribed(&topic) {
            return Err(GossipError::NotSubscribed(topic_name.to_string()));
        }

        let seq = self.seq.next_send();
        let from = self.identity.bid();
        let mid = message_id(&payload, &from, seq);

        let mut envelope = PubSubEnvelope {
            mid: mid.clone(),
            from,
            seq,
            ts_ms: unix_millis(),
            topic: topic.clone(),
            payload,
            sig: Vec::new(),
        };
        sign_record(&mut envelope, self.identity.signing_key())?;

        let body = to_canonical_cbor(&envelope)?;
        let frame = BaseFrame::signed(
            Kind::PubSub,
            from,
            self.seq.next_send(),
            body,
            self.identity.signing_key(),
        )?;

        // Guard against our own message echoing back.
        self.seen.insert(&mid);
        self.mcache
            .write()
            .insert(mid.clone(), (topic.clone(), frame.clone()));

        let peers = {
            let meshes = self.meshes.read();
            meshes
                .get(&topic)
                .map(|m| m.peers.iter().copied().collect::<Vec<_>>())
                .unwrap_or_default()
        };

        if peers.is_empty() {
            debug!(%topic, %mid, "no mesh peers, broadcasting");
            self.sender.broadcast(frame).await?;
        } else {
            for peer in peers {
                if let Err(error) = self.sender.send(&peer, frame.clone()).await {
                    warn!(%peer, %error, "publish send failed");
                }
            }
        }
        Ok(mid)
    }

    /// Dispatch an inbound gossip frame by kind.
    ///
    /// The caller has already verified the outer frame signature and
    /// replay window.
    pub async fn handle_frame(&self, frame: &BaseFrame) -> Result<(), GossipError> {
        match frame.message_kind() {
            Ok(Kind::PubSub) => self.handle_pubsub(frame).await,
            Ok(Kind::IHave) => self.handle_ihave(frame).await,
            Ok(Kind::IWant) => self.handle_iwant(frame).await,
            Ok(Kind::Graft) => self.handle_graft(frame).await,
            Ok(Kind::Prune) => self.handle_prune(frame),
            Ok(Kind::Heartbeat) => self.handle_heartbeat(frame),
            _ => Ok(()),
        }
    }

    async fn handle_pubsub(&self, frame: &BaseFrame) -> Result<(), GossipError> {
        let envelope: PubSubEnvelope = from_cbor(&frame.body)?;

        if self.seen.contains(&envelope.mid) {
            debug!(mid = %envelope.mid, "duplicate dropped");
            return Ok(());
        }
        self.seen.insert(&envelope.mid);

        // The envelope is self-authenticating: the origin BID is the key.
        let origin_key = envelope
            .from
            .verifying_key()
            .map_err(|e| GossipError::Encoding(e.to_string()))?;
        if verify_record(&envelope, &origin_key).is_err() {
            warn!(mid = %envelope.mid, from = %envelope.from, "envelope signature invalid");
            return Ok(());
        }

        if !self.is_subscribed(&envelope.topic) {
            return Ok(());
        }

        self.mcache
            .write()
            .insert(envelope.mid.clone(), (envelope.topic.clone(), frame.clone()));

        if self
            .delivery
            .send(Delivery {
                topic: envelope.topic.clone(),
                from: envelope.from,
                payload: envelope.payload.clone(),
            })
            .await
            .is_err()
        {
            warn!("delivery channel closed");
        }

        // Eager push: forward verbatim to a few mesh peers, never back to
        // the peer that sent it to us.
        let targets = {
            let meshes = self.meshes.read();
            meshes
                .get(&envelope.topic)
                .map(|m| m.select_peers(Some(&frame.from), self.config.forward_fanout))
                .unwrap_or_default()
        };
        for peer in targets {
            if let Err(error) = self.sender.send(&peer, frame.clone()).await {
                warn!(%peer, %error, "forward failed");
            }
        }
        Ok(())
    }

    async fn handle_ihave(&self, frame: &BaseFrame) -> Result<(), GossipError> {
        let body: IHaveBody = from_cbor(&frame.body)?;
        if !self.is_subscribed(&body.topic) {
            return Ok(());
        }
        let wanted: Vec<String> = body
            .mids
            .into_iter()
            .filter(|mid| !self.seen.contains(mid))
            .collect();
        if wanted.is_empty() {
            return Ok(());
        }
        let reply = self.control_frame(Kind::IWant, &IWantBody { mids: wanted })?;
        self.sender.send(&frame.from, reply).await
    }

    async fn handle_iwant(&self, frame: &BaseFrame) -> Result<(), GossipError> {
        let body: IWantBody = from_cbor(&frame.body)?;
        let cached: Vec<BaseFrame> = {
            let mcache = self.mcache.read();
            body.mids
                .iter()
                .filter_map(|mid| mcache.get(mid).map(|(_, frame)| frame.clone()))
                .collect()
        };
        for cached_frame in cached {
            if let Err(error) = self.sender.send(&frame.from, cached_frame).await {
                warn!(peer = %frame.from, %error, "iwant reply failed");
            }
        }
        Ok(())
    }

    async fn handle_graft(&self, frame: &BaseFrame) -> Result<(), GossipError> {
        let body: GraftBody = from_cbor(&frame.body)?;
        let accepted = {
            let mut meshes = self.meshes.write();
            match meshes.get_mut(&body.topic) {
                Some(mesh) if mesh.len() < self.config.mesh_max => {
                    mesh.add_peer(frame.from);
                    true
                }
                _ => false,
            }
        };
        if !accepted {
            // Unsubscribed or full: refuse with a PRUNE.
            let reply = self.control_frame(
                Kind::Prune,
                &PruneBody {
                    topic: body.topic,
                    peers: Vec::new(),
                },
            )?;
            self.sender.send(&frame.from, reply).await?;
        }
        Ok(())
    }

    fn handle_prune(&self, frame: &BaseFrame) -> Result<(), GossipError> {
        let body: PruneBody = from_cbor(&frame.body)?;
        let mut meshes = self.meshes.write();
        if let Some(mesh) = meshes.get_mut(&body.topic) {
            mesh.remove_peer(&frame.from);
            for hint in body.peers {
                mesh.add_fanout(hint);
            }
        }
        Ok(())
    }

    fn handle_heartbeat(&self, frame: &BaseFrame) -> Result<(), GossipError> {
        let body: HeartbeatBody = from_cbor(&frame.body)?;
        let mut meshes = self.meshes.write();
        for topic in body.topics {
            if let Some(mesh) = meshes.get_mut(&topic) {
                // A heartbeating peer is a live graft candidate.
                mesh.add_fanout(frame.from);
            }
        }
        Ok(())
    }

    /// Send a HEARTBEAT to every mesh peer across all subscribed topics
    /// and rebalance mesh degree toward `[mesh_min, mesh_max]`.
    pub async fn heartbeat(&self) -> Result<(), GossipError> {
        let (topics, peers) = {
            let meshes = self.meshes.read();
            let topics: Vec<String> = meshes.keys().cloned().collect();
            let mut peers: Vec<Bid> = meshes.values().flat_map(|m| m.peers.iter().copied()).collect();
            peers.sort();
            peers.dedup();
            (topics, peers)
        };
        if topics.is_empty() {
            return Ok(());
        }

        let frame = self.control_frame(Kind::Heartbeat, &HeartbeatBody { topics })?;
        for peer in peers {
            if let Err(error) = self.sender.send(&peer, frame.clone()).await {
                warn!(%peer, %error, "heartbeat send failed");
            }
        }

        self.advertise().await?;
        self.rebalance().await
    }

    /// Lazily advertise cached message ids to fanout peers via IHAVE.
    async fn advertise(&self) -> Result<(), GossipError> {
        let mut by_topic: HashMap<String, Vec<String>> = HashMap::new();
        for (mid, (topic, _)) in self.mcache.read().iter() {
            by_topic.entry(topic.clone()).or_default().push(mid.clone());
        }

        for (topic, mids) in by_topic {
            let targets = {
                let meshes = self.meshes.read();
                meshes
                    .get(&topic)
                    .map(|m| m.fanout_candidates(self.config.forward_fanout))
                    .unwrap_or_default()
            };
            if targets.is_empty() {
                continue;
            }
            let frame = self.control_frame(
                Kind::IHave,
                &IHaveBody {
                    topic: topic.clone(),
                    mids,
                },
            )?;
            for peer in targets {
                if let Err(error) = self.sender.send(&peer, frame.clone()).await {
                    warn!(%peer, %error, "ihave send failed");
                }
            }
        }
        Ok(())
    }

    /// Graft toward `mesh_min`, prune down to `mesh_max`.
    async fn rebalance(&self) -> Result<(), GossipError> {
        let mut grafts: Vec<(String, Bid)> = Vec::new();
        let mut prunes: Vec<(String, Bid)> = Vec::new();
        {
            let mut meshes = self.meshes.write();
            for (topic, mesh) in meshes.iter_mut() {
                if mesh.len() < self.config.mesh_min {
                    let deficit = self.config.mesh_min - mesh.len();
                    for peer in mesh.fanout_candidates(deficit) {
                        mesh.add_peer(peer);
                        grafts.push((topic.clone(), peer));
                    }
                } else if mesh.len() > self.config.mesh_max {
                    let excess = mesh.len() - self.config.mesh_max;
                    for peer in mesh.select_peers(None, excess) {
                        mesh.remove_peer(&peer);
                        prunes.push((topic.clone(), peer));
                    }
                }
            }
        }

        for (topic, peer) in grafts {
            let frame = self.control_frame(Kind::Graft, &GraftBody { topic })?;
            if let Err(error) = self.sender.send(&peer, frame).await {
                warn!(%peer, %error, "graft send failed");
            }
        }
        for (topic, peer) in prunes {
            let frame = self.control_frame(
                Kind::Prune,
                &PruneBody {
                    topic,
                    peers: Vec::new(),
                },
            )?;
            if let Err(error) = self.sender.send(&peer, frame).await {
                warn!(%peer, %error, "prune send failed");
            }
        }
        Ok(())
    }

    /// Evict expired seen-cache entries and their cached frames.
    pub fn sweep(&self) -> usize {
        let evicted = self.seen.sweep();
        self.mcache.write().retain(|mid, _| self.seen.contains(mid));
        evicted
    }

    fn control_frame<T: Serialize>(&self, kind: Kind, body: &T) -> Result<BaseFrame, GossipError> {
        let bytes = to_canonical_cbor(body)?;
        Ok(BaseFrame::signed(
            kind,
            self.identity.bid(),
            self.seq.next_send(),
            bytes,
            self.identity.signing_key(),
        )?)
    }

    /// Launch the heartbeat and seen-cache sweeper tasks; both stop on the
    /// shutdown signal.
    pub fn spawn_tasks(
        self: Arc<Self>,
        shutdown: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        let heartbeat = {
            let gossip = Arc::clone(&self);
            let mut shutdown_rx = shutdown.subscribe();
            tokio::spawn(async move {
                let mut ticker = interval(gossip.config.heartbeat_interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(error) = gossip.heartbeat().await {
                                warn!(%error, "heartbeat failed");
                            }
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
            })
        };

        let sweeper = {
            let gossip = self;
            let mut shutdown_rx = shutdown.subscribe();
            tokio::spawn(async move {
                let mut ticker = interval(gossip.config.sweep_interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let evicted = gossip.sweep();
                            if evicted > 0 {
                                debug!(evicted, "seen cache swept");
                            }
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
            })
        };

        vec![heartbeat, sweeper]
    }
}

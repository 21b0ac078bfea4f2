//! beenetd server - session management and background tasks
//!
//! The server owns the daemon's identity and swarm membership, accepts
//! inbound sessions, dials bootstrap peers, and runs the long-lived tasks:
//! gossip heartbeat, seen-cache sweeper, and presence refresh. A single
//! shutdown signal fans out to every task.

use crate::config::Config;
use crate::peers::{PeerHandle, PeerSender, PeerTable};
use crate::router::Router;
use anyhow::Context;
use beenet_content::{ChunkStore, FetchConfig, Fetcher, PendingFetches};
use beenet_core::canonical::{from_cbor, to_canonical_cbor};
use beenet_core::{Bid, Identity, SequenceTracker, SwarmId};
use beenet_gossip::engine::{GossipConfig, GraftBody};
use beenet_gossip::Gossip;
use beenet_net::dht::MemoryDht;
use beenet_net::Dht;
use beenet_net::invite::parse_invite;
use beenet_net::handshake::{ClientHello, HandshakeConfig, Initiator, PskConfig, Responder, ServerHello};
use beenet_net::records::{build_handle_index, build_name_record, build_presence, PRESENCE_TTL_MS};
use beenet_net::transport::{Connection, Listener, TcpTransport, Transport};
use beenet_net::{KeyRegistry, SessionCipher, SessionKeys, PROTOCOL_NAME};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Server state for one bee.
pub struct Server {
    config: Config,
    identity: Identity,
    swarm: SwarmId,
    psk: Option<PskConfig>,
    registry: Arc<KeyRegistry>,
    store: Arc<ChunkStore>,
    dht: Arc<MemoryDht>,
    peers: Arc<PeerTable>,
    sender: Arc<PeerSender>,
    gossip: Arc<Gossip<PeerSender>>,
    pending: Arc<PendingFetches>,
    fetcher: Fetcher<PeerSender>,
    router: Arc<Router<MemoryDht>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Create a server instance from configuration.
    pub fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let identity = Identity::generate();

        let (swarm, invite_psk) = match &config.invite {
            Some(uri) => {
                let invite = parse_invite(uri).context("invalid invite uri")?;
                (invite.swarm_id, invite.psk)
            }
            None => (SwarmId::generate(), None),
        };

        let psk = config
            .psk
            .as_ref()
            .map(|s| s.as_bytes().to_vec())
            .or(invite_psk)
            .map(|secret| PskConfig {
                hint: "swarm-psk".into(),
                secret,
            });

        let registry = Arc::new(KeyRegistry::new());
        registry.register_identity(&identity);

        let store = Arc::new(ChunkStore::open(&config.data_dir).context("open chunk store")?);
        let dht = Arc::new(MemoryDht::new());
        let peers = Arc::new(PeerTable::new());
        let seq = Arc::new(SequenceTracker::new());
        let sender = Arc::new(PeerSender::new(identity.clone(), seq.clone(), peers.clone()));

        let gossip_config = GossipConfig {
            heartbeat_interval: Duration::from_millis(config.heartbeat_interval_ms),
            ..GossipConfig::default()
        };
        let (gossip, deliveries) = Gossip::new(
            identity.clone(),
            swarm,
            gossip_config,
            sender.clone(),
            seq.clone(),
        );
        let gossip = Arc::new(gossip);
        // Deliveries feed the agent boundary; the daemon logs them.
        tokio::spawn(log_deliveries(deliveries));

        let pending = Arc::new(PendingFetches::new());
        let fetch_config = FetchConfig {
            concurrent_fetches: config.concurrent_fetches,
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            verify_integrity: true,
        };
        let fetcher = Fetcher::new(sender.clone(), pending.clone(), fetch_config);

        let router = Arc::new(Router::new(
            swarm,
            registry.clone(),
            store.clone(),
            pending.clone(),
            dht.clone(),
            gossip.clone(),
            peers.clone(),
            sender.clone(),
        ));

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Arc::new(Self {
            config,
            identity,
            swarm,
            psk,
            registry,
            store,
            dht,
            peers,
            sender,
            gossip,
            pending,
            fetcher,
            router,
            shutdown_tx,
        }))
    }

    /// Our BID.
    pub fn bid(&self) -> Bid {
        self.identity.bid()
    }

    /// Our swarm.
    pub fn swarm(&self) -> SwarmId {
        self.swarm
    }

    /// Our swarm-scoped handle.
    pub fn handle(&self) -> anyhow::Result<String> {
        Ok(self.identity.handle(&self.config.nickname)?)
    }

    /// The content fetcher.
    pub fn fetcher(&self) -> &Fetcher<PeerSender> {
        &self.fetcher
    }

    /// The gossip engine.
    pub fn gossip(&self) -> &Arc<Gossip<PeerSender>> {
        &self.gossip
    }

    /// Signal every task to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    fn handshake_config(&self) -> HandshakeConfig {
        let mut config = HandshakeConfig::new(self.swarm);
        config.caps = vec!["gossip".into(), "content".into()];
        config.psk = self.psk.clone();
        config
    }

    /// Run the accept loop until shutdown.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!(
            bid = %self.bid(),
            handle = %self.handle()?,
            swarm = %self.swarm,
            "starting beenetd"
        );

        for topic in &self.config.topics {
            let id = self.gossip.subscribe(topic);
            debug!(topic, id, "subscribed");
        }

        let mut background = Arc::clone(&self.gossip).spawn_tasks(&self.shutdown_tx);
        background.push(Arc::clone(&self).spawn_presence_task());

        let transport = TcpTransport;
        let mut listener = transport
            .listen(self.config.listen)
            .await
            .context("bind listener")?;
        info!(addr = %listener.local_addr()?, protocol = PROTOCOL_NAME, "listening");

        for addr in self.config.bootstrap.clone() {
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(error) = server.connect(addr).await {
                    warn!(%addr, %error, "bootstrap dial failed");
                }
            });
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok(conn) => {
                            let server = Arc::clone(&self);
                            tokio::spawn(async move {
                                let addr = conn.remote_addr();
                                if let Err(error) = server.handle_inbound(conn).await {
                                    warn!(%addr, %error, "inbound session failed");
                                }
                            });
                        }
                        Err(error) => error!(%error, "accept failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutting down");
                    break;
                }
            }
        }

        for task in background {
            task.abort();
        }
        self.store.flush().context("flush chunk store")?;
        Ok(())
    }

    /// Dial a peer and run the initiator handshake.
    pub async fn connect(self: Arc<Self>, addr: SocketAddr) -> anyhow::Result<()> {
        let mut conn = TcpTransport.dial(addr).await.context("dial")?;

        let mut initiator = Initiator::new(self.identity.clone(), self.handshake_config());
        let hello = initiator.create_client_hello()?;
        conn.send(to_canonical_cbor(&hello)?).await?;

        let bytes = conn
            .recv()
            .await?
            .context("connection closed during handshake")?;
        let reply: ServerHello = from_cbor(&bytes)?;
        self.learn_key(&reply.from);
        initiator.process_server_hello(&reply, &self.registry)?;

        let peer = initiator.peer().context("handshake incomplete")?;
        let keys = initiator
            .session_keys()
            .cloned()
            .context("handshake produced no keys")?;
        info!(%peer, %addr, "session established (initiator)");
        self.start_session(conn, peer, keys);
        Ok(())
    }

    /// Run the responder handshake on an accepted connection.
    async fn handle_inbound<C: Connection>(self: Arc<Self>, mut conn: C) -> anyhow::Result<()> {
        let bytes = conn
            .recv()
            .await?
            .context("connection closed during handshake")?;
        let hello: ClientHello = from_cbor(&bytes)?;
        self.learn_key(&hello.from);

        let mut responder = Responder::new(self.identity.clone(), self.handshake_config());
        let reply = responder.process_client_hello(&hello, &self.registry)?;
        conn.send(to_canonical_cbor(&reply)?).await?;

        let peer = responder.peer().context("handshake incomplete")?;
        let keys = responder
            .session_keys()
            .cloned()
            .context("handshake produced no keys")?;
        info!(%peer, addr = %conn.remote_addr(), "session established (responder)");
        self.start_session(conn, peer, keys);
        Ok(())
    }

    /// A BID is its own verifying key; remember it for the registry seam.
    fn learn_key(&self, bid: &Bid) {
        if !self.registry.contains(bid) {
            if let Ok(key) = bid.verifying_key() {
                self.registry.register(*bid, key);
            }
        }
    }

    /// Register the session and spawn its reader/writer task.
    fn start_session<C: Connection>(self: Arc<Self>, conn: C, peer: Bid, keys: SessionKeys) {
        let cipher = match SessionCipher::new(&keys) {
            Ok(cipher) => cipher,
            Err(error) => {
                error!(%peer, %error, "session cipher setup failed");
                return;
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        self.peers.insert(
            peer,
            PeerHandle {
                outbound: outbound_tx,
                tracker: Arc::new(SequenceTracker::new()),
                addr: conn.remote_addr(),
            },
        );

        // Pull the new peer into every subscribed topic mesh.
        let server = Arc::clone(&self);
        tokio::spawn(async move {
            for topic in server.gossip.topics() {
                server.gossip.add_mesh_peer(&topic, peer);
                let body = match to_canonical_cbor(&GraftBody { topic }) {
                    Ok(body) => body,
                    Err(error) => {
                        warn!(%error, "graft body encoding failed");
                        continue;
                    }
                };
                if let Err(error) = server
                    .sender
                    .send_body(&peer, beenet_core::Kind::Graft, body)
                    .await
                {
                    warn!(%peer, %error, "graft send failed");
                }
            }
        });

        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            self.run_session(conn, peer, cipher, outbound_rx, shutdown_rx).await;
        });
    }

    /// Session task: seal outbound frames, open and route inbound records.
    async fn run_session<C: Connection>(
        self: Arc<Self>,
        mut conn: C,
        peer: Bid,
        mut cipher: SessionCipher,
        mut outbound_rx: mpsc::Receiver<beenet_core::BaseFrame>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let aad = PROTOCOL_NAME.as_bytes();
        loop {
            tokio::select! {
                queued = outbound_rx.recv() => {
                    let Some(frame) = queued else { break };
                    let bytes = match frame.encode() {
                        Ok(bytes) => bytes,
                        Err(error) => {
                            warn!(%peer, %error, "frame encoding failed");
                            continue;
                        }
                    };
                    let (counter, sealed) = match cipher.seal(&bytes, aad) {
                        Ok(sealed) => sealed,
                        Err(error) => {
                            error!(%peer, %error, "seal failed, closing session");
                            break;
                        }
                    };
                    let mut wire = counter.to_be_bytes().to_vec();
                    wire.extend_from_slice(&sealed);
                    if let Err(error) = conn.send(wire).await {
                        warn!(%peer, %error, "session send failed");
                        break;
                    }
                }
                inbound = conn.recv() => {
                    match inbound {
                        Ok(Some(wire)) => {
                            if wire.len() < 8 {
                                warn!(%peer, "truncated session record");
                                continue;
                            }
                            let mut counter_bytes = [0u8; 8];
                            counter_bytes.copy_from_slice(&wire[..8]);
                            let counter = u64::from_be_bytes(counter_bytes);
                            match cipher.open(&wire[8..], aad, counter) {
                                Ok(bytes) => {
                                    if let Err(error) = self.router.handle_frame(&peer, &bytes).await {
                                        warn!(%peer, %error, "frame handling failed");
                                    }
                                }
                                Err(error) => {
                                    warn!(%peer, %error, "record decryption failed");
                                }
                            }
                        }
                        Ok(None) => {
                            debug!(%peer, "session closed by peer");
                            break;
                        }
                        Err(error) => {
                            warn!(%peer, %error, "session receive failed");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }

        let _ = conn.close().await;
        self.peers.remove(&peer);
        info!(%peer, "session ended");
    }

    /// Refresh our presence and handle index in the DHT, and announce to
    /// connected peers.
    fn spawn_presence_task(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let server = self;
        let mut shutdown_rx = server.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(PRESENCE_TTL_MS / 2));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(error) = server.refresh_presence().await {
                            warn!(%error, "presence refresh failed");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }

    async fn refresh_presence(&self) -> anyhow::Result<()> {
        let addrs = vec![format!("/ip4/{}/tcp/{}", self.config.listen.ip(), self.config.listen.port())];
        let record = build_presence(
            &self.identity,
            self.swarm,
            &self.config.nickname,
            addrs,
            vec!["gossip".into(), "content".into()],
        )?;
        let bytes = to_canonical_cbor(&record)?;
        self.dht
            .put(
                beenet_net::dht::presence_key(&self.swarm, &self.identity.bid()),
                bytes.clone(),
            )
            .await
            .map_err(|e| anyhow::anyhow!("dht put: {e}"))?;

        let index = build_handle_index(&self.identity, &self.config.nickname)?;
        let index_bytes = to_canonical_cbor(&index)?;
        self.dht
            .put(
                beenet_net::dht::handle_key(&self.swarm, &index.handle),
                index_bytes,
            )
            .await
            .map_err(|e| anyhow::anyhow!("dht put: {e}"))?;

        let name_record = build_name_record(&self.identity, self.swarm, &self.config.nickname)?;
        let name_bytes = to_canonical_cbor(&name_record)?;
        self.dht
            .put(
                beenet_net::dht::name_key(&self.swarm, &name_record.name),
                name_bytes,
            )
            .await
            .map_err(|e| anyhow::anyhow!("dht put: {e}"))?;

        // Introduce ourselves to every connected peer.
        use beenet_gossip::engine::FrameSender;
        let frame = beenet_core::BaseFrame::signed(
            beenet_core::Kind::AnnouncePresence,
            self.identity.bid(),
            self.sender_seq(),
            bytes,
            self.identity.signing_key(),
        )?;
        self.sender.broadcast(frame).await.ok();

        debug!("presence refreshed");
        Ok(())
    }

    fn sender_seq(&self) -> u64 {
        // The sender's tracker is the node-global one.
        use beenet_content::ChunkSender;
        self.sender.next_seq(&self.identity.bid())
    }

    /// Server statistics for the operator surface.
    pub fn stats(&self) -> ServerStats {
        ServerStats {
            peer_count: self.peers.len(),
            chunk_count: self.store.chunk_count(),
            topic_count: self.gossip.topics().len(),
            pending_fetches: self.pending.outstanding(),
        }
    }
}

async fn log_deliveries(mut deliveries: mpsc::Receiver<beenet_gossip::Delivery>) {
    while let Some(delivery) = deliveries.recv().await {
        info!(
            topic = %delivery.topic,
            from = %delivery.from,
            bytes = delivery.payload.len(),
            "gossip delivery"
        );
    }
}

/// Server statistics
#[derive(Debug, Clone)]
pub struct ServerStats {
    pub peer_count: usize,
    pub chunk_count: usize,
    pub topic_count: usize,
    pub pending_fetches: usize,
}

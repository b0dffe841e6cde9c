use super::error::DhtError;
use super::message::{KrpcMessage, Query, Response, TransactionId};
use super::node::{decode_compact_nodes, encode_compact_nodes, is_valid_port, Node, NodeId};
use super::routing::RoutingTable;
use super::token::TokenIssuer;
use crate::config::{CrawlerConfig, PortRange};
use crate::constants::{MAX_DATAGRAM_SIZE, RESPONSE_NODE_COUNT, TRANSACTION_ID_LEN};
use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng as _;
use std::fmt;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Something the crawler learned, published to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlerEvent {
    /// Nodes from a `nodes` reply that were accepted into the routing table.
    NodesDiscovered(Vec<Node>),
    /// Uppercase hex info-hash seen in a `get_peers` query. Somebody is
    /// looking for it; nobody has claimed to have it yet.
    UnconfirmedHash(String),
    /// Uppercase hex info-hash from an authenticated `announce_peer`, with
    /// the announcing peer's address and resolved port.
    ConfirmedHash { info_hash: String, peer: SocketAddr },
    /// The socket failed; the crawler has stopped and will not retry.
    TransportError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlerState {
    Idle,
    Listening,
    Stopped,
}

impl CrawlerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlerState::Idle => "idle",
            CrawlerState::Listening => "listening",
            CrawlerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for CrawlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A datagram ready to be sent.
type Outbound = (Vec<u8>, SocketAddr);

/// A Mainline DHT crawler.
///
/// The crawler joins the swarm through the configured bootstrap routers,
/// keeps walking its routing table to get itself known, and answers every
/// query with an id that sits right next to the asker. Peers then route
/// `get_peers` and `announce_peer` traffic to it, which is reported as
/// [`CrawlerEvent`]s.
///
/// All protocol state lives in a single task; handlers never block and
/// never see each other's partial updates.
///
/// # Examples
///
/// ```no_run
/// use dht_crawler::{Crawler, CrawlerConfig, CrawlerEvent};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut crawler = Crawler::new(CrawlerConfig::default())?;
/// let mut events = crawler.subscribe();
/// crawler.start().await?;
///
/// while let Ok(event) = events.recv().await {
///     if let CrawlerEvent::ConfirmedHash { info_hash, peer } = event {
///         println!("{info_hash} is shared by {peer}");
///     }
/// }
///
/// crawler.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct Crawler {
    config: CrawlerConfig,
    our_id: NodeId,
    state: Arc<Mutex<CrawlerState>>,
    events: broadcast::Sender<CrawlerEvent>,
    local_addr: Option<SocketAddr>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl Crawler {
    pub fn new(config: CrawlerConfig) -> Result<Self, DhtError> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);

        Ok(Self {
            config,
            our_id: NodeId::generate(),
            state: Arc::new(Mutex::new(CrawlerState::Idle)),
            events,
            local_addr: None,
            shutdown: None,
            task: None,
        })
    }

    pub fn node_id(&self) -> &NodeId {
        &self.our_id
    }

    pub fn state(&self) -> CrawlerState {
        *self.state.lock()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CrawlerEvent> {
        self.events.subscribe()
    }

    /// Binds the socket and starts joining, walking and answering queries.
    ///
    /// Only valid from [`CrawlerState::Idle`]. Returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr, DhtError> {
        let state = self.state();
        if state != CrawlerState::Idle {
            return Err(DhtError::InvalidState(state.as_str(), "idle"));
        }

        let socket = bind_in_range(self.config.bind_ip, self.config.port_range).await?;
        let local_addr = socket.local_addr()?;
        info!("DHT crawler listening on {} with id {}", local_addr, self.our_id);

        let engine = Engine::new(self.our_id, &self.config, self.events.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        *self.state.lock() = CrawlerState::Listening;
        let event_loop = EventLoop {
            engine,
            socket,
            config: self.config.clone(),
            shutdown: shutdown_rx,
            state: self.state.clone(),
        };
        self.task = Some(tokio::spawn(event_loop.run()));
        self.shutdown = Some(shutdown_tx);
        self.local_addr = Some(local_addr);

        Ok(local_addr)
    }

    /// Stops the crawler and closes its socket.
    ///
    /// Once this returns no handler or timer runs again. Calling it twice,
    /// or before [`start`](Self::start), is fine.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("DHT crawler task ended abnormally: {}", e);
            }
        }
        *self.state.lock() = CrawlerState::Stopped;
    }
}

impl Drop for Crawler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn bind_in_range(ip: Ipv4Addr, range: PortRange) -> Result<UdpSocket, DhtError> {
    let count = range.len();
    let offset = rand::rng().random_range(0..count);

    for i in 0..count {
        let port = range.start + ((offset + i) % count) as u16;
        match UdpSocket::bind((ip, port)).await {
            Ok(socket) => return Ok(socket),
            Err(e) => debug!("cannot bind {}:{}: {}", ip, port, e),
        }
    }

    Err(DhtError::Bind {
        start: range.start,
        end: range.end,
    })
}

/// Outcome of one bootstrap lookup round.
#[derive(Debug, Default)]
struct Resolution {
    resolved: Vec<SocketAddr>,
    failed: Vec<String>,
}

async fn resolve_bootstrap(hosts: Vec<String>) -> Resolution {
    let mut resolution = Resolution::default();

    for host in &hosts {
        match tokio::net::lookup_host(host.as_str()).await {
            Ok(mut addrs) => match addrs.find(SocketAddr::is_ipv4) {
                Some(addr) => resolution.resolved.push(addr),
                None => {
                    warn!("bootstrap node {} has no IPv4 address", host);
                    resolution.failed.push(host.clone());
                }
            },
            Err(e) => {
                warn!("failed to resolve bootstrap node {}: {}", host, e);
                resolution.failed.push(host.clone());
            }
        }
    }

    resolution
}

/// Bootstrap routers known so far and the hosts still waiting for a lookup.
#[derive(Debug)]
struct Bootstrap {
    routers: Vec<SocketAddr>,
    unresolved: Vec<String>,
}

impl Bootstrap {
    fn new(hosts: Vec<String>) -> Self {
        Self {
            routers: Vec::new(),
            unresolved: hosts,
        }
    }

    /// Starts a lookup of the unresolved hosts, if there are any.
    fn lookup(&self) -> Option<Resolving> {
        if self.unresolved.is_empty() {
            return None;
        }
        Some(Box::pin(resolve_bootstrap(self.unresolved.clone())))
    }

    /// Records a lookup round and returns the routers it added.
    fn merge(&mut self, resolution: Resolution) -> Vec<SocketAddr> {
        let fresh: Vec<SocketAddr> = resolution
            .resolved
            .into_iter()
            .filter(|addr| !self.routers.contains(addr))
            .collect();
        self.routers.extend_from_slice(&fresh);
        self.unresolved = resolution.failed;
        fresh
    }
}

/// Errors some platforms report on an unconnected socket after an ICMP
/// unreachable. They concern one earlier datagram, not the socket.
fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionRefused
    )
}

type Resolving = Pin<Box<dyn Future<Output = Resolution> + Send>>;

struct EventLoop {
    engine: Engine,
    socket: UdpSocket,
    config: CrawlerConfig,
    shutdown: watch::Receiver<bool>,
    state: Arc<Mutex<CrawlerState>>,
}

impl EventLoop {
    async fn run(mut self) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        let mut join_interval = interval(self.config.join_interval);
        join_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let rotation = self.config.token_rotation;
        let mut token_interval = interval_at(Instant::now() + rotation, rotation);
        token_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let walk_delay = self.config.walk_delay;
        let walk = sleep(walk_delay);
        tokio::pin!(walk);
        let mut walking = true;

        let mut bootstrap = Bootstrap::new(self.config.bootstrap_nodes.clone());
        let mut resolving = bootstrap.lookup();

        loop {
            tokio::select! {
                // Timers come before the socket so a datagram flood cannot
                // starve the walk or token rotation.
                biased;

                _ = self.shutdown.changed() => break,

                resolution = async {
                    match resolving.as_mut() {
                        Some(pending) => pending.await,
                        None => std::future::pending().await,
                    }
                }, if resolving.is_some() => {
                    resolving = None;
                    let fresh = bootstrap.merge(resolution);
                    debug!(
                        "resolved {} bootstrap nodes, {} pending",
                        bootstrap.routers.len(),
                        bootstrap.unresolved.len()
                    );
                    for query in self.engine.join_queries(&fresh) {
                        self.send(query);
                    }
                }

                _ = join_interval.tick() => {
                    if resolving.is_none() {
                        resolving = bootstrap.lookup();
                    }
                    for query in self.engine.join_queries(&bootstrap.routers) {
                        self.send(query);
                    }
                    if !walking && self.engine.below_walk_ceiling() {
                        trace!("walk resumed at {} nodes", self.engine.table.len());
                        walking = true;
                        walk.as_mut().reset(Instant::now() + walk_delay);
                    }
                }

                _ = &mut walk, if walking => {
                    let (query, rearm) = self.engine.walk_step();
                    if let Some(query) = query {
                        self.send(query);
                    }
                    walking = rearm;
                    if rearm {
                        walk.as_mut().reset(Instant::now() + walk_delay);
                    } else {
                        debug!("walk parked at {} nodes", self.engine.table.len());
                    }
                }

                _ = token_interval.tick() => self.engine.tokens.rotate(),

                result = self.socket.recv_from(&mut buf) => match result {
                    Ok((n, from)) => {
                        if let Some(reply) = self.engine.handle_datagram(&buf[..n], from) {
                            self.send(reply);
                        }
                    }
                    Err(e) if is_transient(&e) => debug!("ignoring socket error: {}", e),
                    Err(e) => {
                        warn!("DHT crawler socket failed: {}", e);
                        self.engine.emit(CrawlerEvent::TransportError(e.to_string()));
                        *self.state.lock() = CrawlerState::Stopped;
                        break;
                    }
                },
            }
        }

        debug!("DHT crawler event loop finished");
    }

    fn send(&self, (data, addr): Outbound) {
        if let Err(e) = self.socket.try_send_to(&data, addr) {
            debug!("dropped datagram to {}: {}", addr, e);
        }
    }
}

/// Protocol state and handlers, independent of the socket and timers.
struct Engine {
    our_id: NodeId,
    table: RoutingTable,
    tokens: TokenIssuer,
    walk_ceiling: usize,
    events: broadcast::Sender<CrawlerEvent>,
}

impl Engine {
    fn new(our_id: NodeId, config: &CrawlerConfig, events: broadcast::Sender<CrawlerEvent>) -> Self {
        Self {
            our_id,
            table: RoutingTable::new(our_id, config.table_capacity),
            tokens: TokenIssuer::new(),
            walk_ceiling: config.walk_ceiling,
            events,
        }
    }

    fn emit(&self, event: CrawlerEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn below_walk_ceiling(&self) -> bool {
        self.table.len() < self.walk_ceiling
    }

    fn transaction_id() -> TransactionId {
        let id: [u8; TRANSACTION_ID_LEN] = rand::random();
        Bytes::copy_from_slice(&id)
    }

    fn encode(message: &KrpcMessage, to: SocketAddr) -> Option<Outbound> {
        match message.encode() {
            Ok(data) => Some((data, to)),
            Err(e) => {
                warn!("failed to encode message for {}: {}", to, e);
                None
            }
        }
    }

    /// One `find_node` per bootstrap router, aimed next to our own id.
    fn join_queries(&self, bootstrap: &[SocketAddr]) -> Vec<Outbound> {
        bootstrap
            .iter()
            .filter_map(|&addr| {
                let target = NodeId::neighbor(&self.our_id, &NodeId::generate());
                let query = KrpcMessage::find_node(Self::transaction_id(), self.our_id, target);
                Self::encode(&query, addr)
            })
            .collect()
    }

    /// Probes the oldest known node and reports whether the walk should
    /// keep going.
    fn walk_step(&mut self) -> (Option<Outbound>, bool) {
        let query = self.table.take_oldest().and_then(|node| {
            let near = NodeId::neighbor(&node.id, &self.our_id);
            let query = KrpcMessage::find_node(Self::transaction_id(), near, near);
            Self::encode(&query, SocketAddr::V4(node.addr))
        });

        (query, self.below_walk_ceiling())
    }

    fn handle_datagram(&mut self, data: &[u8], from: SocketAddr) -> Option<Outbound> {
        let message = match KrpcMessage::decode(data) {
            Ok(message) => message,
            Err(e) => {
                trace!("dropping datagram from {}: {}", from, e);
                return None;
            }
        };

        match message {
            KrpcMessage::Response { response, .. } => {
                self.handle_response(response, from);
                None
            }
            KrpcMessage::Query {
                transaction_id,
                sender_id,
                query,
            } => {
                let reply = self.handle_query(&sender_id, query, from)?;
                self.learn(sender_id, from);
                Self::encode(&KrpcMessage::response(transaction_id, reply), from)
            }
            KrpcMessage::Error { code, message, .. } => {
                trace!("KRPC error {} from {}: {}", code, from, message);
                None
            }
        }
    }

    /// Queues a node that proved it is alive by talking to us.
    fn learn(&mut self, id: NodeId, from: SocketAddr) {
        if let SocketAddr::V4(addr) = from {
            self.table.add(Node::new(id, addr));
        }
    }

    fn handle_response(&mut self, response: Response, from: SocketAddr) {
        if let Some(nodes) = response.nodes {
            let accepted: Vec<Node> = decode_compact_nodes(&nodes)
                .into_iter()
                .filter(|node| node.id != self.our_id && is_valid_port(node.addr.port().into()))
                .filter(|node| self.table.add(*node))
                .collect();

            if !accepted.is_empty() {
                trace!("{} new nodes from {}", accepted.len(), from);
                self.emit(CrawlerEvent::NodesDiscovered(accepted));
            }
        }

        if let Some(id) = response.id {
            self.learn(id, from);
        }
    }

    /// Builds the reply to a query, or `None` to drop it silently.
    fn handle_query(&mut self, sender_id: &NodeId, query: Query, from: SocketAddr) -> Option<Response> {
        let id = Some(NodeId::neighbor(sender_id, &self.our_id));

        match query {
            Query::Ping => Some(Response {
                id,
                ..Default::default()
            }),
            Query::FindNode { target } => Some(Response {
                id,
                nodes: Some(self.closest_nodes(&target)),
                token: None,
            }),
            Query::GetPeers { info_hash } => {
                self.emit(CrawlerEvent::UnconfirmedHash(hex::encode_upper(info_hash)));
                Some(Response {
                    id,
                    nodes: Some(self.closest_nodes(&NodeId(info_hash))),
                    token: Some(self.tokens.current()),
                })
            }
            Query::AnnouncePeer {
                info_hash,
                port,
                token,
                implied_port,
            } => {
                if !self.tokens.is_valid(&token) {
                    debug!("rejecting announce_peer from {}: invalid token", from);
                    return None;
                }

                let port = if implied_port {
                    i64::from(from.port())
                } else {
                    port.unwrap_or(0)
                };
                if !is_valid_port(port) {
                    debug!("rejecting announce_peer from {}: invalid port {}", from, port);
                    return None;
                }

                let peer = SocketAddr::new(from.ip(), port as u16);
                let info_hash = hex::encode_upper(info_hash);
                debug!("{} announced {}", peer, info_hash);
                self.emit(CrawlerEvent::ConfirmedHash { info_hash, peer });

                Some(Response {
                    id,
                    ..Default::default()
                })
            }
        }
    }

    fn closest_nodes(&self, target: &NodeId) -> Bytes {
        encode_compact_nodes(&self.table.sample(target, RESPONSE_NODE_COUNT))
    }
}

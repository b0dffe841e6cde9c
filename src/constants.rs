//! Protocol constants and tuning defaults.
//!
//! The tunables here are the defaults of [`CrawlerConfig`](crate::CrawlerConfig);
//! everything else is fixed by the Mainline DHT protocol ([BEP-5]).
//!
//! [BEP-5]: http://bittorrent.org/beps/bep_0005.html

use std::time::Duration;

// ============================================================================
// Bootstrap
// ============================================================================

/// Well-known routers used to join the swarm.
pub const DEFAULT_BOOTSTRAP_NODES: &[&str] = &["router.bittorrent.com:6881", "dht.transmissionbt.com:6881"];

/// Interval between `find_node` rounds sent to every bootstrap router.
/// The first round goes out as soon as the socket is bound.
pub const DEFAULT_JOIN_INTERVAL: Duration = Duration::from_secs(3);

// ============================================================================
// Routing table and walk
// ============================================================================

/// Maximum number of nodes held in the routing table.
pub const DEFAULT_TABLE_CAPACITY: usize = 600;

/// Delay between two walk steps.
pub const DEFAULT_WALK_DELAY: Duration = Duration::from_millis(200);

/// The walk parks once the table holds this many nodes.
pub const DEFAULT_WALK_CEILING: usize = 1000;

/// Nodes included in each `find_node` / `get_peers` reply (Kademlia K).
pub const RESPONSE_NODE_COUNT: usize = 8;

// ============================================================================
// Socket
// ============================================================================

/// First candidate port for the crawler socket.
pub const DEFAULT_PORT_RANGE_START: u16 = 4001;

/// Last candidate port for the crawler socket (inclusive).
pub const DEFAULT_PORT_RANGE_END: u16 = 4049;

/// Receive buffer size; large enough for any UDP payload.
pub const MAX_DATAGRAM_SIZE: usize = 65535;

/// Length of the transaction ids we put on outbound queries.
pub const TRANSACTION_ID_LEN: usize = 2;

// ============================================================================
// Tokens and events
// ============================================================================

/// Announce tokens rotate this often; a token stays valid for up to two
/// periods.
pub const DEFAULT_TOKEN_ROTATION: Duration = Duration::from_secs(5 * 60);

/// Capacity of the broadcast channel carrying [`CrawlerEvent`](crate::CrawlerEvent)s.
/// Subscribers that fall further behind than this miss events.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

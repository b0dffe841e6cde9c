//! Mainline DHT crawling (BEP-5).
//!
//! The crawler speaks just enough KRPC to be a convincing node: it answers
//! `ping`, `find_node`, `get_peers` and `announce_peer`, and sends only
//! `find_node` itself. Its routing table is a bounded FIFO rather than a
//! k-bucket tree, since the goal is to touch as many nodes as possible, not
//! to route lookups efficiently.

mod crawler;
mod error;
mod message;
mod node;
mod routing;
mod token;

pub use crawler::{Crawler, CrawlerEvent, CrawlerState};
pub use error::{DecodeError, DhtError};
pub use message::{KrpcMessage, Query, Response, TransactionId};
pub use node::{
    decode_compact_nodes, encode_compact_nodes, is_valid_port, Node, NodeId, COMPACT_NODE_LEN,
    ID_LEN, NEIGHBOR_PREFIX_LEN,
};
pub use routing::RoutingTable;
pub use token::TokenIssuer;

#[cfg(test)]
mod tests;

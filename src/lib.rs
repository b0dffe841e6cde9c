//! dht-crawler - a BitTorrent Mainline DHT crawler
//!
//! The crawler joins the public DHT, makes itself look close to every node
//! it talks to, and reports the info-hashes that flow past it:
//!
//! - `get_peers` queries yield *unconfirmed* hashes (someone is searching)
//! - authenticated `announce_peer` queries yield *confirmed* hashes together
//!   with the announcing peer's address
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 Bencode encoding/decoding
//! - [`dht`] - KRPC codec, routing table, tokens and the crawler engine
//! - [`config`] - Crawler configuration and TOML loading
//! - [`constants`] - Protocol constants and defaults

pub mod bencode;
pub mod config;
pub mod constants;
pub mod dht;

pub use bencode::{decode, encode, BencodeError, Value};
pub use config::{CrawlerConfig, PortRange};
pub use dht::{
    Crawler, CrawlerEvent, CrawlerState, DecodeError, DhtError, KrpcMessage, Node, NodeId,
    RoutingTable, TokenIssuer,
};

use super::error::DhtError;
use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng as _;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Length of an id, info-hash or routing target.
pub const ID_LEN: usize = 20;

/// Length of one compact node record: id, IPv4 address, port.
pub const COMPACT_NODE_LEN: usize = 26;

/// Leading bytes a [`NodeId::neighbor`] id copies from the remote id.
pub const NEIGHBOR_PREFIX_LEN: usize = 10;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub [u8; ID_LEN]);

impl NodeId {
    pub fn generate() -> Self {
        let mut id = [0u8; ID_LEN];
        rand::rng().fill(&mut id);
        Self(id)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DhtError> {
        let id: [u8; ID_LEN] = bytes.try_into().map_err(|_| DhtError::InvalidNodeId)?;
        Ok(Self(id))
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// XOR distance. Comparing the returned arrays compares distances as
    /// unsigned big-endian integers.
    pub fn distance(&self, other: &NodeId) -> [u8; ID_LEN] {
        let mut dist = [0u8; ID_LEN];
        for (d, (a, b)) in dist.iter_mut().zip(self.0.iter().zip(other.0.iter())) {
            *d = a ^ b;
        }
        dist
    }

    /// An id that looks like `remote` to `remote` but carries our own tail.
    ///
    /// The first [`NEIGHBOR_PREFIX_LEN`] bytes come from `remote`, the rest
    /// from `ours`. Presenting this id makes us land in the remote's closest
    /// bucket, so it keeps routing queries our way.
    pub fn neighbor(remote: &NodeId, ours: &NodeId) -> NodeId {
        let mut id = ours.0;
        id[..NEIGHBOR_PREFIX_LEN].copy_from_slice(&remote.0[..NEIGHBOR_PREFIX_LEN]);
        NodeId(id)
    }

    pub fn to_hex_upper(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

pub fn is_valid_port(port: i64) -> bool {
    (1..=i64::from(u16::MAX)).contains(&port)
}

/// A remote DHT node as learned from a compact node list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub addr: SocketAddrV4,
}

impl Node {
    pub fn new(id: NodeId, addr: SocketAddrV4) -> Self {
        Self { id, addr }
    }

    pub fn from_compact(data: &[u8]) -> Option<Self> {
        let record: &[u8; COMPACT_NODE_LEN] = data.try_into().ok()?;

        let id = NodeId::from_bytes(&record[..ID_LEN]).ok()?;
        let ip = Ipv4Addr::new(record[20], record[21], record[22], record[23]);
        let port = u16::from_be_bytes([record[24], record[25]]);

        Some(Self::new(id, SocketAddrV4::new(ip, port)))
    }

    pub fn write_compact(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.id.0);
        buf.put_slice(&self.addr.ip().octets());
        buf.put_u16(self.addr.port());
    }
}

/// Packs nodes into concatenated 26-byte records, in order.
pub fn encode_compact_nodes(nodes: &[Node]) -> Bytes {
    let mut buf = BytesMut::with_capacity(nodes.len() * COMPACT_NODE_LEN);
    for node in nodes {
        node.write_compact(&mut buf);
    }
    buf.freeze()
}

/// Unpacks a compact node list. A buffer whose length is not a multiple of
/// 26 is rejected as a whole.
pub fn decode_compact_nodes(data: &[u8]) -> Vec<Node> {
    if data.len() % COMPACT_NODE_LEN != 0 {
        return Vec::new();
    }

    data.chunks_exact(COMPACT_NODE_LEN)
        .filter_map(Node::from_compact)
        .collect()
}

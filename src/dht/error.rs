use thiserror::Error;

#[derive(Debug, Error)]
pub enum DhtError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bencode error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("invalid node id length")]
    InvalidNodeId,

    #[error("crawler is {0}, expected {1}")]
    InvalidState(&'static str, &'static str),

    #[error("no port available in {start}..={end}")]
    Bind { start: u16, end: u16 },

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Reasons an inbound datagram is not a usable KRPC message.
///
/// Every variant means "drop the datagram"; none of them is fatal to the
/// crawler.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed bencode: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("top level is not a dictionary")]
    NotADict,

    #[error("missing or malformed key `{0}`")]
    MissingKey(&'static str),

    #[error("unknown message type {0:?}")]
    UnknownType(String),

    #[error("unknown method {0:?}")]
    UnknownMethod(String),

    #[error("`{field}` must be 20 bytes, got {len}")]
    BadLength { field: &'static str, len: usize },
}

use super::error::{DecodeError, DhtError};
use super::node::{NodeId, ID_LEN};
use crate::bencode::{decode, encode, Value};
use bytes::Bytes;
use std::collections::BTreeMap;

pub type TransactionId = Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Ping,
    FindNode {
        target: NodeId,
    },
    GetPeers {
        info_hash: [u8; ID_LEN],
    },
    AnnouncePeer {
        info_hash: [u8; ID_LEN],
        /// Advertised port, unchecked. Peers using `implied_port` may omit it.
        port: Option<i64>,
        token: Bytes,
        implied_port: bool,
    },
}

impl Query {
    pub fn method(&self) -> &'static str {
        match self {
            Query::Ping => "ping",
            Query::FindNode { .. } => "find_node",
            Query::GetPeers { .. } => "get_peers",
            Query::AnnouncePeer { .. } => "announce_peer",
        }
    }
}

/// The `r` dictionary of a response. Only the keys the crawler reads or
/// writes are modelled; `values` lists are never sent and are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub id: Option<NodeId>,
    /// Raw compact node list, decoded by the consumer.
    pub nodes: Option<Bytes>,
    pub token: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KrpcMessage {
    Query {
        transaction_id: TransactionId,
        sender_id: NodeId,
        query: Query,
    },
    Response {
        transaction_id: TransactionId,
        response: Response,
    },
    Error {
        transaction_id: TransactionId,
        code: i64,
        message: String,
    },
}

type Dict = BTreeMap<Bytes, Value>;

fn bytes_field<'a>(dict: &'a Dict, key: &'static str) -> Result<&'a Bytes, DecodeError> {
    dict.get(key.as_bytes())
        .and_then(Value::as_bytes)
        .ok_or(DecodeError::MissingKey(key))
}

fn id_field(dict: &Dict, key: &'static str) -> Result<[u8; ID_LEN], DecodeError> {
    let raw = bytes_field(dict, key)?;
    <[u8; ID_LEN]>::try_from(raw.as_ref()).map_err(|_| DecodeError::BadLength {
        field: key,
        len: raw.len(),
    })
}

fn dict_field<'a>(dict: &'a Dict, key: &'static str) -> Result<&'a Dict, DecodeError> {
    dict.get(key.as_bytes())
        .and_then(Value::as_dict)
        .ok_or(DecodeError::MissingKey(key))
}

impl KrpcMessage {
    pub fn ping(transaction_id: TransactionId, our_id: NodeId) -> Self {
        Self::Query {
            transaction_id,
            sender_id: our_id,
            query: Query::Ping,
        }
    }

    pub fn find_node(transaction_id: TransactionId, our_id: NodeId, target: NodeId) -> Self {
        Self::Query {
            transaction_id,
            sender_id: our_id,
            query: Query::FindNode { target },
        }
    }

    pub fn get_peers(transaction_id: TransactionId, our_id: NodeId, info_hash: [u8; ID_LEN]) -> Self {
        Self::Query {
            transaction_id,
            sender_id: our_id,
            query: Query::GetPeers { info_hash },
        }
    }

    pub fn announce_peer(
        transaction_id: TransactionId,
        our_id: NodeId,
        info_hash: [u8; ID_LEN],
        port: u16,
        token: Bytes,
        implied_port: bool,
    ) -> Self {
        Self::Query {
            transaction_id,
            sender_id: our_id,
            query: Query::AnnouncePeer {
                info_hash,
                port: Some(i64::from(port)),
                token,
                implied_port,
            },
        }
    }

    pub fn response(transaction_id: TransactionId, response: Response) -> Self {
        Self::Response {
            transaction_id,
            response,
        }
    }

    pub fn error(transaction_id: TransactionId, code: i64, message: impl Into<String>) -> Self {
        Self::Error {
            transaction_id,
            code,
            message: message.into(),
        }
    }

    pub fn transaction_id(&self) -> &TransactionId {
        match self {
            Self::Query { transaction_id, .. }
            | Self::Response { transaction_id, .. }
            | Self::Error { transaction_id, .. } => transaction_id,
        }
    }

    /// Parses one datagram.
    ///
    /// Anything that is not a well-formed KRPC message with the fields its
    /// method requires comes back as a [`DecodeError`].
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let value = decode(data)?;
        let dict = value.as_dict().ok_or(DecodeError::NotADict)?;

        let transaction_id = bytes_field(dict, "t")?.clone();
        let msg_type = dict
            .get(b"y".as_slice())
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingKey("y"))?;

        match msg_type {
            "q" => Self::decode_query(transaction_id, dict),
            "r" => Self::decode_response(transaction_id, dict),
            "e" => Ok(Self::decode_error(transaction_id, dict)),
            other => Err(DecodeError::UnknownType(other.to_string())),
        }
    }

    fn decode_query(transaction_id: TransactionId, dict: &Dict) -> Result<Self, DecodeError> {
        let method = dict
            .get(b"q".as_slice())
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingKey("q"))?;
        let args = dict_field(dict, "a")?;
        let sender_id = NodeId(id_field(args, "id")?);

        let query = match method {
            "ping" => Query::Ping,
            "find_node" => Query::FindNode {
                target: NodeId(id_field(args, "target")?),
            },
            "get_peers" => Query::GetPeers {
                info_hash: id_field(args, "info_hash")?,
            },
            "announce_peer" => Query::AnnouncePeer {
                info_hash: id_field(args, "info_hash")?,
                port: args.get(b"port".as_slice()).and_then(Value::as_integer),
                token: bytes_field(args, "token")?.clone(),
                implied_port: args
                    .get(b"implied_port".as_slice())
                    .and_then(Value::as_integer)
                    .is_some_and(|flag| flag != 0),
            },
            other => return Err(DecodeError::UnknownMethod(other.to_string())),
        };

        Ok(Self::Query {
            transaction_id,
            sender_id,
            query,
        })
    }

    fn decode_response(transaction_id: TransactionId, dict: &Dict) -> Result<Self, DecodeError> {
        let body = dict_field(dict, "r")?;

        let id = match body.get(b"id".as_slice()) {
            Some(_) => Some(NodeId(id_field(body, "id")?)),
            None => None,
        };

        Ok(Self::Response {
            transaction_id,
            response: Response {
                id,
                nodes: body.get(b"nodes".as_slice()).and_then(Value::as_bytes).cloned(),
                token: body.get(b"token".as_slice()).and_then(Value::as_bytes).cloned(),
            },
        })
    }

    fn decode_error(transaction_id: TransactionId, dict: &Dict) -> Self {
        let detail = dict.get(b"e".as_slice()).and_then(Value::as_list).unwrap_or_default();

        Self::Error {
            transaction_id,
            code: detail.first().and_then(Value::as_integer).unwrap_or(0),
            message: detail
                .get(1)
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, DhtError> {
        let mut dict = Dict::new();
        dict.insert(
            Bytes::from_static(b"t"),
            Value::Bytes(self.transaction_id().clone()),
        );

        match self {
            Self::Query {
                sender_id, query, ..
            } => {
                dict.insert(Bytes::from_static(b"y"), Value::string("q"));
                dict.insert(Bytes::from_static(b"q"), Value::string(query.method()));

                let mut args = Dict::new();
                args.insert(Bytes::from_static(b"id"), Value::bytes(sender_id.as_bytes()));

                match query {
                    Query::Ping => {}
                    Query::FindNode { target } => {
                        args.insert(Bytes::from_static(b"target"), Value::bytes(target.as_bytes()));
                    }
                    Query::GetPeers { info_hash } => {
                        args.insert(Bytes::from_static(b"info_hash"), Value::bytes(info_hash));
                    }
                    Query::AnnouncePeer {
                        info_hash,
                        port,
                        token,
                        implied_port,
                    } => {
                        args.insert(Bytes::from_static(b"info_hash"), Value::bytes(info_hash));
                        if let Some(port) = port {
                            args.insert(Bytes::from_static(b"port"), Value::Integer(*port));
                        }
                        args.insert(Bytes::from_static(b"token"), Value::Bytes(token.clone()));
                        if *implied_port {
                            args.insert(Bytes::from_static(b"implied_port"), Value::Integer(1));
                        }
                    }
                }

                dict.insert(Bytes::from_static(b"a"), Value::Dict(args));
            }
            Self::Response { response, .. } => {
                dict.insert(Bytes::from_static(b"y"), Value::string("r"));

                let mut body = Dict::new();
                if let Some(id) = &response.id {
                    body.insert(Bytes::from_static(b"id"), Value::bytes(id.as_bytes()));
                }
                if let Some(nodes) = &response.nodes {
                    body.insert(Bytes::from_static(b"nodes"), Value::Bytes(nodes.clone()));
                }
                if let Some(token) = &response.token {
                    body.insert(Bytes::from_static(b"token"), Value::Bytes(token.clone()));
                }

                dict.insert(Bytes::from_static(b"r"), Value::Dict(body));
            }
            Self::Error { code, message, .. } => {
                dict.insert(Bytes::from_static(b"y"), Value::string("e"));
                dict.insert(
                    Bytes::from_static(b"e"),
                    Value::List(vec![Value::Integer(*code), Value::string(message)]),
                );
            }
        }

        Ok(encode(&Value::Dict(dict))?)
    }
}

use super::*;
use bytes::Bytes;
use proptest::prelude::*;
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddrV4};

fn node(byte: u8, port: u16) -> Node {
    Node::new(
        NodeId([byte; 20]),
        SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, byte), port),
    )
}

#[test]
fn test_node_id_generate() {
    let id1 = NodeId::generate();
    let id2 = NodeId::generate();
    assert_ne!(id1.0, id2.0);
}

#[test]
fn test_node_id_from_bytes() {
    let bytes = [1u8; 20];
    let id = NodeId::from_bytes(&bytes).unwrap();
    assert_eq!(id.0, bytes);

    assert!(NodeId::from_bytes(&[1u8; 10]).is_err());
    assert!(NodeId::from_bytes(&[1u8; 21]).is_err());
}

#[test]
fn test_node_id_distance() {
    let id1 = NodeId([0u8; 20]);
    let id2 = NodeId([0xFF; 20]);

    assert_eq!(id1.distance(&id2), [0xFF; 20]);
    assert_eq!(id1.distance(&id1), [0u8; 20]);

    let mut near = [0u8; 20];
    near[19] = 1;
    let mut far = [0u8; 20];
    far[0] = 1;
    assert!(id1.distance(&NodeId(near)) < id1.distance(&NodeId(far)));
}

#[test]
fn test_neighbor_splits_prefix_and_suffix() {
    let remote = NodeId([0xAB; 20]);
    let ours = NodeId::generate();

    let id = NodeId::neighbor(&remote, &ours);
    assert_eq!(id.as_bytes().len(), 20);
    assert_eq!(id.0[..NEIGHBOR_PREFIX_LEN], remote.0[..NEIGHBOR_PREFIX_LEN]);
    assert_eq!(id.0[NEIGHBOR_PREFIX_LEN..], ours.0[NEIGHBOR_PREFIX_LEN..]);

    // The neighbor id is closer to the remote than any id differing in
    // the first byte.
    let mut other = remote.0;
    other[0] ^= 0x80;
    assert!(remote.distance(&id) < remote.distance(&NodeId(other)));
}

#[test]
fn test_node_id_hex() {
    let id = NodeId([0xAB; 20]);
    assert_eq!(id.to_string(), "ab".repeat(20));
    assert_eq!(id.to_hex_upper(), "AB".repeat(20));
}

#[test]
fn test_is_valid_port() {
    assert!(!is_valid_port(0));
    assert!(is_valid_port(1));
    assert!(is_valid_port(65535));
    assert!(!is_valid_port(65536));
    assert!(!is_valid_port(-6881));
}

#[test]
fn test_node_compact() {
    let n = node(1, 6881);
    let compact = encode_compact_nodes(&[n]);
    assert_eq!(compact.len(), COMPACT_NODE_LEN);
    assert_eq!(&compact[20..24], &[192, 168, 1, 1]);
    assert_eq!(&compact[24..], &6881u16.to_be_bytes());

    assert_eq!(Node::from_compact(&compact), Some(n));
    assert_eq!(Node::from_compact(&compact[..25]), None);
}

#[test]
fn test_compact_nodes_keep_order() {
    let nodes = vec![node(3, 1000), node(1, 2000), node(2, 3000)];
    let compact = encode_compact_nodes(&nodes);
    assert_eq!(compact.len(), 3 * COMPACT_NODE_LEN);
    assert_eq!(decode_compact_nodes(&compact), nodes);
}

#[test]
fn test_decode_compact_nodes_rejects_ragged_buffer() {
    let mut compact = encode_compact_nodes(&[node(1, 6881), node(2, 6881)]).to_vec();
    compact.push(0);
    assert!(decode_compact_nodes(&compact).is_empty());
    assert!(decode_compact_nodes(&[]).is_empty());
}

fn arb_node() -> impl Strategy<Value = Node> {
    (any::<[u8; 20]>(), any::<[u8; 4]>(), 1u16..=u16::MAX).prop_map(|(id, ip, port)| {
        Node::new(NodeId(id), SocketAddrV4::new(Ipv4Addr::from(ip), port))
    })
}

proptest! {
    #[test]
    fn test_compact_nodes_roundtrip_any_length(nodes in prop::collection::vec(arb_node(), 0..40)) {
        let compact = encode_compact_nodes(&nodes);
        prop_assert_eq!(compact.len(), nodes.len() * COMPACT_NODE_LEN);
        prop_assert_eq!(decode_compact_nodes(&compact), nodes);
    }

    #[test]
    fn test_compact_nodes_ragged_length_decodes_empty(
        nodes in prop::collection::vec(arb_node(), 0..10),
        extra in 1usize..COMPACT_NODE_LEN,
    ) {
        let mut compact = encode_compact_nodes(&nodes).to_vec();
        compact.extend(std::iter::repeat(0xFF).take(extra));
        prop_assert!(decode_compact_nodes(&compact).is_empty());
    }

    /// Against a plain list model: bounded size, earliest evicted first,
    /// no duplicate ids.
    #[test]
    fn test_routing_table_matches_fifo_model(
        capacity in 1usize..16,
        ids in prop::collection::vec(1u8..32, 0..100),
    ) {
        let mut table = RoutingTable::new(NodeId([0; 20]), capacity);
        let mut model: Vec<Node> = Vec::new();

        for byte in ids {
            let candidate = node(byte, 6881);
            let expected = !model.iter().any(|n| n.id == candidate.id);
            if expected {
                if model.len() == capacity {
                    model.remove(0);
                }
                model.push(candidate);
            }

            prop_assert_eq!(table.add(candidate), expected);
            prop_assert!(table.len() <= capacity);
            prop_assert_eq!(table.snapshot(), model.clone());
        }

        let unique: HashSet<NodeId> = table.snapshot().iter().map(|n| n.id).collect();
        prop_assert_eq!(unique.len(), table.len());
    }
}

#[test]
fn test_routing_table_fifo() {
    let mut table = RoutingTable::new(NodeId([0; 20]), 10);
    for i in 1..=3 {
        assert!(table.add(node(i, 6881)));
    }

    assert_eq!(table.take_oldest(), Some(node(1, 6881)));
    assert_eq!(table.take_oldest(), Some(node(2, 6881)));
    assert_eq!(table.len(), 1);
    assert_eq!(table.take_oldest(), Some(node(3, 6881)));
    assert_eq!(table.take_oldest(), None);
    assert!(table.is_empty());
}

#[test]
fn test_routing_table_evicts_oldest_at_capacity() {
    let mut table = RoutingTable::new(NodeId([0; 20]), 3);
    for i in 1..=10 {
        table.add(node(i, 6881));
        assert!(table.len() <= table.capacity());
    }

    assert_eq!(table.snapshot(), vec![node(8, 6881), node(9, 6881), node(10, 6881)]);
}

#[test]
fn test_routing_table_rejects_invalid_nodes() {
    let our_id = NodeId([0x55; 20]);
    let mut table = RoutingTable::new(our_id, 10);

    assert!(!table.add(node(1, 0)));
    assert!(!table.add(Node::new(our_id, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 6881))));
    assert!(table.add(node(1, 6881)));
    assert!(!table.add(node(1, 7000)));
    assert_eq!(table.len(), 1);
}

#[test]
fn test_routing_table_readmits_after_take() {
    let mut table = RoutingTable::new(NodeId([0; 20]), 10);
    table.add(node(1, 6881));
    table.add(node(2, 6881));

    let first = table.take_oldest().unwrap();
    assert!(table.add(first));
    assert_eq!(table.snapshot(), vec![node(2, 6881), node(1, 6881)]);
}

#[test]
fn test_routing_table_sample_closest_first() {
    let mut table = RoutingTable::new(NodeId::generate(), 50);
    for i in 1..=20 {
        table.add(node(i, 6881));
    }

    let target = NodeId([4; 20]);
    let sample = table.sample(&target, 8);
    assert_eq!(sample.len(), 8);
    assert_eq!(sample[0], node(4, 6881));
    for pair in sample.windows(2) {
        assert!(pair[0].id.distance(&target) <= pair[1].id.distance(&target));
    }

    assert_eq!(table.sample(&target, 100).len(), 20);
    assert_eq!(table.len(), 20);
}

#[test]
fn test_token_issuer() {
    let mut tokens = TokenIssuer::new();
    let first = tokens.current();
    assert!(tokens.is_valid(&first));
    assert!(!tokens.is_valid(b"forged"));
    assert!(!tokens.is_valid(b""));

    tokens.rotate();
    let second = tokens.current();
    assert_ne!(first, second);
    assert!(tokens.is_valid(&first));
    assert!(tokens.is_valid(&second));

    tokens.rotate();
    assert!(!tokens.is_valid(&first));
    assert!(tokens.is_valid(&second));
}

#[test]
fn test_message_ping() {
    let our_id = NodeId::generate();
    let tid = Bytes::from_static(b"aa");

    let encoded = KrpcMessage::ping(tid.clone(), our_id).encode().unwrap();
    let parsed = KrpcMessage::decode(&encoded).unwrap();

    assert_eq!(parsed, KrpcMessage::ping(tid, our_id));
}

#[test]
fn test_message_find_node() {
    let our_id = NodeId::generate();
    let target = NodeId::generate();
    let tid = Bytes::from_static(b"bb");

    let encoded = KrpcMessage::find_node(tid.clone(), our_id, target).encode().unwrap();
    match KrpcMessage::decode(&encoded).unwrap() {
        KrpcMessage::Query {
            transaction_id,
            sender_id,
            query: Query::FindNode { target: t },
        } => {
            assert_eq!(transaction_id, tid);
            assert_eq!(sender_id, our_id);
            assert_eq!(t, target);
        }
        other => panic!("wrong message: {:?}", other),
    }
}

#[test]
fn test_message_announce_peer_wire_format() {
    let msg = KrpcMessage::announce_peer(
        Bytes::from_static(b"cc"),
        NodeId([b'a'; 20]),
        [b'h'; 20],
        6881,
        Bytes::from_static(b"tok"),
        true,
    );
    let expected = format!(
        "d1:ad2:id20:{}12:implied_porti1e9:info_hash20:{}4:porti6881e5:token3:toke1:q13:announce_peer1:t2:cc1:y1:qe",
        "a".repeat(20),
        "h".repeat(20),
    );
    assert_eq!(msg.encode().unwrap(), expected.as_bytes());
}

#[test]
fn test_message_announce_peer_without_port() {
    let data = format!(
        "d1:ad2:id20:{}12:implied_porti1e9:info_hash20:{}5:token3:toke1:q13:announce_peer1:t2:cc1:y1:qe",
        "a".repeat(20),
        "h".repeat(20),
    );
    match KrpcMessage::decode(data.as_bytes()).unwrap() {
        KrpcMessage::Query {
            query: Query::AnnouncePeer {
                port, implied_port, ..
            },
            ..
        } => {
            assert_eq!(port, None);
            assert!(implied_port);
        }
        other => panic!("wrong message: {:?}", other),
    }
}

#[test]
fn test_message_response_with_nodes() {
    let nodes = encode_compact_nodes(&[node(1, 6881)]);
    let response = Response {
        id: Some(NodeId([9; 20])),
        nodes: Some(nodes.clone()),
        token: Some(Bytes::from_static(b"tk")),
    };

    let encoded = KrpcMessage::response(Bytes::from_static(b"dd"), response.clone())
        .encode()
        .unwrap();
    match KrpcMessage::decode(&encoded).unwrap() {
        KrpcMessage::Response {
            response: parsed, ..
        } => assert_eq!(parsed, response),
        other => panic!("wrong message: {:?}", other),
    }
}

#[test]
fn test_message_error() {
    let encoded = KrpcMessage::error(Bytes::from_static(b"ee"), 203, "Protocol Error")
        .encode()
        .unwrap();
    assert_eq!(encoded, b"d1:eli203e14:Protocol Errore1:t2:ee1:y1:ee");

    match KrpcMessage::decode(&encoded).unwrap() {
        KrpcMessage::Error { code, message, .. } => {
            assert_eq!(code, 203);
            assert_eq!(message, "Protocol Error");
        }
        other => panic!("wrong message: {:?}", other),
    }
}

#[test]
fn test_decode_errors_are_typed() {
    assert!(matches!(KrpcMessage::decode(b"garbage"), Err(DecodeError::Bencode(_))));
    assert!(matches!(KrpcMessage::decode(b"li1ee"), Err(DecodeError::NotADict)));
    assert!(matches!(KrpcMessage::decode(b"d1:y1:qe"), Err(DecodeError::MissingKey("t"))));
    assert!(matches!(KrpcMessage::decode(b"d1:t2:aae"), Err(DecodeError::MissingKey("y"))));
    assert!(matches!(
        KrpcMessage::decode(b"d1:t2:aa1:y1:xe"),
        Err(DecodeError::UnknownType(_))
    ));
    assert!(matches!(
        KrpcMessage::decode(b"d1:ad2:id20:abcdefghij0123456789e1:q6:vote_x1:t2:aa1:y1:qe"),
        Err(DecodeError::UnknownMethod(_))
    ));
    assert!(matches!(
        KrpcMessage::decode(b"d1:ad2:id3:abce1:q4:ping1:t2:aa1:y1:qe"),
        Err(DecodeError::BadLength { field: "id", len: 3 })
    ));
    assert!(matches!(
        KrpcMessage::decode(b"d1:q4:ping1:t2:aa1:y1:qe"),
        Err(DecodeError::MissingKey("a"))
    ));
}

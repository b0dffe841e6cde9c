use bytes::Bytes;

use super::*;

#[test]
fn test_decode_integer() {
    assert_eq!(decode(b"i42e").unwrap(), Value::Integer(42));
    assert_eq!(decode(b"i-42e").unwrap(), Value::Integer(-42));
    assert_eq!(decode(b"i0e").unwrap(), Value::Integer(0));
}

#[test]
fn test_decode_integer_invalid() {
    assert!(decode(b"i-0e").is_err());
    assert!(decode(b"i03e").is_err());
    assert!(decode(b"ie").is_err());
    assert!(decode(b"i-e").is_err());
    assert!(decode(b"i+5e").is_err());
    assert!(decode(b"i99999999999999999999e").is_err());
}

#[test]
fn test_decode_integer_without_terminator() {
    assert!(matches!(decode(b"i42"), Err(BencodeError::UnexpectedEof(_))));
    assert!(decode(b"i123456789012345678901234567890e").is_err());
}

#[test]
fn test_decode_bytes() {
    assert_eq!(decode(b"4:spam").unwrap(), Value::Bytes(Bytes::from_static(b"spam")));
    assert_eq!(decode(b"0:").unwrap(), Value::Bytes(Bytes::new()));
}

#[test]
fn test_decode_bytes_length_past_end() {
    assert!(matches!(decode(b"10:short"), Err(BencodeError::UnexpectedEof(_))));
    assert!(decode(b"18446744073709551615:x").is_err());
    assert!(decode(b"04:spam").is_err());
}

#[test]
fn test_decode_bytes_signed_length() {
    assert!(matches!(decode(b"+5:hello"), Err(BencodeError::UnexpectedByte { byte: b'+', .. })));
    assert!(decode(b"l+5:helloe").is_err());
    assert!(matches!(decode(b"d+5:helloi1ee"), Err(BencodeError::NonStringKey)));
    assert!(matches!(decode(b"5+:hello"), Err(BencodeError::InvalidStringLength(0))));
}

#[test]
fn test_decoded_strings_share_one_buffer() {
    let value = decode(b"l4:spam4:eggse").unwrap();
    let items = value.as_list().unwrap();
    let spam = items[0].as_bytes().unwrap();
    let eggs = items[1].as_bytes().unwrap();

    // "spam" starts at offset 3, "eggs" at offset 9 of the same copy.
    assert_eq!(eggs.as_ptr() as usize - spam.as_ptr() as usize, 6);
}

#[test]
fn test_decode_nested_krpc_query() {
    let data = b"d1:ad2:id20:abcdefghij01234567896:target20:mnopqrstuvwxyz123456e1:q9:find_node1:t2:aa1:y1:qe";
    let value = decode(data).unwrap();

    assert_eq!(value.get(b"y").and_then(Value::as_str), Some("q"));
    assert_eq!(value.get(b"q").and_then(Value::as_str), Some("find_node"));
    let target = value
        .get(b"a")
        .and_then(|a| a.get(b"target"))
        .and_then(Value::as_bytes)
        .unwrap();
    assert_eq!(target.as_ref(), b"mnopqrstuvwxyz123456");
}

#[test]
fn test_decode_list() {
    let list = decode(b"l4:spami42ee").unwrap();
    let items = list.as_list().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_str(), Some("spam"));
    assert_eq!(items[1].as_integer(), Some(42));
}

#[test]
fn test_decode_rejects_non_string_key() {
    assert!(matches!(decode(b"di1ei2ee"), Err(BencodeError::NonStringKey)));
}

#[test]
fn test_decode_rejects_garbage() {
    assert!(decode(b"").is_err());
    assert!(decode(b"x").is_err());
    assert!(decode(b"d1:a").is_err());
    assert!(decode(b"l").is_err());
    assert!(decode(&[0xff, 0x00, 0x13]).is_err());
}

#[test]
fn test_nesting_limit() {
    let mut deep = vec![b'l'; 100];
    deep.extend(std::iter::repeat(b'e').take(100));
    assert!(matches!(decode(&deep), Err(BencodeError::NestingTooDeep)));

    let mut shallow = vec![b'l'; 8];
    shallow.extend(std::iter::repeat(b'e').take(8));
    assert!(decode(&shallow).is_ok());
}

#[test]
fn test_trailing_data_error() {
    assert!(matches!(decode(b"i42eextra"), Err(BencodeError::TrailingData(5))));
}

#[test]
fn test_encode_sorts_dict_keys() {
    let value = Value::dict([
        (&b"y"[..], Value::string("r")),
        (&b"t"[..], Value::string("aa")),
        (&b"r"[..], Value::dict([(&b"id"[..], Value::string("x"))])),
    ]);
    assert_eq!(encode(&value).unwrap(), b"d1:rd2:id1:xe1:t2:aa1:y1:re");
}

#[test]
fn test_encode_binary_string() {
    let value = Value::bytes(&[0, 1, 2, 0xff]);
    assert_eq!(encode(&value).unwrap(), b"4:\x00\x01\x02\xff");
}

#[test]
fn test_reencode_is_canonical() {
    let original = b"d1:eli201e23:A Generic Error Ocurrede1:t2:aa1:y1:ee";
    let decoded = decode(original).unwrap();
    assert_eq!(encode(&decoded).unwrap(), original);
}

#[test]
fn test_value_accessors() {
    let value = Value::Integer(42);
    assert_eq!(value.as_integer(), Some(42));
    assert!(value.as_bytes().is_none());
    assert!(value.get(b"x").is_none());

    let value = Value::string("test");
    assert_eq!(value.as_str(), Some("test"));
    assert!(value.as_integer().is_none());

    let value = Value::bytes(&[0xff, 0xfe]);
    assert!(value.as_str().is_none());

    let value = Value::List(vec![]);
    assert!(value.as_list().is_some());
    assert!(value.as_dict().is_none());
}

//! Bencode encoding and decoding ([BEP-3]).
//!
//! Every KRPC datagram exchanged on the DHT is a single bencoded dictionary,
//! so this module is the first line of defence against hostile input: the
//! decoder bounds nesting depth, rejects non-canonical integers and string
//! lengths that run past the buffer, and never panics on malformed data.
//!
//! | Type | Format | Example |
//! |------|--------|---------|
//! | Integer | `i<number>e` | `i42e` → 42 |
//! | Byte String | `<length>:<data>` | `4:spam` → "spam" |
//! | List | `l<items>e` | `l4:spami42ee` → ["spam", 42] |
//! | Dictionary | `d<key><value>...e` | `d1:y1:qe` → {"y": "q"} |
//!
//! # Examples
//!
//! ```
//! use dht_crawler::bencode::{decode, encode, Value};
//!
//! let ping = decode(b"d1:ad2:id20:abcdefghij0123456789e1:q4:ping1:t2:aa1:y1:qe").unwrap();
//! assert_eq!(ping.get(b"q").and_then(Value::as_str), Some("ping"));
//! let id = ping.get(b"a").and_then(|a| a.get(b"id")).and_then(Value::as_bytes);
//! assert_eq!(id.map(|id| id.len()), Some(20));
//!
//! let reply = Value::dict([(&b"t"[..], Value::string("aa")), (&b"y"[..], Value::string("r"))]);
//! assert_eq!(encode(&reply).unwrap(), b"d1:t2:aa1:y1:re");
//! ```
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html

mod decode;
mod encode;
mod error;
mod value;

pub use decode::decode;
pub use encode::encode;
pub use error::BencodeError;
pub use value::Value;

#[cfg(test)]
mod tests;

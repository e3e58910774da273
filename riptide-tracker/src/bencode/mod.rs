//! Bencode wire codec used by HTTP tracker responses and torrent metadata.
//!
//! Four node kinds are supported: byte strings, signed integers, lists and
//! dictionaries. Dictionaries are kept in a `BTreeMap` so encoding always
//! emits keys in lexicographic byte order.

pub mod decoder;
pub mod encoder;

use std::collections::BTreeMap;

pub use decoder::{Decoder, KeyOrder, decode, find_raw_entry};
pub use encoder::{encode, encode_into};

/// Dictionary representation with keys ordered by raw bytes.
pub type Dictionary = BTreeMap<Vec<u8>, Value>;

/// A single bencoded node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Length-prefixed byte string (not necessarily UTF-8)
    Bytes(Vec<u8>),
    /// Signed integer
    Integer(i64),
    /// Ordered, heterogeneous list
    List(Vec<Value>),
    /// Dictionary keyed by byte strings
    Dictionary(Dictionary),
}

impl Value {
    /// Returns the raw bytes if this is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the byte string as UTF-8 text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    /// Looks up `key` when this value is a dictionary.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.as_dictionary().and_then(|dict| dict.get(key))
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Bytes(text.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::Bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Dictionary> for Value {
    fn from(dict: Dictionary) -> Self {
        Value::Dictionary(dict)
    }
}

/// Errors raised while decoding bencoded input.
///
/// Every variant records the byte offset at which decoding stopped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BencodeError {
    #[error("unexpected end of input at byte {position}")]
    UnexpectedEnd { position: usize },

    #[error("unexpected byte 0x{byte:02x} at byte {position}")]
    UnexpectedByte { position: usize, byte: u8 },

    #[error("invalid integer at byte {position}")]
    InvalidInteger { position: usize },

    #[error("invalid string length prefix at byte {position}")]
    InvalidLength { position: usize },

    #[error("dictionary key at byte {position} is not a byte string")]
    NonStringKey { position: usize },

    #[error("dictionary key at byte {position} is out of order")]
    UnsortedKeys { position: usize },

    #[error("duplicate dictionary key at byte {position}")]
    DuplicateKey { position: usize },

    #[error("trailing data after top-level value at byte {position}")]
    TrailingData { position: usize },

    #[error("nesting too deep at byte {position}")]
    NestingTooDeep { position: usize },
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn arbitrary_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            any::<i64>().prop_map(Value::Integer),
            proptest::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
        ];
        leaf.prop_recursive(4, 64, 8, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..8).prop_map(Value::List),
                proptest::collection::btree_map(
                    proptest::collection::vec(any::<u8>(), 0..12),
                    inner,
                    0..8
                )
                .prop_map(Value::Dictionary),
            ]
        })
    }

    proptest! {
        #[test]
        fn test_decode_inverts_encode(value in arbitrary_value()) {
            let encoded = encode(&value);
            prop_assert_eq!(decode(&encoded).unwrap(), value);
        }
    }

    #[test]
    fn test_value_accessors() {
        let mut dict = Dictionary::new();
        dict.insert(b"interval".to_vec(), Value::from(1800));
        dict.insert(b"name".to_vec(), Value::from("riptide"));
        let value = Value::from(dict);

        assert_eq!(value.get(b"interval").and_then(Value::as_integer), Some(1800));
        assert_eq!(value.get(b"name").and_then(Value::as_str), Some("riptide"));
        assert!(value.get(b"missing").is_none());
        assert!(Value::from(7).get(b"interval").is_none());
        assert!(Value::Bytes(vec![0xff, 0xfe]).as_str().is_none());
    }
}

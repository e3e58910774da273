//! Bencode encoder producing canonical output

use super::Value;

/// Encodes `value` into a freshly allocated buffer.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buffer = Vec::new();
    encode_into(value, &mut buffer);
    buffer
}

/// Appends the encoding of `value` to `buffer`.
///
/// Dictionary keys are written in ascending byte order.
pub fn encode_into(value: &Value, buffer: &mut Vec<u8>) {
    match value {
        Value::Bytes(bytes) => write_bytes(bytes, buffer),
        Value::Integer(number) => {
            buffer.push(b'i');
            buffer.extend_from_slice(number.to_string().as_bytes());
            buffer.push(b'e');
        }
        Value::List(items) => {
            buffer.push(b'l');
            for item in items {
                encode_into(item, buffer);
            }
            buffer.push(b'e');
        }
        Value::Dictionary(dict) => {
            buffer.push(b'd');
            for (key, item) in dict {
                write_bytes(key, buffer);
                encode_into(item, buffer);
            }
            buffer.push(b'e');
        }
    }
}

fn write_bytes(bytes: &[u8], buffer: &mut Vec<u8>) {
    buffer.extend_from_slice(bytes.len().to_string().as_bytes());
    buffer.push(b':');
    buffer.extend_from_slice(bytes);
}

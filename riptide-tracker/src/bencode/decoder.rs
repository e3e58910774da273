//! Single-pass bencode decoder

use std::ops::Range;

use super::{BencodeError, Dictionary, Value};

/// Maximum container nesting accepted before decoding is aborted.
const DEFAULT_MAX_DEPTH: usize = 64;

/// Longest digit run accepted for an integer or length prefix.
const MAX_NUMBER_DIGITS: usize = 20;

/// Dictionary key ordering accepted by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrder {
    /// Keys must appear in strictly ascending byte order
    Strict,
    /// Keys may appear in any order; duplicates are still rejected
    Any,
}

/// Configurable bencode decoder.
///
/// The strict decoder only accepts canonical input, so re-encoding a decoded
/// value reproduces the original bytes. The lenient decoder tolerates
/// unsorted dictionaries emitted by some trackers.
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    key_order: KeyOrder,
    max_depth: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::strict()
    }
}

impl Decoder {
    pub fn strict() -> Self {
        Self {
            key_order: KeyOrder::Strict,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn lenient() -> Self {
        Self {
            key_order: KeyOrder::Any,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Overrides the container nesting limit.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Decodes exactly one top-level value from `input`.
    ///
    /// # Errors
    ///
    /// - `BencodeError::TrailingData` - If bytes remain after the first value
    /// - Any other `BencodeError` - If the input is not well-formed bencode
    pub fn decode(&self, input: &[u8]) -> Result<Value, BencodeError> {
        let mut cursor = Cursor::new(input, *self);
        let value = cursor.read_value()?;
        if cursor.position < input.len() {
            return Err(BencodeError::TrailingData {
                position: cursor.position,
            });
        }
        Ok(value)
    }
}

/// Decodes `input` with the strict decoder.
///
/// # Errors
///
/// - `BencodeError` - If the input is malformed, non-canonical or has trailing bytes
pub fn decode(input: &[u8]) -> Result<Value, BencodeError> {
    Decoder::strict().decode(input)
}

/// Locates the raw encoded bytes of `key` in a top-level dictionary.
///
/// Used to hash the `info` dictionary of a torrent exactly as it appears on
/// disk, independent of how the rest of the file orders its keys.
///
/// # Errors
///
/// - `BencodeError` - If `input` is not a well-formed dictionary
pub fn find_raw_entry(input: &[u8], key: &[u8]) -> Result<Option<Range<usize>>, BencodeError> {
    let mut cursor = Cursor::new(input, Decoder::lenient());
    cursor.expect(b'd')?;

    let mut found = None;
    while cursor.peek()? != b'e' {
        let entry_key = cursor.read_key()?;
        let start = cursor.position;
        cursor.read_value()?;
        if entry_key == key && found.is_none() {
            found = Some(start..cursor.position);
        }
    }
    cursor.position += 1;

    if cursor.position < input.len() {
        return Err(BencodeError::TrailingData {
            position: cursor.position,
        });
    }
    Ok(found)
}

struct Cursor<'a> {
    input: &'a [u8],
    position: usize,
    depth: usize,
    options: Decoder,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a [u8], options: Decoder) -> Self {
        Self {
            input,
            position: 0,
            depth: 0,
            options,
        }
    }

    fn peek(&self) -> Result<u8, BencodeError> {
        self.input
            .get(self.position)
            .copied()
            .ok_or(BencodeError::UnexpectedEnd {
                position: self.position,
            })
    }

    fn expect(&mut self, byte: u8) -> Result<(), BencodeError> {
        let found = self.peek()?;
        if found != byte {
            return Err(BencodeError::UnexpectedByte {
                position: self.position,
                byte: found,
            });
        }
        self.position += 1;
        Ok(())
    }

    fn read_value(&mut self) -> Result<Value, BencodeError> {
        match self.peek()? {
            b'i' => self.read_integer().map(Value::Integer),
            b'0'..=b'9' => self.read_bytes().map(|bytes| Value::Bytes(bytes.to_vec())),
            b'l' => self.read_list(),
            b'd' => self.read_dictionary(),
            byte => Err(BencodeError::UnexpectedByte {
                position: self.position,
                byte,
            }),
        }
    }

    /// Consumes digits (and an optional leading minus) up to `terminator`.
    fn read_number_text(
        &mut self,
        terminator: u8,
        allow_sign: bool,
    ) -> Result<(&'a str, usize), BencodeError> {
        let start = self.position;
        let input = self.input;
        let mut end = start;
        loop {
            let byte = *input
                .get(end)
                .ok_or(BencodeError::UnexpectedEnd { position: end })?;
            if byte == terminator {
                break;
            }
            let is_sign = allow_sign && byte == b'-' && end == start;
            if !byte.is_ascii_digit() && !is_sign {
                return Err(BencodeError::UnexpectedByte {
                    position: end,
                    byte,
                });
            }
            end += 1;
            if end - start > MAX_NUMBER_DIGITS {
                return Err(BencodeError::InvalidInteger { position: start });
            }
        }
        self.position = end + 1;

        // Only ASCII digits and '-' were admitted above.
        let text = std::str::from_utf8(&input[start..end])
            .map_err(|_| BencodeError::InvalidInteger { position: start })?;
        Ok((text, start))
    }

    fn read_integer(&mut self) -> Result<i64, BencodeError> {
        self.expect(b'i')?;
        let (text, start) = self.read_number_text(b'e', true)?;

        let digits = text.strip_prefix('-').unwrap_or(text);
        let canonical = !digits.is_empty()
            && (digits == "0" || !digits.starts_with('0'))
            && text != "-0";
        if !canonical {
            return Err(BencodeError::InvalidInteger { position: start });
        }

        text.parse::<i64>()
            .map_err(|_| BencodeError::InvalidInteger { position: start })
    }

    fn read_bytes(&mut self) -> Result<&'a [u8], BencodeError> {
        let (text, start) = self.read_number_text(b':', false)?;
        if text.is_empty() || (text.len() > 1 && text.starts_with('0')) {
            return Err(BencodeError::InvalidLength { position: start });
        }
        let length: usize = text
            .parse()
            .map_err(|_| BencodeError::InvalidLength { position: start })?;

        let end = self
            .position
            .checked_add(length)
            .filter(|end| *end <= self.input.len())
            .ok_or(BencodeError::UnexpectedEnd {
                position: self.input.len(),
            })?;
        let bytes = &self.input[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    fn read_key(&mut self) -> Result<&'a [u8], BencodeError> {
        if !self.peek()?.is_ascii_digit() {
            return Err(BencodeError::NonStringKey {
                position: self.position,
            });
        }
        self.read_bytes()
    }

    fn enter(&mut self) -> Result<(), BencodeError> {
        self.depth += 1;
        if self.depth > self.options.max_depth {
            return Err(BencodeError::NestingTooDeep {
                position: self.position,
            });
        }
        self.position += 1;
        Ok(())
    }

    fn read_list(&mut self) -> Result<Value, BencodeError> {
        self.enter()?;
        let mut items = Vec::new();
        while self.peek()? != b'e' {
            items.push(self.read_value()?);
        }
        self.position += 1;
        self.depth -= 1;
        Ok(Value::List(items))
    }

    fn read_dictionary(&mut self) -> Result<Value, BencodeError> {
        self.enter()?;
        let mut dict = Dictionary::new();
        let mut previous: Option<&[u8]> = None;

        while self.peek()? != b'e' {
            let key_position = self.position;
            let key = self.read_key()?;

            if let Some(previous) = previous {
                if key == previous || dict.contains_key(key) {
                    return Err(BencodeError::DuplicateKey {
                        position: key_position,
                    });
                }
                if self.options.key_order == KeyOrder::Strict && key < previous {
                    return Err(BencodeError::UnsortedKeys {
                        position: key_position,
                    });
                }
            }

            let value = self.read_value()?;
            dict.insert(key.to_vec(), value);
            previous = Some(key);
        }
        self.position += 1;
        self.depth -= 1;
        Ok(Value::Dictionary(dict))
    }
}

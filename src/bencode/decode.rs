use super::error::BencodeError;
use super::value::Value;
use bytes::Bytes;
use std::collections::BTreeMap;

/// KRPC messages are at most three levels deep; anything far beyond that is
/// an attempt to exhaust the stack.
const MAX_DEPTH: usize = 32;

/// Longest integer literal accepted, sign included (`i64::MIN` is 20 chars).
const MAX_INTEGER_DIGITS: usize = 20;

/// Decodes exactly one bencode value spanning the whole of `data`.
///
/// The input is copied once; every byte string in the result is a slice of
/// that copy.
///
/// # Errors
///
/// Fails on truncated input, non-canonical integers, non-string dictionary
/// keys, nesting deeper than 32 levels and trailing bytes after the value.
pub fn decode(data: &[u8]) -> Result<Value, BencodeError> {
    let mut decoder = Decoder {
        data: Bytes::copy_from_slice(data),
        pos: 0,
    };
    let value = decoder.value(0)?;

    match data.len() - decoder.pos {
        0 => Ok(value),
        rest => Err(BencodeError::TrailingData(rest)),
    }
}

struct Decoder {
    data: Bytes,
    pos: usize,
}

impl Decoder {
    fn peek(&self) -> Result<u8, BencodeError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(BencodeError::UnexpectedEof(self.pos))
    }

    fn value(&mut self, depth: usize) -> Result<Value, BencodeError> {
        if depth > MAX_DEPTH {
            return Err(BencodeError::NestingTooDeep);
        }

        match self.peek()? {
            b'i' => self.integer().map(Value::Integer),
            b'l' => self.list(depth),
            b'd' => self.dict(depth),
            b'0'..=b'9' => self.byte_string().map(Value::Bytes),
            byte => Err(BencodeError::UnexpectedByte {
                byte,
                offset: self.pos,
            }),
        }
    }

    /// Returns the bytes up to (not including) `delim` and moves past it.
    fn take_until(&mut self, delim: u8, limit: usize) -> Result<&[u8], BencodeError> {
        let start = self.pos;
        let window = &self.data[start..self.data.len().min(start + limit + 1)];

        match window.iter().position(|&b| b == delim) {
            Some(len) => {
                self.pos = start + len + 1;
                Ok(&self.data[start..start + len])
            }
            None if window.len() > limit => Err(BencodeError::UnexpectedByte {
                byte: window[limit],
                offset: start + limit,
            }),
            None => Err(BencodeError::UnexpectedEof(self.data.len())),
        }
    }

    fn integer(&mut self) -> Result<i64, BencodeError> {
        self.pos += 1;
        let digits = self.take_until(b'e', MAX_INTEGER_DIGITS)?;

        let text = std::str::from_utf8(digits)
            .map_err(|_| BencodeError::InvalidInteger("invalid utf8".into()))?;

        let unsigned = text.strip_prefix('-').unwrap_or(text);
        if !unsigned.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BencodeError::InvalidInteger(text.into()));
        }

        match text.as_bytes() {
            [] | [b'-'] => return Err(BencodeError::InvalidInteger("empty".into())),
            [b'-', b'0', ..] => return Err(BencodeError::InvalidInteger("negative zero".into())),
            [b'0', _, ..] => return Err(BencodeError::InvalidInteger("leading zeros".into())),
            _ => {}
        }

        text.parse()
            .map_err(|_| BencodeError::InvalidInteger(text.into()))
    }

    fn byte_string(&mut self) -> Result<Bytes, BencodeError> {
        let offset = self.pos;
        let digits = self.take_until(b':', MAX_INTEGER_DIGITS)?;

        if digits.is_empty()
            || !digits.iter().all(u8::is_ascii_digit)
            || (digits.len() > 1 && digits[0] == b'0')
        {
            return Err(BencodeError::InvalidStringLength(offset));
        }

        let len: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(BencodeError::InvalidStringLength(offset))?;

        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(BencodeError::UnexpectedEof(self.data.len()))?;

        let bytes = self.data.slice(self.pos..end);
        self.pos = end;
        Ok(bytes)
    }

    fn list(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.pos += 1;
        let mut items = Vec::new();

        while self.peek()? != b'e' {
            items.push(self.value(depth + 1)?);
        }

        self.pos += 1;
        Ok(Value::List(items))
    }

    fn dict(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.pos += 1;
        let mut entries = BTreeMap::new();

        while self.peek()? != b'e' {
            if !self.peek()?.is_ascii_digit() {
                return Err(BencodeError::NonStringKey);
            }
            let key = self.byte_string()?;
            let value = self.value(depth + 1)?;
            entries.insert(key, value);
        }

        self.pos += 1;
        Ok(Value::Dict(entries))
    }
}

//! Canonical little-endian wire codec.
//!
//! Consensus objects must serialize byte-identically on every node, so all
//! wire formats go through this hand-rolled codec rather than a general
//! serde backend. Integers are little-endian, variable-length byte strings
//! carry a `u32` length prefix, and decoding is strict: trailing bytes are
//! an error.

use thiserror::Error;

use crate::buf::Hash32;

/// Errors produced while decoding wire bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("{0} trailing bytes after decode")]
    TrailingBytes(usize),
    #[error("invalid {ty} tag {tag}")]
    InvalidTag { ty: &'static str, tag: u8 },
    #[error("length {len} exceeds limit {limit}")]
    OversizeLength { len: usize, limit: usize },
}

/// Growable output buffer for encoding.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u128(&mut self, v: u128) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_hash(&mut self, h: &Hash32) {
        self.buf.extend_from_slice(h.as_bytes());
    }

    /// Write a `u32` length prefix followed by the bytes.
    pub fn put_var_bytes(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.put_bytes(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over wire bytes for decoding.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEnd);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().expect("len 2")))
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("len 4")))
    }

    pub fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("len 8")))
    }

    pub fn u128(&mut self) -> Result<u128, CodecError> {
        Ok(u128::from_le_bytes(
            self.take(16)?.try_into().expect("len 16"),
        ))
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.take(n)
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        Ok(self.take(N)?.try_into().expect("fixed len"))
    }

    pub fn hash(&mut self) -> Result<Hash32, CodecError> {
        Ok(Hash32::new(self.array::<32>()?))
    }

    /// Read a `u32` length prefix followed by that many bytes.
    pub fn var_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    /// Fail if any input remains unconsumed.
    pub fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

/// A type with a canonical wire encoding.
pub trait Encodable {
    fn encode(&self, w: &mut Writer);

    fn to_wire_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode(&mut w);
        w.into_vec()
    }
}

/// A type decodable from its canonical wire encoding.
pub trait Decodable: Sized {
    fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError>;

    /// Decode from a complete buffer, rejecting trailing bytes.
    fn from_wire_bytes(buf: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(buf);
        let out = Self::decode(&mut r)?;
        r.finish()?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn reader_rejects_short_input() {
        let mut r = Reader::new(&[1, 2, 3]);
        assert_eq!(r.u64(), Err(CodecError::UnexpectedEnd));
    }

    #[test]
    fn finish_rejects_trailing() {
        let mut r = Reader::new(&[1, 2]);
        r.u8().unwrap();
        assert_eq!(r.finish(), Err(CodecError::TrailingBytes(1)));
    }

    proptest! {
        #[test]
        fn scalar_round_trip(a: u8, b: u16, c: u32, d: u64, e: u128, v in proptest::collection::vec(any::<u8>(), 0..64)) {
            let mut w = Writer::new();
            w.put_u8(a);
            w.put_u16(b);
            w.put_u32(c);
            w.put_u64(d);
            w.put_u128(e);
            w.put_var_bytes(&v);
            let buf = w.into_vec();

            let mut r = Reader::new(&buf);
            prop_assert_eq!(r.u8().unwrap(), a);
            prop_assert_eq!(r.u16().unwrap(), b);
            prop_assert_eq!(r.u32().unwrap(), c);
            prop_assert_eq!(r.u64().unwrap(), d);
            prop_assert_eq!(r.u128().unwrap(), e);
            prop_assert_eq!(r.var_bytes().unwrap(), &v[..]);
            prop_assert!(r.finish().is_ok());
        }
    }
}

//! Versioned binary codec.
//!
//! Every entity is wrapped in an envelope:
//!
//! ```text
//! +-----------+---------------+-------------------+----------------+
//! | struct_v  | struct_compat | body_len (u32 LE) | body ...       |
//! +-----------+---------------+-------------------+----------------+
//! ```
//!
//! `struct_v` is the schema version the writer used and `struct_compat` is the
//! oldest reader version that can interpret the body. Readers decode the
//! fields they know and skip whatever is left of `body_len`, so newer writers
//! can append fields without breaking older readers.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, warn};

const ENVELOPE_HEADER_LEN: usize = 6;

pub type DecodeResult<T> = Result<T, DecodeError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{type_name} payload requires reader version {required}, this reader supports {reader}")]
    VersionMismatch {
        type_name: &'static str,
        reader: u8,
        required: u8,
    },
    #[error("malformed payload: {reason}")]
    Malformed { reason: String },
}

impl DecodeError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            reason: reason.into(),
        }
    }

    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, DecodeError::VersionMismatch { .. })
    }
}

/// Peer capability bits negotiated alongside the schema version.
///
/// Only the address representation depends on them today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Features(u64);

impl Features {
    /// Peer understands the modern (versioned) address encoding.
    pub const MSG_ADDR2: u64 = 1 << 59;

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn legacy() -> Self {
        Self(0)
    }

    pub const fn modern() -> Self {
        Self(Self::MSG_ADDR2)
    }

    pub const fn has(self, bit: u64) -> bool {
        self.0 & bit == bit
    }
}

impl Default for Features {
    fn default() -> Self {
        Self::modern()
    }
}

pub trait Encode {
    fn encode(&self, enc: &mut Encoder);
}

pub trait Decode: Sized {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self>;
}

/// A top-level entity carrying its own schema history.
pub trait Versioned: Encode + Decode {
    const TYPE_NAME: &'static str;
    /// Schema version written by this implementation, and the highest it reads.
    const VERSION: u8;
    /// Oldest reader version able to interpret what this implementation writes.
    const COMPAT: u8;
}

pub struct Encoder {
    buf: Vec<u8>,
    features: Features,
}

impl Encoder {
    pub fn new(features: Features) -> Self {
        Self {
            buf: Vec::with_capacity(64),
            features,
        }
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a length-prefixed count. Counts that do not fit the u32 prefix
    /// assert in debug builds and clamp in release.
    pub fn put_len(&mut self, len: usize) {
        self.put_u32(wire_len(len));
    }

    pub fn encode<T: Encode + ?Sized>(&mut self, value: &T) {
        value.encode(self);
    }

    /// Wraps whatever `body` writes in a versioned envelope.
    pub fn versioned(&mut self, version: u8, compat: u8, body: impl FnOnce(&mut Self)) {
        debug_assert!(compat <= version);
        self.put_u8(version);
        self.put_u8(compat);
        let len_at = self.buf.len();
        self.put_u32(0);

        let body_start = self.buf.len();
        body(self);
        let body_len = wire_len(self.buf.len() - body_start);
        self.buf[len_at..len_at + 4].copy_from_slice(&body_len.to_le_bytes());
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Converts a count or body length to its u32 wire prefix.
///
/// Anything past `u32::MAX` trips a debug assertion. Release builds clamp
/// to `u32::MAX` instead. The clamped prefix disagrees with the bytes
/// written, so such a payload does not decode back to the encoded value.
fn wire_len(len: usize) -> u32 {
    debug_assert!(u32::try_from(len).is_ok(), "length {len} exceeds u32 prefix");
    u32::try_from(len).unwrap_or(u32::MAX)
}

pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(DecodeError::malformed(format!(
                "truncated: needed {len} bytes at offset {}, {} remaining",
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn get_u8(&mut self) -> DecodeResult<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn get_u16(&mut self) -> DecodeResult<u16> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn get_u32(&mut self) -> DecodeResult<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn get_u64(&mut self) -> DecodeResult<u64> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn get_len(&mut self) -> DecodeResult<usize> {
        Ok(self.get_u32()? as usize)
    }

    pub fn decode<T: Decode>(&mut self) -> DecodeResult<T> {
        T::decode(self)
    }

    /// Opens a versioned envelope and hands its body to `body` together with
    /// the writer's `struct_v`. Body bytes `body` leaves unread are skipped.
    pub fn versioned<T>(
        &mut self,
        type_name: &'static str,
        reader_version: u8,
        body: impl FnOnce(&mut Decoder<'a>, u8) -> DecodeResult<T>,
    ) -> DecodeResult<T> {
        if self.remaining() < ENVELOPE_HEADER_LEN {
            return Err(DecodeError::malformed(format!(
                "{type_name} envelope header truncated ({} bytes remaining)",
                self.remaining()
            )));
        }
        let struct_v = self.get_u8()?;
        let struct_compat = self.get_u8()?;
        let body_len = self.get_len()?;

        if struct_compat > reader_version {
            warn!(
                "Rejecting {} payload: struct_compat {} exceeds reader version {}",
                type_name, struct_compat, reader_version
            );
            return Err(DecodeError::VersionMismatch {
                type_name,
                reader: reader_version,
                required: struct_compat,
            });
        }

        if self.remaining() < body_len {
            return Err(DecodeError::malformed(format!(
                "{type_name} body declares {body_len} bytes but only {} remain",
                self.remaining()
            )));
        }
        let body_bytes = self.take(body_len)?;

        let mut inner = Decoder::new(body_bytes);
        let value = body(&mut inner, struct_v).map_err(|err| match err {
            DecodeError::Malformed { reason } => {
                DecodeError::malformed(format!("{type_name} v{struct_v}: {reason}"))
            }
            other => other,
        })?;

        if inner.remaining() > 0 {
            debug!(
                "Skipping {} unknown trailing bytes of {} v{} (reader v{})",
                inner.remaining(),
                type_name,
                struct_v,
                reader_version
            );
        }

        Ok(value)
    }
}

impl Encode for u8 {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u8(*self);
    }
}

impl Decode for u8 {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        dec.get_u8()
    }
}

impl Encode for u32 {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u32(*self);
    }
}

impl Decode for u32 {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        dec.get_u32()
    }
}

impl Encode for u64 {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u64(*self);
    }
}

impl Decode for u64 {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        dec.get_u64()
    }
}

impl Encode for str {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_len(self.len());
        enc.put_bytes(self.as_bytes());
    }
}

impl Encode for String {
    fn encode(&self, enc: &mut Encoder) {
        self.as_str().encode(enc);
    }
}

impl Decode for String {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        let len = dec.get_len()?;
        let bytes = dec.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| DecodeError::malformed(format!("invalid utf-8 in string: {e}")))
    }
}

impl<K: Encode, V: Encode> Encode for BTreeMap<K, V> {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_len(self.len());
        for (key, value) in self {
            key.encode(enc);
            value.encode(enc);
        }
    }
}

impl<K: Decode + Ord, V: Decode> Decode for BTreeMap<K, V> {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        let count = dec.get_len()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = K::decode(dec)?;
            let value = V::decode(dec)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

/// Encodes a top-level value.
pub fn encode_to_vec<T: Encode + ?Sized>(value: &T, features: Features) -> Vec<u8> {
    let mut enc = Encoder::new(features);
    value.encode(&mut enc);
    enc.into_bytes()
}

/// Decodes a top-level value, rejecting stray bytes after it.
pub fn decode_from_slice<T: Decode>(bytes: &[u8]) -> DecodeResult<T> {
    let mut dec = Decoder::new(bytes);
    let value = T::decode(&mut dec)?;
    if dec.remaining() > 0 {
        return Err(DecodeError::malformed(format!(
            "{} stray bytes after end of value",
            dec.remaining()
        )));
    }
    Ok(value)
}

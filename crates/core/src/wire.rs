//! Binary stream codec for transporting and storing evaluation results
//!
//! Values are written big-endian. Strings and sequences carry a `u32` length
//! prefix, `usize` values travel as `u64`, floats travel as their IEEE-754
//! bit pattern so that a decoded value is bit-identical to the encoded one,
//! and optional values carry a one-byte presence flag.

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Types that can write themselves to a [`StreamOutput`]
pub trait Writeable {
    fn write_to(&self, out: &mut StreamOutput);
}

/// Types that can be read back from a [`StreamInput`] without extra context
pub trait Readable: Sized {
    fn read_from(input: &mut StreamInput) -> Result<Self>;
}

/// Growable output buffer
#[derive(Debug, Default)]
pub struct StreamOutput {
    buf: BytesMut,
}

impl StreamOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    pub fn write_usize(&mut self, value: usize) {
        self.buf.put_u64(value as u64);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_u32(value.to_bits());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.put_u64(value.to_bits());
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_len(value.len());
        self.buf.put_slice(value.as_bytes());
    }

    /// Writes a sequence length prefix
    ///
    /// Lengths are encoded as `u32`, so strings and sequences are limited to
    /// `u32::MAX` elements. Callers must stay within that limit: longer
    /// lengths panic in debug builds and are saturated in release builds.
    pub fn write_len(&mut self, len: usize) {
        debug_assert!(
            len <= u32::MAX as usize,
            "length {len} exceeds the u32 wire limit"
        );
        let len = u32::try_from(len).unwrap_or(u32::MAX);
        self.buf.put_u32(len);
    }

    pub fn write_option<T, F>(&mut self, value: Option<&T>, write: F)
    where
        T: ?Sized,
        F: FnOnce(&mut Self, &T),
    {
        match value {
            Some(v) => {
                self.write_bool(true);
                write(self, v);
            }
            None => self.write_bool(false),
        }
    }

    pub fn write_seq<'a, T, I>(&mut self, items: I)
    where
        T: Writeable + 'a,
        I: IntoIterator<Item = &'a T>,
        I::IntoIter: ExactSizeIterator,
    {
        let items = items.into_iter();
        self.write_len(items.len());
        for item in items {
            item.write_to(self);
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Freezes the buffer into immutable bytes
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Cursor over an immutable input buffer
#[derive(Debug, Clone)]
pub struct StreamInput {
    buf: Bytes,
}

impl StreamInput {
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self { buf: buf.into() }
    }

    fn ensure(&self, needed: usize, what: &str) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(Error::wire(format!(
                "Unexpected end of input reading {what}: need {needed} bytes, {} remaining",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1, "u8")?;
        Ok(self.buf.get_u8())
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::wire(format!("Invalid boolean flag {other}"))),
        }
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4, "u32")?;
        Ok(self.buf.get_u32())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4, "i32")?;
        Ok(self.buf.get_i32())
    }

    pub fn read_usize(&mut self) -> Result<usize> {
        self.ensure(8, "u64")?;
        let value = self.buf.get_u64();
        usize::try_from(value)
            .map_err(|_| Error::wire(format!("Value {value} does not fit in usize")))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.ensure(4, "f32")?;
        Ok(f32::from_bits(self.buf.get_u32()))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.ensure(8, "f64")?;
        Ok(f64::from_bits(self.buf.get_u64()))
    }

    /// Reads a sequence length prefix, rejecting lengths the remaining
    /// input cannot possibly hold
    pub fn read_len(&mut self) -> Result<usize> {
        let len = self.read_u32()? as usize;
        if len > self.buf.remaining() {
            return Err(Error::wire(format!(
                "Declared length {len} exceeds {} remaining bytes",
                self.buf.remaining()
            )));
        }
        Ok(len)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let raw = self.buf.split_to(len);
        String::from_utf8(raw.to_vec())
            .map_err(|e| Error::wire(format!("Invalid UTF-8 in string: {e}")))
    }

    pub fn read_option<T, F>(&mut self, read: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        if self.read_bool()? {
            read(self).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn read_seq<T, F>(&mut self, mut read: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        let len = self.read_len()?;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(read(self)?);
        }
        Ok(items)
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Fails if any bytes are left after a complete top-level value
    pub fn finish(self) -> Result<()> {
        if self.buf.has_remaining() {
            return Err(Error::wire(format!(
                "{} trailing bytes after value",
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}

/// Encodes a value into a standalone buffer
pub fn to_bytes<T: Writeable + ?Sized>(value: &T) -> Bytes {
    let mut out = StreamOutput::new();
    value.write_to(&mut out);
    out.into_bytes()
}

/// Decodes a standalone buffer holding exactly one value
pub fn from_bytes<T: Readable>(bytes: impl Into<Bytes>) -> Result<T> {
    let mut input = StreamInput::new(bytes);
    let value = T::read_from(&mut input)?;
    input.finish()?;
    Ok(value)
}

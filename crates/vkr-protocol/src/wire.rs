//! Little-endian primitive codec shared by commands and replies.
//!
//! Every read is checked against the bytes that remain; array counts are
//! validated against `count * min_element_size` before anything is allocated,
//! so a hostile count can never trigger an oversized allocation or a read past
//! the end of the buffer.

use crate::error::DecodeError;
use crate::object::{ObjectId, ObjectType};

pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Consume everything that is left.
    pub fn skip_rest(&mut self) {
        self.pos = self.buf.len();
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        match self.read_u32()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidValue {
                field: "bool",
                value: u64::from(other),
            }),
        }
    }

    /// A guest object id that must be present.
    pub fn read_id(&mut self) -> Result<ObjectId, DecodeError> {
        self.read_u64()
    }

    /// A guest object id where zero means "no object".
    pub fn read_optional_id(&mut self) -> Result<Option<ObjectId>, DecodeError> {
        let id = self.read_u64()?;
        Ok((id != 0).then_some(id))
    }

    pub fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        self.take_array()
    }

    /// Read an element count and check that `count` elements of at least
    /// `min_element_size` bytes each can still fit in the buffer.
    pub fn read_count(&mut self, min_element_size: usize) -> Result<usize, DecodeError> {
        let offset = self.pos;
        let count = self.read_u32()? as usize;
        let fits = count
            .checked_mul(min_element_size.max(1))
            .is_some_and(|bytes| bytes <= self.remaining());
        if !fits {
            return Err(DecodeError::CountTooLarge {
                offset,
                count,
                remaining: self.remaining(),
            });
        }
        Ok(count)
    }

    pub fn read_array<T>(
        &mut self,
        min_element_size: usize,
        mut read: impl FnMut(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<Vec<T>, DecodeError> {
        let count = self.read_count(min_element_size)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(read(self)?);
        }
        Ok(out)
    }

    pub fn read_ids(&mut self) -> Result<Vec<ObjectId>, DecodeError> {
        self.read_array(8, Self::read_id)
    }

    pub fn read_u32s(&mut self) -> Result<Vec<u32>, DecodeError> {
        self.read_array(4, Self::read_u32)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_count(1)?;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let offset = self.pos;
        let len = self.read_count(1)?;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8 { offset })
    }

    pub fn read_strings(&mut self) -> Result<Vec<String>, DecodeError> {
        self.read_array(4, Self::read_string)
    }
}

#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u32(u32::from(value));
    }

    pub fn write_id(&mut self, id: ObjectId) {
        self.write_u64(id);
    }

    pub fn write_optional_id(&mut self, id: Option<ObjectId>) {
        self.write_u64(id.unwrap_or(0));
    }

    pub fn write_fixed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_count(&mut self, count: usize) {
        self.write_u32(count as u32);
    }

    pub fn write_array<T>(&mut self, items: &[T], mut write: impl FnMut(&mut Self, &T)) {
        self.write_count(items.len());
        for item in items {
            write(self, item);
        }
    }

    pub fn write_ids(&mut self, ids: &[ObjectId]) {
        self.write_array(ids, |w, id| w.write_id(*id));
    }

    pub fn write_u32s(&mut self, values: &[u32]) {
        self.write_array(values, |w, v| w.write_u32(*v));
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_count(bytes.len());
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    pub fn write_strings(&mut self, values: &[String]) {
        self.write_array(values, |w, s| w.write_string(s));
    }
}

/// A value with a fixed little-endian wire layout.
pub trait Wire: Sized {
    /// Smallest encoded size, used to bound array counts before decoding.
    const MIN_SIZE: usize;

    fn decode(r: &mut WireReader<'_>) -> Result<Self, DecodeError>;
    fn encode(&self, w: &mut WireWriter);
}

impl Wire for u8 {
    const MIN_SIZE: usize = 1;

    fn decode(r: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        Ok(r.read_fixed::<1>()?[0])
    }

    fn encode(&self, w: &mut WireWriter) {
        w.write_fixed(&[*self]);
    }
}

impl Wire for u32 {
    const MIN_SIZE: usize = 4;

    fn decode(r: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        r.read_u32()
    }

    fn encode(&self, w: &mut WireWriter) {
        w.write_u32(*self);
    }
}

impl Wire for i32 {
    const MIN_SIZE: usize = 4;

    fn decode(r: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        r.read_i32()
    }

    fn encode(&self, w: &mut WireWriter) {
        w.write_i32(*self);
    }
}

impl Wire for u64 {
    const MIN_SIZE: usize = 8;

    fn decode(r: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        r.read_u64()
    }

    fn encode(&self, w: &mut WireWriter) {
        w.write_u64(*self);
    }
}

impl Wire for f32 {
    const MIN_SIZE: usize = 4;

    fn decode(r: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        r.read_f32()
    }

    fn encode(&self, w: &mut WireWriter) {
        w.write_f32(*self);
    }
}

impl Wire for bool {
    const MIN_SIZE: usize = 4;

    fn decode(r: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        r.read_bool()
    }

    fn encode(&self, w: &mut WireWriter) {
        w.write_bool(*self);
    }
}

/// Optional object id; zero on the wire.
impl Wire for Option<ObjectId> {
    const MIN_SIZE: usize = 8;

    fn decode(r: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        r.read_optional_id()
    }

    fn encode(&self, w: &mut WireWriter) {
        w.write_optional_id(*self);
    }
}

impl Wire for ObjectType {
    const MIN_SIZE: usize = 4;

    fn decode(r: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        let raw = r.read_u32()?;
        ObjectType::from_raw(raw).ok_or(DecodeError::InvalidValue {
            field: "object_type",
            value: u64::from(raw),
        })
    }

    fn encode(&self, w: &mut WireWriter) {
        w.write_u32(self.as_raw());
    }
}

impl Wire for String {
    const MIN_SIZE: usize = 4;

    fn decode(r: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        r.read_string()
    }

    fn encode(&self, w: &mut WireWriter) {
        w.write_string(self);
    }
}

impl<T: Wire> Wire for Vec<T> {
    const MIN_SIZE: usize = 4;

    fn decode(r: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        r.read_array(T::MIN_SIZE, T::decode)
    }

    fn encode(&self, w: &mut WireWriter) {
        w.write_array(self, |w, item| item.encode(w));
    }
}

impl<const N: usize> Wire for [u32; N] {
    const MIN_SIZE: usize = 4 * N;

    fn decode(r: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        let mut out = [0u32; N];
        for value in out.iter_mut() {
            *value = r.read_u32()?;
        }
        Ok(out)
    }

    fn encode(&self, w: &mut WireWriter) {
        for value in self {
            w.write_u32(*value);
        }
    }
}

impl<const N: usize> Wire for [i32; N] {
    const MIN_SIZE: usize = 4 * N;

    fn decode(r: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        let mut out = [0i32; N];
        for value in out.iter_mut() {
            *value = r.read_i32()?;
        }
        Ok(out)
    }

    fn encode(&self, w: &mut WireWriter) {
        for value in self {
            w.write_i32(*value);
        }
    }
}

impl<const N: usize> Wire for [u8; N] {
    const MIN_SIZE: usize = N;

    fn decode(r: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        r.read_fixed()
    }

    fn encode(&self, w: &mut WireWriter) {
        w.write_fixed(self);
    }
}

/// Declare a record whose wire layout is its fields in declaration order.
#[macro_export]
macro_rules! wire_struct {
    ($(
        $(#[$meta:meta])*
        pub struct $name:ident {
            $($(#[$fmeta:meta])* pub $field:ident : $ty:ty,)*
        }
    )*) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            $($(#[$fmeta])* pub $field: $ty,)*
        }

        impl $crate::wire::Wire for $name {
            const MIN_SIZE: usize = 0 $(+ <$ty as $crate::wire::Wire>::MIN_SIZE)*;

            fn decode(
                r: &mut $crate::wire::WireReader<'_>,
            ) -> Result<Self, $crate::error::DecodeError> {
                Ok(Self {
                    $($field: <$ty as $crate::wire::Wire>::decode(r)?,)*
                })
            }

            fn encode(&self, w: &mut $crate::wire::WireWriter) {
                $($crate::wire::Wire::encode(&self.$field, w);)*
            }
        }
    )*};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_larger_than_buffer_is_rejected_before_allocation() {
        let mut w = WireWriter::new();
        w.write_u32(u32::MAX);
        w.write_u64(7);
        let bytes = w.into_bytes();
        let mut r = WireReader::new(&bytes);
        assert!(matches!(
            r.read_ids(),
            Err(DecodeError::CountTooLarge { count, .. }) if count == u32::MAX as usize
        ));
    }

    #[test]
    fn bool_rejects_values_other_than_zero_and_one() {
        let bytes = 2u32.to_le_bytes();
        let mut r = WireReader::new(&bytes);
        assert!(matches!(r.read_bool(), Err(DecodeError::InvalidValue { .. })));
    }

    #[test]
    fn optional_id_maps_zero_to_none() {
        let mut w = WireWriter::new();
        w.write_optional_id(None);
        w.write_optional_id(Some(9));
        let bytes = w.into_bytes();
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_optional_id().ok(), Some(None));
        assert_eq!(r.read_optional_id().ok(), Some(Some(9)));
        assert_eq!(r.remaining(), 0);
    }
}

//! Codecs for strings, optionals, boxes, vectors, fixed arrays and maps.

use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};
use std::io::{Read, Write};

use super::{BinaryCodec, MAX_PREALLOCATED_ITEMS, TriviallySerializable};
use crate::error::{Result, StepcodeError};
use crate::io::{CodedInputStream, CodedOutputStream};

/// Reads a varint element count and converts it to `usize`.
pub(crate) fn read_count<R: Read>(stream: &mut CodedInputStream<R>) -> Result<usize> {
    let count = stream.read_varint_u64()?;
    usize::try_from(count)
        .map_err(|_| StepcodeError::Format(format!("count {count} does not fit in memory")))
}

impl BinaryCodec for String {
    fn write<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()> {
        stream.write_varint_u64(self.len() as u64)?;
        stream.write_bytes(self.as_bytes())
    }

    fn read<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self> {
        let len = read_count(stream)?;
        let bytes = u8::read_vec(len, stream)?;
        String::from_utf8(bytes).map_err(|_| StepcodeError::format("string is not valid UTF-8"))
    }
}

impl<T: BinaryCodec> BinaryCodec for Option<T> {
    fn write<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()> {
        match self {
            Some(value) => {
                stream.write_byte(1)?;
                value.write(stream)
            }
            None => stream.write_byte(0),
        }
    }

    fn read<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self> {
        match stream.read_byte()? {
            0 => Ok(None),
            1 => T::read(stream).map(Some),
            other => Err(StepcodeError::Format(format!("invalid optional flag {other}"))),
        }
    }
}

/// Recursive records hold their children behind a `Box`; the box itself has no
/// wire representation.
impl<T: BinaryCodec> BinaryCodec for Box<T> {
    fn write<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()> {
        (**self).write(stream)
    }

    fn read<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self> {
        T::read(stream).map(Box::new)
    }
}

/// The unit type encodes to nothing. Used as the payload of valueless
/// alternatives and as the item type of streams that only carry a count.
impl BinaryCodec for () {
    fn write<W: Write>(&self, _stream: &mut CodedOutputStream<W>) -> Result<()> {
        Ok(())
    }

    fn read<R: Read>(_stream: &mut CodedInputStream<R>) -> Result<Self> {
        Ok(())
    }
}

impl<T: BinaryCodec> BinaryCodec for Vec<T> {
    fn write<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()> {
        stream.write_varint_u64(self.len() as u64)?;
        T::write_slice(self, stream)
    }

    fn read<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self> {
        let count = read_count(stream)?;
        T::read_vec(count, stream)
    }
}

impl<T: BinaryCodec, const N: usize> BinaryCodec for [T; N] {
    fn write<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()> {
        T::write_slice(self, stream)
    }

    fn read<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self> {
        into_array(T::read_vec(N, stream)?)
    }

    fn write_slice<W: Write>(items: &[Self], stream: &mut CodedOutputStream<W>) -> Result<()> {
        T::write_slice(items.as_flattened(), stream)
    }

    fn read_vec<R: Read>(count: usize, stream: &mut CodedInputStream<R>) -> Result<Vec<Self>> {
        let total = count
            .checked_mul(N)
            .ok_or_else(|| StepcodeError::format("array count overflows"))?;
        let mut flat = T::read_vec(total, stream)?.into_iter();
        let mut out = Vec::with_capacity(count.min(MAX_PREALLOCATED_ITEMS));
        for _ in 0..count {
            out.push(into_array(flat.by_ref().take(N).collect())?);
        }
        Ok(out)
    }
}

impl<T: TriviallySerializable, const N: usize> TriviallySerializable for [T; N] {}

fn into_array<T, const N: usize>(items: Vec<T>) -> Result<[T; N]> {
    let len = items.len();
    items
        .try_into()
        .map_err(|_| StepcodeError::Format(format!("expected {N} array elements, found {len}")))
}

impl<K, V, S> BinaryCodec for HashMap<K, V, S>
where
    K: BinaryCodec + Eq + Hash,
    V: BinaryCodec,
    S: BuildHasher + Default,
{
    fn write<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()> {
        stream.write_varint_u64(self.len() as u64)?;
        for (key, value) in self {
            key.write(stream)?;
            value.write(stream)?;
        }
        Ok(())
    }

    fn read<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self> {
        let count = read_count(stream)?;
        let mut map =
            HashMap::with_capacity_and_hasher(count.min(MAX_PREALLOCATED_ITEMS), S::default());
        for _ in 0..count {
            let key = K::read(stream)?;
            let value = V::read(stream)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<K, V> BinaryCodec for BTreeMap<K, V>
where
    K: BinaryCodec + Ord,
    V: BinaryCodec,
{
    fn write<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()> {
        stream.write_varint_u64(self.len() as u64)?;
        for (key, value) in self {
            key.write(stream)?;
            value.write(stream)?;
        }
        Ok(())
    }

    fn read<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self> {
        let count = read_count(stream)?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = K::read(stream)?;
            let value = V::read(stream)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

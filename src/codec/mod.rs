//! Encoders and decoders for every value type that can appear in a protocol step.
//!
//! All encodings are built from the primitives in [`crate::io`]:
//!
//! | Type | Encoding |
//! |---|---|
//! | `bool`, `u8`, `i8` | one raw byte |
//! | `u16`..`u64`, `usize` | unsigned varint |
//! | `i16`..`i64`, `isize` | zig-zag varint |
//! | `f32`, `f64`, [`Complex32`], [`Complex64`] | fixed little-endian IEEE-754 |
//! | `String` | varint byte length + UTF-8 |
//! | `Option<T>` | presence byte, then the payload if present |
//! | `Vec<T>`, maps | varint count + elements (maps as key/value pairs) |
//! | `[T; N]` | `N` elements, no count |
//!
//! ## Bulk Fast Path
//!
//! [`BinaryCodec::write_slice`] and [`BinaryCodec::read_vec`] encode runs of
//! values. They default to one call per element. Types implementing
//! [`TriviallySerializable`] override them with a single byte copy of the
//! in-memory representation, which by construction is the same byte sequence
//! the per-element path produces. Readers therefore never need to know which
//! path produced the data.

pub mod collections;
pub mod ndarray;
pub mod union;

use std::io::{Read, Write};
use std::mem::size_of;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{Result, StepcodeError};
use crate::io::{CodedInputStream, CodedOutputStream};

pub use ndarray::{DynamicNdArray, NdArray};
pub use union::{read_union_index, write_union_index};

/// Target size of a single bulk read, in bytes.
///
/// Counts come from the data itself, so a corrupt count must not translate
/// into one huge allocation before the truncation is noticed.
const BULK_READ_CHUNK_BYTES: usize = 64 * 1024;

/// Upper bound on speculative `Vec` pre-allocation for per-element reads.
pub(crate) const MAX_PREALLOCATED_ITEMS: usize = 4096;

/// A type with a binary encoding.
///
/// Implemented for primitives and standard containers here, and for user
/// records, unions and enums by `#[derive(BinaryCodec)]`.
pub trait BinaryCodec: Sized {
    /// Encodes `self`.
    fn write<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()>;

    /// Decodes a value.
    fn read<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self>;

    /// Encodes a run of values back to back, without a count.
    fn write_slice<W: Write>(items: &[Self], stream: &mut CodedOutputStream<W>) -> Result<()> {
        for item in items {
            item.write(stream)?;
        }
        Ok(())
    }

    /// Decodes `count` values written by [`write_slice`](Self::write_slice).
    fn read_vec<R: Read>(count: usize, stream: &mut CodedInputStream<R>) -> Result<Vec<Self>> {
        let mut out = Vec::with_capacity(count.min(MAX_PREALLOCATED_ITEMS));
        for _ in 0..count {
            out.push(Self::read(stream)?);
        }
        Ok(out)
    }
}

/// A fixed-layout type whose in-memory bytes on a little-endian target are
/// exactly its per-field encoding.
///
/// Only compositions of 1-byte integers, IEEE floats and complex numbers with
/// no padding qualify. `#[derive(BinaryCodec)]` with
/// `#[stepcode(trivially_serializable)]` checks that every field implements
/// this trait, and `zerocopy` checks the layout.
pub trait TriviallySerializable:
    BinaryCodec + IntoBytes + FromBytes + Immutable + KnownLayout + Copy
{
}

/// Writes `items` with one byte copy.
///
/// Falls back to per-element encoding on big-endian targets, where the
/// in-memory representation differs from the wire format.
pub fn write_trivial_slice<T, W>(items: &[T], stream: &mut CodedOutputStream<W>) -> Result<()>
where
    T: TriviallySerializable,
    W: Write,
{
    if cfg!(target_endian = "little") {
        stream.write_bytes(items.as_bytes())
    } else {
        for item in items {
            item.write(stream)?;
        }
        Ok(())
    }
}

/// Reads `count` values with bulk byte copies.
pub fn read_trivial_vec<T, R>(count: usize, stream: &mut CodedInputStream<R>) -> Result<Vec<T>>
where
    T: TriviallySerializable,
    R: Read,
{
    if !cfg!(target_endian = "little") {
        let mut out = Vec::with_capacity(count.min(MAX_PREALLOCATED_ITEMS));
        for _ in 0..count {
            out.push(T::read(stream)?);
        }
        return Ok(out);
    }

    let chunk = (BULK_READ_CHUNK_BYTES / size_of::<T>().max(1)).max(1);
    let mut out: Vec<T> = Vec::with_capacity(count.min(chunk));
    let mut remaining = count;
    while remaining > 0 {
        let n = remaining.min(chunk);
        let start = out.len();
        out.resize(start + n, T::new_zeroed());
        stream.read_bytes(out[start..].as_mut_bytes())?;
        remaining -= n;
    }
    Ok(out)
}

// --- Raw byte types ---

impl BinaryCodec for u8 {
    fn write<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()> {
        stream.write_byte(*self)
    }

    fn read<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self> {
        stream.read_byte()
    }

    fn write_slice<W: Write>(items: &[Self], stream: &mut CodedOutputStream<W>) -> Result<()> {
        write_trivial_slice(items, stream)
    }

    fn read_vec<R: Read>(count: usize, stream: &mut CodedInputStream<R>) -> Result<Vec<Self>> {
        read_trivial_vec(count, stream)
    }
}

impl BinaryCodec for i8 {
    fn write<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()> {
        stream.write_byte(*self as u8)
    }

    fn read<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self> {
        stream.read_byte().map(|b| b as i8)
    }

    fn write_slice<W: Write>(items: &[Self], stream: &mut CodedOutputStream<W>) -> Result<()> {
        write_trivial_slice(items, stream)
    }

    fn read_vec<R: Read>(count: usize, stream: &mut CodedInputStream<R>) -> Result<Vec<Self>> {
        read_trivial_vec(count, stream)
    }
}

impl TriviallySerializable for u8 {}
impl TriviallySerializable for i8 {}

impl BinaryCodec for bool {
    fn write<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()> {
        stream.write_byte(u8::from(*self))
    }

    fn read<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self> {
        match stream.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(StepcodeError::Format(format!("invalid boolean value {other}"))),
        }
    }
}

// --- Varint integers ---

macro_rules! impl_unsigned {
    ($($t:ty),*) => {$(
        impl BinaryCodec for $t {
            fn write<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()> {
                stream.write_varint_u64(*self as u64)
            }

            fn read<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self> {
                let value = stream.read_varint_u64()?;
                <$t>::try_from(value).map_err(|_| {
                    StepcodeError::Format(format!(
                        "value {value} out of range for {}", stringify!($t)
                    ))
                })
            }
        }
    )*};
}

macro_rules! impl_signed {
    ($($t:ty),*) => {$(
        impl BinaryCodec for $t {
            fn write<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()> {
                stream.write_varint_i64(*self as i64)
            }

            fn read<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self> {
                let value = stream.read_varint_i64()?;
                <$t>::try_from(value).map_err(|_| {
                    StepcodeError::Format(format!(
                        "value {value} out of range for {}", stringify!($t)
                    ))
                })
            }
        }
    )*};
}

impl_unsigned!(u16, u32, u64, usize);
impl_signed!(i16, i32, i64, isize);

// --- Floating point ---

impl BinaryCodec for f32 {
    fn write<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()> {
        stream.write_f32(*self)
    }

    fn read<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self> {
        stream.read_f32()
    }

    fn write_slice<W: Write>(items: &[Self], stream: &mut CodedOutputStream<W>) -> Result<()> {
        write_trivial_slice(items, stream)
    }

    fn read_vec<R: Read>(count: usize, stream: &mut CodedInputStream<R>) -> Result<Vec<Self>> {
        read_trivial_vec(count, stream)
    }
}

impl BinaryCodec for f64 {
    fn write<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()> {
        stream.write_f64(*self)
    }

    fn read<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self> {
        stream.read_f64()
    }

    fn write_slice<W: Write>(items: &[Self], stream: &mut CodedOutputStream<W>) -> Result<()> {
        write_trivial_slice(items, stream)
    }

    fn read_vec<R: Read>(count: usize, stream: &mut CodedInputStream<R>) -> Result<Vec<Self>> {
        read_trivial_vec(count, stream)
    }
}

impl TriviallySerializable for f32 {}
impl TriviallySerializable for f64 {}

/// A complex number of two single-precision floats, real part first.
#[derive(Debug, Clone, Copy, PartialEq, Default, IntoBytes, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Complex32 {
    /// Real part.
    pub re: f32,
    /// Imaginary part.
    pub im: f32,
}

/// A complex number of two double-precision floats, real part first.
#[derive(Debug, Clone, Copy, PartialEq, Default, IntoBytes, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Complex64 {
    /// Real part.
    pub re: f64,
    /// Imaginary part.
    pub im: f64,
}

macro_rules! impl_complex {
    ($t:ident, $f:ty, $write:ident, $read:ident) => {
        impl $t {
            /// Builds a complex number from its parts.
            pub const fn new(re: $f, im: $f) -> Self {
                Self { re, im }
            }
        }

        impl BinaryCodec for $t {
            fn write<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()> {
                stream.$write(self.re)?;
                stream.$write(self.im)
            }

            fn read<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self> {
                let re = stream.$read()?;
                let im = stream.$read()?;
                Ok(Self { re, im })
            }

            fn write_slice<W: Write>(items: &[Self], stream: &mut CodedOutputStream<W>) -> Result<()> {
                write_trivial_slice(items, stream)
            }

            fn read_vec<R: Read>(count: usize, stream: &mut CodedInputStream<R>) -> Result<Vec<Self>> {
                read_trivial_vec(count, stream)
            }
        }

        impl TriviallySerializable for $t {}
    };
}

impl_complex!(Complex32, f32, write_f32, read_f32);
impl_complex!(Complex64, f64, write_f64, read_f64);

/// Encodes a value into a fresh byte vector.
pub fn to_bytes<T: BinaryCodec>(value: &T) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut stream = CodedOutputStream::new(&mut out, crate::constants::DEFAULT_BUFFER_SIZE);
        value.write(&mut stream)?;
        stream.flush()?;
    }
    Ok(out)
}

/// Decodes a value from `bytes`, requiring every byte to be consumed.
pub fn from_bytes<T: BinaryCodec>(bytes: &[u8]) -> Result<T> {
    let mut stream = CodedInputStream::new(bytes, crate::constants::DEFAULT_BUFFER_SIZE);
    let value = T::read(&mut stream)?;
    stream.verify_finished()?;
    Ok(value)
}

//! Discriminant helpers for tagged unions.
//!
//! A union value is encoded as the 0-based index of its alternative (varint)
//! followed by that alternative's payload. Valueless alternatives, such as the
//! "absent" case of a nullable union, carry no payload.
//!
//! `#[derive(BinaryCodec)]` on an enum with payload-carrying variants emits
//! calls to these helpers. Readers decoding data from an older schema whose
//! alternatives were reordered translate the index with
//! [`crate::schema::UnionRemap`] instead of matching on it directly.

use std::io::{Read, Write};

use crate::error::{Result, StepcodeError};
use crate::io::{CodedInputStream, CodedOutputStream};

/// Writes the alternative index of a union value.
pub fn write_union_index<W: Write>(stream: &mut CodedOutputStream<W>, index: usize) -> Result<()> {
    stream.write_varint_u64(index as u64)
}

/// Reads an alternative index, rejecting anything outside `0..alternatives`.
pub fn read_union_index<R: Read>(
    stream: &mut CodedInputStream<R>,
    alternatives: usize,
) -> Result<usize> {
    let index = stream.read_varint_u64()?;
    match usize::try_from(index) {
        Ok(i) if i < alternatives => Ok(i),
        _ => Err(StepcodeError::Format(format!(
            "union index {index} out of range for {alternatives} alternatives"
        ))),
    }
}

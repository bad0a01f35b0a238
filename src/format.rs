//! Defines the physical binary layout of stepcode streams.
//!
//! # Layout
//! Every stream opens with a preamble identifying the format and the schema
//! the payload was written with, followed by one encoding per protocol step:
//!
//! `[Magic (5)] [Format Version (u32 LE)] [Schema (varint len + UTF-8)] [Payload ...]`
//!
//! Indexed streams append a trailing section after the payload; see
//! [`crate::index`] for its layout.

use std::io::{Read, Write};

use crate::error::{Result, StepcodeError};
use crate::io::{CodedInputStream, CodedOutputStream};

/// Magic bytes identifying the stream format: "yardl".
pub const MAGIC_BYTES: [u8; 5] = *b"yardl";

/// The only format version this crate reads and writes.
pub const FORMAT_VERSION: u32 = 1;

/// Upper bound on the schema text accepted from a header.
///
/// Guards against allocating gigabytes because of a corrupt length prefix.
pub const MAX_SCHEMA_LEN: u64 = 16 * 1024 * 1024;

/// The decoded stream preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Format version found in the stream.
    pub version: u32,
    /// Schema text the payload was written with.
    pub schema: String,
}

impl Header {
    /// Size in bytes of the encoded header.
    pub fn encoded_len(&self) -> u64 {
        let schema_len = self.schema.len() as u64;
        let mut prefix = 1;
        let mut rest = schema_len >> 7;
        while rest > 0 {
            prefix += 1;
            rest >>= 7;
        }
        (MAGIC_BYTES.len() + 4) as u64 + prefix + schema_len
    }
}

/// Writes the preamble for a stream carrying data of the given schema.
pub fn write_header<W: Write>(stream: &mut CodedOutputStream<W>, schema: &str) -> Result<()> {
    stream.write_bytes(&MAGIC_BYTES)?;
    stream.write_fixed_u32(FORMAT_VERSION)?;
    stream.write_varint_u64(schema.len() as u64)?;
    stream.write_bytes(schema.as_bytes())
}

/// Reads and validates the preamble.
///
/// Fails with a format error on wrong magic bytes or an unsupported version.
/// The schema text is returned as-is; matching it against a protocol's known
/// schemas happens in [`crate::protocol::ProtocolDescriptor::version_of`].
pub fn read_header<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Header> {
    let magic: [u8; 5] = stream.read_array()?;
    if magic != MAGIC_BYTES {
        return Err(StepcodeError::format("data in the stream is not in the expected format"));
    }

    let version = stream.read_fixed_u32()?;
    if version != FORMAT_VERSION {
        return Err(StepcodeError::Format(format!(
            "unsupported format version {version} (expected {FORMAT_VERSION})"
        )));
    }

    let len = stream.read_varint_u64()?;
    if len > MAX_SCHEMA_LEN {
        return Err(StepcodeError::Format(format!("schema length {len} is implausible")));
    }
    let mut bytes = vec![0u8; len as usize];
    stream.read_bytes(&mut bytes)?;
    let schema = String::from_utf8(bytes)
        .map_err(|_| StepcodeError::format("schema text is not valid UTF-8"))?;

    Ok(Header { version, schema })
}

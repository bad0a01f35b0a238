//! Buffered byte-level streams with compact integer encodings.
//!
//! Unsigned integers are written with the Protobuf "varint" encoding: 7 bits
//! per byte, least-significant group first, the high bit set on every byte
//! except the last. Signed integers are zig-zag mapped first so that values of
//! small magnitude stay small regardless of sign. Floating point values and
//! single bytes are copied verbatim (little-endian) because varints would only
//! make them larger.
//!
//! Both streams track a logical position (`pos`) counted from the point where
//! the stream was created. The random-access index records these positions.

use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};

use crate::error::{Result, StepcodeError};

/// Maximum number of bytes a 64-bit varint can occupy.
pub const MAX_VARINT64_BYTES: usize = 10;

/// Zig-zag maps a signed integer onto an unsigned one.
#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value as u64) << 1) ^ ((value >> 63) as u64)
}

/// Inverse of [`zigzag_encode`].
#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// A buffered output stream providing compact integer encodings.
///
/// Bytes are staged in an internal buffer and handed to the sink when the
/// buffer fills, on [`flush`](Self::flush), and when the stream is dropped.
#[derive(Debug)]
pub struct CodedOutputStream<W: Write> {
    writer: BufWriter<W>,
    pos: u64,
}

impl<W: Write> CodedOutputStream<W> {
    /// Creates a stream over `sink` with an internal buffer of `buffer_size` bytes.
    pub fn new(sink: W, buffer_size: usize) -> Self {
        Self::with_offset(sink, buffer_size, 0)
    }

    /// Creates a stream whose logical position starts at `offset`.
    ///
    /// Used when the sink is already positioned past its start, so that
    /// recorded offsets stay absolute.
    pub fn with_offset(sink: W, buffer_size: usize, offset: u64) -> Self {
        Self {
            writer: BufWriter::with_capacity(buffer_size.max(MAX_VARINT64_BYTES), sink),
            pos: offset,
        }
    }

    /// Current logical position: bytes written so far plus the starting offset.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Writes a single raw byte.
    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    /// Writes a raw byte range.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    /// Writes an unsigned varint.
    pub fn write_varint_u64(&mut self, mut value: u64) -> Result<()> {
        let mut buf = [0u8; MAX_VARINT64_BYTES];
        let mut len = 0;
        while value > 0x7F {
            buf[len] = (value as u8 & 0x7F) | 0x80;
            value >>= 7;
            len += 1;
        }
        buf[len] = value as u8;
        self.write_bytes(&buf[..=len])
    }

    /// Writes a zig-zag encoded signed varint.
    pub fn write_varint_i64(&mut self, value: i64) -> Result<()> {
        self.write_varint_u64(zigzag_encode(value))
    }

    /// Writes a 4-byte little-endian integer.
    pub fn write_fixed_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes an 8-byte little-endian integer.
    pub fn write_fixed_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes the IEEE-754 bits of `value`, little-endian.
    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes the IEEE-754 bits of `value`, little-endian.
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Hands all buffered bytes to the sink and flushes it.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and returns the underlying sink.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| StepcodeError::from(e.into_error()))
    }
}

/// A buffered input stream reading data produced by a [`CodedOutputStream`].
#[derive(Debug)]
pub struct CodedInputStream<R: Read> {
    reader: BufReader<R>,
    pos: u64,
}

impl<R: Read> CodedInputStream<R> {
    /// Creates a stream over `source` with an internal buffer of `buffer_size` bytes.
    pub fn new(source: R, buffer_size: usize) -> Self {
        Self::with_offset(source, buffer_size, 0)
    }

    /// Creates a stream whose logical position starts at `offset`.
    pub fn with_offset(source: R, buffer_size: usize, offset: u64) -> Self {
        Self {
            reader: BufReader::with_capacity(buffer_size.max(MAX_VARINT64_BYTES), source),
            pos: offset,
        }
    }

    /// Current logical position of the next byte to be read.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Reads a single raw byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        self.try_read_byte()?.ok_or(StepcodeError::EndOfStream)
    }

    /// Reads a single raw byte, or `None` if the source is exhausted.
    fn try_read_byte(&mut self) -> Result<Option<u8>> {
        let buf = self.reader.fill_buf()?;
        let Some(&byte) = buf.first() else {
            return Ok(None);
        };
        self.reader.consume(1);
        self.pos += 1;
        Ok(Some(byte))
    }

    /// Fills `data` completely from the source.
    pub fn read_bytes(&mut self, data: &mut [u8]) -> Result<()> {
        self.reader.read_exact(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    /// Reads exactly `N` bytes.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_bytes(&mut buf)?;
        Ok(buf)
    }

    /// Reads an unsigned varint.
    pub fn read_varint_u64(&mut self) -> Result<u64> {
        self.try_read_varint_u64()?.ok_or(StepcodeError::EndOfStream)
    }

    /// Reads an unsigned varint, returning `None` if the source ends before
    /// its first byte. Running out of data mid-varint is still truncation.
    pub fn try_read_varint_u64(&mut self) -> Result<Option<u64>> {
        let Some(first) = self.try_read_byte()? else {
            return Ok(None);
        };

        let mut value = u64::from(first & 0x7F);
        let mut byte = first;
        let mut shift = 7;
        while byte & 0x80 != 0 {
            if shift >= 64 {
                return Err(StepcodeError::format("varint exceeds 64 bits"));
            }
            byte = self.read_byte()?;
            let group = u64::from(byte & 0x7F);
            if shift == 63 && group > 1 {
                return Err(StepcodeError::format("varint exceeds 64 bits"));
            }
            value |= group << shift;
            shift += 7;
        }
        Ok(Some(value))
    }

    /// Reads a zig-zag encoded signed varint.
    pub fn read_varint_i64(&mut self) -> Result<i64> {
        self.read_varint_u64().map(zigzag_decode)
    }

    /// Reads a 4-byte little-endian integer.
    pub fn read_fixed_u32(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Reads an 8-byte little-endian integer.
    pub fn read_fixed_u64(&mut self) -> Result<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    /// Reads a little-endian IEEE-754 single.
    pub fn read_f32(&mut self) -> Result<f32> {
        self.read_array().map(f32::from_le_bytes)
    }

    /// Reads a little-endian IEEE-754 double.
    pub fn read_f64(&mut self) -> Result<f64> {
        self.read_array().map(f64::from_le_bytes)
    }

    /// Fails unless every byte of the source has been consumed.
    pub fn verify_finished(&mut self) -> Result<()> {
        if self.reader.fill_buf()?.is_empty() {
            Ok(())
        } else {
            Err(StepcodeError::format("stream was not completely read"))
        }
    }

    /// Returns the underlying source. Buffered, unread bytes are lost.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

impl<R: Read + Seek> CodedInputStream<R> {
    /// Repositions the read cursor.
    ///
    /// A non-negative `offset` is an absolute position. A negative `offset` is
    /// relative to the end of the source, which is how fixed-width trailers are
    /// located. Targets inside the current buffer are reached without
    /// discarding it. Returns the new absolute position.
    pub fn seek(&mut self, offset: i64) -> Result<u64> {
        if offset < 0 {
            self.pos = self.reader.seek(SeekFrom::End(offset))?;
        } else {
            let delta = offset - self.pos as i64;
            self.reader.seek_relative(delta)?;
            self.pos = offset as u64;
        }
        Ok(self.pos)
    }
}

//! The random-access index.
//!
//! An index records where every step and every stream item starts, so that a
//! reader can seek straight to them instead of decoding everything before.
//!
//! # Layout
//! The index is appended after the protocol payload:
//!
//! `[Magic (10)] [Version (u32 LE)] [Step Offsets] [Stream Offsets] [Stream Blocks] [Index Offset (u64 LE)]`
//!
//! The three tables are encoded as maps keyed by step name. The final eight
//! bytes of the file always hold the absolute offset of the index magic, which
//! is how a reader finds the index without scanning.

use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};

use tracing::debug;

use crate::codec::BinaryCodec;
use crate::error::{Result, StepcodeError};
use crate::io::{CodedInputStream, CodedOutputStream};
use crate::writer::StepObserver;

/// Magic bytes identifying the index section.
pub const INDEX_MAGIC_BYTES: [u8; 10] = *b"yardlindex";

/// The only index format version this crate reads and writes.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Size of the back-pointer at the end of an indexed file.
pub const INDEX_POINTER_SIZE: u64 = 8;

/// Where a stream item lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamItemLocation {
    /// Absolute byte offset of the item.
    pub offset: u64,
    /// Items left in the item's block, counting the item itself.
    pub remaining_in_block: u64,
}

/// Byte offsets of steps and stream items, keyed by step name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamIndex {
    step_offsets: BTreeMap<String, u64>,
    stream_offsets: BTreeMap<String, Vec<u64>>,
    stream_blocks: BTreeMap<String, Vec<u64>>,
}

impl StreamIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records where a step starts. Only the first call per step has any effect.
    pub fn set_step_offset(&mut self, step: &str, offset: u64) {
        if !self.step_offsets.contains_key(step) {
            self.step_offsets.insert(step.to_owned(), offset);
        }
    }

    /// Records a block holding a single stream item.
    pub fn add_stream_offset(&mut self, step: &str, offset: u64) {
        self.add_stream_offsets(step, &[offset]);
    }

    /// Records a block of stream items.
    pub fn add_stream_offsets(&mut self, step: &str, offsets: &[u64]) {
        let items = self.stream_offsets.entry(step.to_owned()).or_default();
        self.stream_blocks
            .entry(step.to_owned())
            .or_default()
            .push(items.len() as u64);
        items.extend_from_slice(offsets);
    }

    /// Where a step starts.
    pub fn step_offset(&self, step: &str) -> Result<u64> {
        self.step_offsets
            .get(step)
            .copied()
            .ok_or_else(|| StepcodeError::Index(format!("step '{step}' is not in the index")))
    }

    /// Number of items written to a stream step.
    pub fn count_stream(&self, step: &str) -> u64 {
        self.stream_offsets.get(step).map_or(0, |v| v.len() as u64)
    }

    /// Locates item `index` of a stream step.
    ///
    /// The block holding the item ends at the first recorded block start
    /// greater than `index`, or at the end of the stream.
    pub fn find_stream_item(&self, step: &str, index: u64) -> Result<StreamItemLocation> {
        let offsets = self.stream_offsets.get(step).map_or(&[][..], Vec::as_slice);
        let offset = usize::try_from(index)
            .ok()
            .and_then(|i| offsets.get(i))
            .copied()
            .ok_or_else(|| {
                StepcodeError::Index(format!(
                    "item {index} is out of range for stream '{step}' with {} items",
                    offsets.len()
                ))
            })?;

        let blocks = self.stream_blocks.get(step).map_or(&[][..], Vec::as_slice);
        let next = blocks.partition_point(|&start| start <= index);
        let block_end = blocks.get(next).copied().unwrap_or(offsets.len() as u64);

        Ok(StreamItemLocation {
            offset,
            remaining_in_block: block_end - index,
        })
    }

    /// Names of the steps with a recorded offset.
    pub fn steps(&self) -> impl Iterator<Item = (&str, u64)> {
        self.step_offsets.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of blocks written to a stream step.
    pub fn block_count(&self, step: &str) -> usize {
        self.stream_blocks.get(step).map_or(0, Vec::len)
    }

    /// Appends the index section, back-pointer included, at the current position.
    pub fn write_to<W: Write>(&self, stream: &mut CodedOutputStream<W>) -> Result<()> {
        let start = stream.pos();
        stream.write_bytes(&INDEX_MAGIC_BYTES)?;
        stream.write_fixed_u32(INDEX_FORMAT_VERSION)?;
        self.step_offsets.write(stream)?;
        self.stream_offsets.write(stream)?;
        self.stream_blocks.write(stream)?;
        stream.write_fixed_u64(start)?;
        debug!(
            offset = start,
            steps = self.step_offsets.len(),
            streams = self.stream_offsets.len(),
            "wrote stream index"
        );
        Ok(())
    }

    /// Loads the index of an indexed stream, then returns to the position the
    /// stream was at.
    ///
    /// A stream that carries no valid index yields [`StepcodeError::Index`].
    /// Failures of the source itself stay [`StepcodeError::Io`].
    pub fn read_from<R: Read + Seek>(stream: &mut CodedInputStream<R>) -> Result<Self> {
        let resume = stream.pos();

        // Seeking before the start of the source means it is too short for a trailer.
        let trailer = stream.seek(-(INDEX_POINTER_SIZE as i64)).map_err(|e| match e {
            StepcodeError::Io(io) if io.kind() == std::io::ErrorKind::InvalidInput => {
                StepcodeError::index("stream is too short to hold an index")
            }
            other => other,
        })?;
        let start = stream.read_fixed_u64().map_err(|e| match e {
            StepcodeError::Io(_) => e,
            other => StepcodeError::Index(format!("cannot read index: {other}")),
        })?;
        if start >= trailer {
            return Err(StepcodeError::index("index not found in stream"));
        }
        stream.seek(start as i64)?;

        let index = Self::read_section(stream).map_err(|e| match e {
            StepcodeError::Index(_) | StepcodeError::Io(_) => e,
            other => StepcodeError::Index(format!("index in the stream is unreadable: {other}")),
        })?;
        if stream.pos() != trailer {
            return Err(StepcodeError::index("index section has unexpected trailing bytes"));
        }

        stream.seek(resume as i64)?;
        debug!(
            offset = start,
            steps = index.step_offsets.len(),
            streams = index.stream_offsets.len(),
            "loaded stream index"
        );
        Ok(index)
    }

    fn read_section<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Self> {
        let magic: [u8; 10] = stream.read_array()?;
        if magic != INDEX_MAGIC_BYTES {
            return Err(StepcodeError::index("index in the stream is not in the expected format"));
        }
        let version = stream.read_fixed_u32()?;
        if version != INDEX_FORMAT_VERSION {
            return Err(StepcodeError::Index(format!(
                "unsupported index format version {version}"
            )));
        }
        Ok(Self {
            step_offsets: BTreeMap::read(stream)?,
            stream_offsets: BTreeMap::read(stream)?,
            stream_blocks: BTreeMap::read(stream)?,
        })
    }
}

impl StepObserver for StreamIndex {
    const TRACKS_ITEMS: bool = true;

    fn step_started(&mut self, name: &'static str, offset: u64) {
        self.set_step_offset(name, offset);
    }

    fn block_written(&mut self, name: &'static str, item_offsets: &[u64]) {
        self.add_stream_offsets(name, item_offsets);
    }
}

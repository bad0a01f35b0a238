//! Index-aware writer and reader.
//!
//! [`IndexedBinaryWriter`] produces exactly the payload a [`BinaryWriter`]
//! would, records the offset of every step and stream item while doing so, and
//! appends the index when closed. [`IndexedBinaryReader`] loads that index on
//! open and can then jump to any step or stream item.
//!
//! Both need seekable storage. Offsets are absolute positions in the
//! underlying sink or source.

use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use tracing::debug;

use crate::codec::BinaryCodec;
use crate::error::{Result, StepcodeError};
use crate::index::StreamIndex;
use crate::protocol::{ProtocolDescriptor, StepDecoder, StepKind, StepReader, StepWriter};
use crate::reader::{BinaryReader, ReaderOptions};
use crate::schema::SchemaVersion;
use crate::writer::{BinaryWriter, WriterOptions};

/// A [`BinaryWriter`] that also records and appends a [`StreamIndex`].
#[derive(Debug)]
pub struct IndexedBinaryWriter<W: Write + Seek> {
    inner: BinaryWriter<W>,
    index: StreamIndex,
}

impl<W: Write + Seek> IndexedBinaryWriter<W> {
    /// Starts an indexed stream on `sink` with default options.
    pub fn new(sink: W, protocol: &'static ProtocolDescriptor) -> Result<Self> {
        Self::with_options(sink, protocol, WriterOptions::default())
    }

    /// Starts an indexed stream on `sink`.
    ///
    /// Fails with an index error if the sink cannot report its position.
    pub fn with_options(
        mut sink: W,
        protocol: &'static ProtocolDescriptor,
        options: WriterOptions,
    ) -> Result<Self> {
        let offset = sink
            .stream_position()
            .map_err(|e| StepcodeError::Index(format!("cannot build index: {e}")))?;
        Ok(Self {
            inner: BinaryWriter::with_offset(sink, protocol, options, offset)?,
            index: StreamIndex::new(),
        })
    }

    /// The index recorded so far.
    pub fn index(&self) -> &StreamIndex {
        &self.index
    }

    /// Absolute position of the next byte to be written.
    pub fn position(&self) -> u64 {
        self.inner.position()
    }
}

impl IndexedBinaryWriter<File> {
    /// Creates (or truncates) the file at `path` and starts an indexed stream in it.
    pub fn create(path: impl AsRef<Path>, protocol: &'static ProtocolDescriptor) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(file, protocol)
    }
}

impl<W: Write + Seek> StepWriter for IndexedBinaryWriter<W> {
    type Output = W;

    fn protocol(&self) -> &'static ProtocolDescriptor {
        self.inner.protocol()
    }

    fn write_step<T: BinaryCodec>(&mut self, step: usize, value: &T) -> Result<()> {
        self.inner.write_step_observed(step, value, &mut self.index)
    }

    fn write_stream_item<T: BinaryCodec>(&mut self, step: usize, item: &T) -> Result<()> {
        self.inner
            .write_items_observed(step, std::slice::from_ref(item), &mut self.index)
    }

    fn write_stream_items<T: BinaryCodec>(&mut self, step: usize, items: &[T]) -> Result<()> {
        self.inner.write_items_observed(step, items, &mut self.index)
    }

    fn end_stream(&mut self, step: usize) -> Result<()> {
        self.inner.end_stream_observed(step, &mut self.index)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    /// Verifies every step was written, appends the index and releases the sink.
    fn close(mut self) -> Result<W> {
        self.inner.state().check_close()?;
        self.index.write_to(self.inner.stream_mut())?;
        self.inner.finish()
    }
}

/// A [`BinaryReader`] with random access through a trailing [`StreamIndex`].
///
/// Sequential reads behave exactly as on a plain reader. After a seek, the
/// reader continues from the target as if every earlier step had been read.
/// Closing never checks completeness, since random access rarely visits
/// every step.
#[derive(Debug)]
pub struct IndexedBinaryReader<R: Read + Seek> {
    inner: BinaryReader<R>,
    index: StreamIndex,
}

impl<R: Read + Seek> IndexedBinaryReader<R> {
    /// Opens an indexed stream with default options.
    pub fn new(source: R, protocol: &'static ProtocolDescriptor) -> Result<Self> {
        Self::with_options(source, protocol, ReaderOptions::default())
    }

    /// Opens an indexed stream and loads its index.
    ///
    /// Fails with an index error if the source cannot report its position or
    /// carries no valid index.
    pub fn with_options(
        mut source: R,
        protocol: &'static ProtocolDescriptor,
        options: ReaderOptions,
    ) -> Result<Self> {
        let offset = source
            .stream_position()
            .map_err(|e| StepcodeError::Index(format!("cannot read index: {e}")))?;
        let mut inner = BinaryReader::with_offset(source, protocol, options, offset)?;
        let index = StreamIndex::read_from(inner.stream_mut())?;
        Ok(Self { inner, index })
    }

    /// The loaded index.
    pub fn index(&self) -> &StreamIndex {
        &self.index
    }

    /// Number of items in stream `step`.
    pub fn count_stream(&self, step: usize) -> Result<u64> {
        let name = self.step_name(step, StepKind::Stream)?;
        Ok(self.index.count_stream(name))
    }

    /// Moves the reader to the start of `step`.
    pub fn seek_step(&mut self, step: usize) -> Result<()> {
        let name = self.step_name(step, self.kind_of(step)?)?;
        let offset = self.index.step_offset(name)?;
        self.inner.stream_mut().seek(offset as i64)?;
        self.inner.reposition(step, 0);
        debug!(step = name, offset, "seeked to step");
        Ok(())
    }

    /// Moves the reader to item `item` of stream `step`.
    ///
    /// Returns `false`, without moving, when the stream has no such item.
    pub fn seek_stream_item(&mut self, step: usize, item: u64) -> Result<bool> {
        let name = self.step_name(step, StepKind::Stream)?;
        if item >= self.index.count_stream(name) {
            return Ok(false);
        }
        let location = self.index.find_stream_item(name, item)?;
        self.inner.stream_mut().seek(location.offset as i64)?;
        self.inner.reposition(step, location.remaining_in_block);
        Ok(true)
    }

    fn kind_of(&self, step: usize) -> Result<StepKind> {
        let protocol = self.inner.protocol();
        protocol
            .step(step)
            .map(|s| s.kind)
            .ok_or_else(|| StepcodeError::Protocol(format!("protocol {} has no step {step}", protocol.name)))
    }

    fn step_name(&self, step: usize, kind: StepKind) -> Result<&'static str> {
        let protocol = self.inner.protocol();
        match protocol.step(step) {
            Some(s) if s.kind == kind => Ok(s.name),
            Some(s) => Err(StepcodeError::Protocol(format!(
                "step '{}' of protocol {} is not a {kind:?} step",
                s.name, protocol.name
            ))),
            None => Err(StepcodeError::Protocol(format!(
                "protocol {} has no step {step}",
                protocol.name
            ))),
        }
    }
}

impl IndexedBinaryReader<File> {
    /// Opens the indexed file at `path`.
    pub fn open(path: impl AsRef<Path>, protocol: &'static ProtocolDescriptor) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(file, protocol)
    }
}

impl<R: Read + Seek> StepReader for IndexedBinaryReader<R> {
    type Source = R;
    type Output = R;

    fn protocol(&self) -> &'static ProtocolDescriptor {
        self.inner.protocol()
    }

    fn schema_version(&self) -> SchemaVersion {
        self.inner.schema_version()
    }

    fn read_step<T: BinaryCodec>(&mut self, step: usize, decoder: StepDecoder<R, T>) -> Result<T> {
        self.inner.read_step(step, decoder)
    }

    fn read_stream_item<T: BinaryCodec>(
        &mut self,
        step: usize,
        decoder: StepDecoder<R, T>,
    ) -> Result<Option<T>> {
        self.inner.read_stream_item(step, decoder)
    }

    fn read_stream_items<T: BinaryCodec>(
        &mut self,
        step: usize,
        decoder: StepDecoder<R, T>,
        values: &mut Vec<T>,
        max: usize,
    ) -> Result<bool> {
        self.inner.read_stream_items(step, decoder, values, max)
    }

    /// Releases the source. Random-access readers do not enforce stream
    /// completion: neither the step order nor trailing bytes are checked.
    fn close(self) -> Result<R> {
        Ok(self.inner.into_inner())
    }
}

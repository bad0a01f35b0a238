//! The binary protocol writer.
//!
//! [`BinaryWriter`] writes the stream header on construction, then encodes
//! each step in the order the protocol dictates. Stream items are grouped into
//! blocks: every write call produces one block of `[count][items...]`, and
//! ending the stream writes a block with count zero.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::codec::BinaryCodec;
use crate::constants::DEFAULT_BUFFER_SIZE;
use crate::error::{Result, StepcodeError};
use crate::format::write_header;
use crate::io::CodedOutputStream;
use crate::protocol::{ProtocolDescriptor, StepDescriptor, StepKind, StepWriter};
use crate::state::WriterState;

/// Configuration for a [`BinaryWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    /// Size of the write buffer in bytes.
    pub buffer_size: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self { buffer_size: DEFAULT_BUFFER_SIZE }
    }
}

impl WriterOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the write buffer size.
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes;
        self
    }
}

/// Receives the byte offsets of steps and stream items as they are written.
pub(crate) trait StepObserver {
    /// When false, batches are written with the bulk path and no per-item
    /// offsets are collected.
    const TRACKS_ITEMS: bool;

    /// A step (or the first block of a stream) starts at `offset`.
    fn step_started(&mut self, name: &'static str, offset: u64);

    /// One stream block was written; its items start at `item_offsets`.
    fn block_written(&mut self, name: &'static str, item_offsets: &[u64]);
}

impl StepObserver for () {
    const TRACKS_ITEMS: bool = false;

    fn step_started(&mut self, _name: &'static str, _offset: u64) {}

    fn block_written(&mut self, _name: &'static str, _item_offsets: &[u64]) {}
}

/// Writes a protocol to any byte sink.
///
/// Dropping a writer flushes whatever is buffered but skips the completeness
/// check; call [`close`](StepWriter::close) to get it.
#[derive(Debug)]
pub struct BinaryWriter<W: Write> {
    stream: CodedOutputStream<W>,
    state: WriterState,
}

impl<W: Write> BinaryWriter<W> {
    /// Starts a stream on `sink` with default options.
    pub fn new(sink: W, protocol: &'static ProtocolDescriptor) -> Result<Self> {
        Self::with_options(sink, protocol, WriterOptions::default())
    }

    /// Starts a stream on `sink`.
    pub fn with_options(
        sink: W,
        protocol: &'static ProtocolDescriptor,
        options: WriterOptions,
    ) -> Result<Self> {
        Self::with_offset(sink, protocol, options, 0)
    }

    /// Starts a stream on a sink already positioned at `offset`.
    pub(crate) fn with_offset(
        sink: W,
        protocol: &'static ProtocolDescriptor,
        options: WriterOptions,
        offset: u64,
    ) -> Result<Self> {
        let mut stream = CodedOutputStream::with_offset(sink, options.buffer_size, offset);
        write_header(&mut stream, protocol.schema)?;
        debug!(
            protocol = protocol.name,
            offset,
            schema_len = protocol.schema.len(),
            "opened binary writer"
        );
        Ok(Self { stream, state: WriterState::new(protocol) })
    }

    /// The call-order machine.
    pub fn state(&self) -> &WriterState {
        &self.state
    }

    /// Absolute position of the next byte to be written.
    pub fn position(&self) -> u64 {
        self.stream.pos()
    }

    /// Flushes and returns the sink without checking that every step was written.
    pub fn into_inner(self) -> Result<W> {
        self.stream.into_inner()
    }

    pub(crate) fn stream_mut(&mut self) -> &mut CodedOutputStream<W> {
        &mut self.stream
    }

    fn descriptor(&self, step: usize, kind: StepKind) -> Result<&'static StepDescriptor> {
        let protocol = self.state.protocol();
        let descriptor = protocol.step(step).ok_or_else(|| {
            StepcodeError::Protocol(format!("protocol {} has no step {step}", protocol.name))
        })?;
        if descriptor.kind != kind {
            return Err(StepcodeError::Protocol(format!(
                "step '{}' of protocol {} is not a {kind:?} step",
                descriptor.name, protocol.name
            )));
        }
        Ok(descriptor)
    }

    pub(crate) fn write_step_observed<T, O>(
        &mut self,
        step: usize,
        value: &T,
        observer: &mut O,
    ) -> Result<()>
    where
        T: BinaryCodec,
        O: StepObserver,
    {
        self.state.check_write(step)?;
        let descriptor = self.descriptor(step, StepKind::Scalar)?;
        observer.step_started(descriptor.name, self.stream.pos());
        value.write(&mut self.stream)?;
        self.state.complete(step);
        Ok(())
    }

    pub(crate) fn write_items_observed<T, O>(
        &mut self,
        step: usize,
        items: &[T],
        observer: &mut O,
    ) -> Result<()>
    where
        T: BinaryCodec,
        O: StepObserver,
    {
        self.state.check_write(step)?;
        let descriptor = self.descriptor(step, StepKind::Stream)?;
        if items.is_empty() {
            return Ok(());
        }

        observer.step_started(descriptor.name, self.stream.pos());
        self.stream.write_varint_u64(items.len() as u64)?;
        if O::TRACKS_ITEMS {
            let mut offsets = Vec::with_capacity(items.len());
            for item in items {
                offsets.push(self.stream.pos());
                item.write(&mut self.stream)?;
            }
            observer.block_written(descriptor.name, &offsets);
        } else {
            T::write_slice(items, &mut self.stream)?;
        }
        Ok(())
    }

    pub(crate) fn end_stream_observed<O: StepObserver>(
        &mut self,
        step: usize,
        observer: &mut O,
    ) -> Result<()> {
        self.state.check_end(step)?;
        let descriptor = self.descriptor(step, StepKind::Stream)?;
        observer.step_started(descriptor.name, self.stream.pos());
        self.stream.write_varint_u64(0)?;
        self.state.complete(step);
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<W> {
        self.state.check_close()?;
        self.stream.flush()?;
        debug!(
            protocol = self.state.protocol().name,
            bytes = self.stream.pos(),
            "closed binary writer"
        );
        self.stream.into_inner()
    }
}

impl BinaryWriter<File> {
    /// Creates (or truncates) the file at `path` and starts a stream in it.
    pub fn create(path: impl AsRef<Path>, protocol: &'static ProtocolDescriptor) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(file, protocol)
    }
}

impl<W: Write> StepWriter for BinaryWriter<W> {
    type Output = W;

    fn protocol(&self) -> &'static ProtocolDescriptor {
        self.state.protocol()
    }

    fn write_step<T: BinaryCodec>(&mut self, step: usize, value: &T) -> Result<()> {
        self.write_step_observed(step, value, &mut ())
    }

    fn write_stream_item<T: BinaryCodec>(&mut self, step: usize, item: &T) -> Result<()> {
        self.write_items_observed(step, std::slice::from_ref(item), &mut ())
    }

    fn write_stream_items<T: BinaryCodec>(&mut self, step: usize, items: &[T]) -> Result<()> {
        self.write_items_observed(step, items, &mut ())
    }

    fn end_stream(&mut self, step: usize) -> Result<()> {
        self.end_stream_observed(step, &mut ())
    }

    fn flush(&mut self) -> Result<()> {
        self.stream.flush()
    }

    fn close(self) -> Result<W> {
        self.finish()
    }
}

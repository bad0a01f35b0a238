//! The binary protocol reader.
//!
//! [`BinaryReader`] validates the stream header and resolves the schema
//! version when it is opened, then decodes steps in protocol order. Stream
//! items are pulled block by block; callers never see block boundaries.
//!
//! ## Stream Termination
//!
//! A stream ends at a block with count zero. A source that ends cleanly where
//! the next block count would start is treated the same way, so a file cut off
//! exactly at a block boundary reads as a shorter stream instead of an error.
//! Running out of data anywhere else is [`StepcodeError::EndOfStream`].

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use memmap2::Mmap;
use tracing::debug;

use crate::codec::BinaryCodec;
use crate::constants::DEFAULT_BUFFER_SIZE;
use crate::error::{Result, StepcodeError};
use crate::format::read_header;
use crate::io::CodedInputStream;
use crate::protocol::{ProtocolDescriptor, StepDecoder, StepDescriptor, StepKind, StepReader};
use crate::schema::SchemaVersion;
use crate::state::{ReaderState, StreamRead};

/// Configuration for a [`BinaryReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Size of the read buffer in bytes.
    pub buffer_size: usize,
    /// When set, `close` neither requires every step to have been read nor
    /// the source to be exhausted. Allows reading a prefix of a stream.
    pub skip_completed_check: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            skip_completed_check: false,
        }
    }
}

impl ReaderOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the read buffer size.
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes;
        self
    }

    /// Enables or disables the completeness check on close.
    pub fn skip_completed_check(mut self, skip: bool) -> Self {
        self.skip_completed_check = skip;
        self
    }
}

/// Reads a protocol from any byte source.
#[derive(Debug)]
pub struct BinaryReader<R: Read> {
    stream: CodedInputStream<R>,
    state: ReaderState,
    version: SchemaVersion,
    block_remaining: u64,
    options: ReaderOptions,
}

impl<R: Read> BinaryReader<R> {
    /// Opens a stream with default options.
    pub fn new(source: R, protocol: &'static ProtocolDescriptor) -> Result<Self> {
        Self::with_options(source, protocol, ReaderOptions::default())
    }

    /// Opens a stream, validating the header and resolving the schema version.
    pub fn with_options(
        source: R,
        protocol: &'static ProtocolDescriptor,
        options: ReaderOptions,
    ) -> Result<Self> {
        Self::with_offset(source, protocol, options, 0)
    }

    /// Opens a stream from a source already positioned at `offset`.
    pub(crate) fn with_offset(
        source: R,
        protocol: &'static ProtocolDescriptor,
        options: ReaderOptions,
        offset: u64,
    ) -> Result<Self> {
        let mut stream = CodedInputStream::with_offset(source, options.buffer_size, offset);
        let header = read_header(&mut stream)?;
        let version = protocol.version_of(&header.schema)?;
        debug!(
            protocol = protocol.name,
            version = version.ordinal(),
            current = version == protocol.current_version(),
            "opened binary reader"
        );
        Ok(Self {
            stream,
            state: ReaderState::new(protocol),
            version,
            block_remaining: 0,
            options,
        })
    }

    /// The call-order machine.
    pub fn state(&self) -> &ReaderState {
        &self.state
    }

    /// Absolute position of the next byte to be read.
    pub fn position(&self) -> u64 {
        self.stream.pos()
    }

    /// Items left in the stream block being read.
    pub fn block_remaining(&self) -> u64 {
        self.block_remaining
    }

    /// Returns the source without any completeness checks.
    pub fn into_inner(self) -> R {
        self.stream.into_inner()
    }

    pub(crate) fn stream_mut(&mut self) -> &mut CodedInputStream<R> {
        &mut self.stream
    }

    /// Positions the reader at the start of `step`, `remaining` items into a
    /// stream block when reading from the middle of a stream.
    pub(crate) fn reposition(&mut self, step: usize, remaining: u64) {
        self.state.jump_to(step);
        self.block_remaining = remaining;
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

    /// Reads the next block count. A clean end of input counts as the end
    /// of the stream.
    fn next_block(&mut self, descriptor: &StepDescriptor) -> Result<u64> {
        match self.stream.try_read_varint_u64()? {
            Some(count) => Ok(count),
            None => {
                debug!(
                    step = descriptor.name,
                    offset = self.stream.pos(),
                    "input ended at a block boundary; treating as end of stream"
                );
                Ok(0)
            }
        }
    }

    fn finish(mut self) -> Result<R> {
        if !self.options.skip_completed_check {
            self.state.check_close()?;
            self.stream.verify_finished()?;
        }
        debug!(
            protocol = self.state.protocol().name,
            bytes = self.stream.pos(),
            "closed binary reader"
        );
        Ok(self.stream.into_inner())
    }
}

impl BinaryReader<File> {
    /// Opens the file at `path`.
    pub fn open(path: impl AsRef<Path>, protocol: &'static ProtocolDescriptor) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(file, protocol)
    }
}

impl BinaryReader<Cursor<Mmap>> {
    /// Memory-maps the file at `path` and reads from the mapping.
    pub fn open_mapped(
        path: impl AsRef<Path>,
        protocol: &'static ProtocolDescriptor,
    ) -> Result<Self> {
        let file = File::open(path)?;
        // Safety: the mapping is read-only; concurrent truncation of the file by
        // another process is outside what this reader can defend against.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Self::new(Cursor::new(mmap), protocol)
    }
}

impl<R: Read> StepReader for BinaryReader<R> {
    type Source = R;
    type Output = R;

    fn protocol(&self) -> &'static ProtocolDescriptor {
        self.state.protocol()
    }

    fn schema_version(&self) -> SchemaVersion {
        self.version
    }

    fn read_step<T: BinaryCodec>(&mut self, step: usize, decoder: StepDecoder<R, T>) -> Result<T> {
        self.descriptor(step, StepKind::Scalar)?;
        self.state.begin_scalar(step)?;
        let value = decoder.decode(&mut self.stream)?;
        self.state.finish_scalar(step);
        Ok(value)
    }

    fn read_stream_item<T: BinaryCodec>(
        &mut self,
        step: usize,
        decoder: StepDecoder<R, T>,
    ) -> Result<Option<T>> {
        let descriptor = self.descriptor(step, StepKind::Stream)?;
        if self.state.begin_stream(step)? == StreamRead::Finished {
            return Ok(None);
        }

        if self.block_remaining == 0 {
            self.block_remaining = self.next_block(descriptor)?;
            if self.block_remaining == 0 {
                self.state.stream_ended(step);
                return Ok(None);
            }
        }

        let item = decoder.decode(&mut self.stream)?;
        self.block_remaining -= 1;
        Ok(Some(item))
    }

    fn read_stream_items<T: BinaryCodec>(
        &mut self,
        step: usize,
        decoder: StepDecoder<R, T>,
        values: &mut Vec<T>,
        max: usize,
    ) -> Result<bool> {
        if max == 0 {
            return Err(StepcodeError::ZeroCapacity);
        }
        let descriptor = self.descriptor(step, StepKind::Stream)?;
        values.clear();
        if self.state.begin_stream(step)? == StreamRead::Finished {
            return Ok(false);
        }

        if self.block_remaining == 0 {
            self.block_remaining = self.next_block(descriptor)?;
        }

        while self.block_remaining > 0 && values.len() < max {
            let room = (max - values.len()) as u64;
            let take = self.block_remaining.min(room) as usize;
            values.extend(decoder.decode_many(take, &mut self.stream)?);
            self.block_remaining -= take as u64;

            if self.block_remaining == 0 {
                self.block_remaining = self.next_block(descriptor)?;
            }
        }

        if self.block_remaining == 0 {
            self.state.stream_drained(step);
            return Ok(!values.is_empty());
        }
        Ok(true)
    }

    fn close(self) -> Result<R> {
        self.finish()
    }
}

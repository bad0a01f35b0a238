//! Protocol descriptors and the backend-neutral step contract.
//!
//! A protocol is an ordered list of named steps. Each step is either a scalar
//! (exactly one value) or a stream (zero or more items followed by an explicit
//! end). A schema compiler declares one [`ProtocolDescriptor`] per protocol as a
//! `static` and generates a thin facade with one method per step that forwards
//! to a [`StepWriter`] or [`StepReader`] with the step's ordinal.
//!
//! ```rust
//! use stepcode::protocol::{ProtocolDescriptor, StepDescriptor};
//!
//! static SENSOR_LOG: ProtocolDescriptor = ProtocolDescriptor {
//!     name: "SensorLog",
//!     steps: &[
//!         StepDescriptor::scalar("header"),
//!         StepDescriptor::stream("samples"),
//!     ],
//!     schema: r#"{"protocol":{"name":"SensorLog"}}"#,
//!     previous_schemas: &[],
//! };
//!
//! assert_eq!(SENSOR_LOG.step_count(), 2);
//! assert!(SENSOR_LOG.step(1).is_some_and(|s| s.is_stream()));
//! ```

use std::fmt;
use std::io::Read;

use crate::codec::BinaryCodec;
use crate::error::Result;
use crate::io::CodedInputStream;
use crate::schema::SchemaVersion;

/// Whether a step carries one value or a sequence of items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Exactly one value.
    Scalar,
    /// Zero or more items, terminated explicitly.
    Stream,
}

/// A single step of a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDescriptor {
    /// Step name in `snake_case`, as used in method names and index keys.
    pub name: &'static str,
    /// Scalar or stream.
    pub kind: StepKind,
}

impl StepDescriptor {
    /// Declares a scalar step.
    pub const fn scalar(name: &'static str) -> Self {
        Self { name, kind: StepKind::Scalar }
    }

    /// Declares a stream step.
    pub const fn stream(name: &'static str) -> Self {
        Self { name, kind: StepKind::Stream }
    }

    /// True for stream steps.
    pub const fn is_stream(&self) -> bool {
        matches!(self.kind, StepKind::Stream)
    }
}

/// Static description of a protocol: its steps and every schema it has had.
///
/// Descriptors are immutable and shared by every reader and writer of the
/// protocol. Schema lookups live in [`crate::schema`].
#[derive(Debug)]
pub struct ProtocolDescriptor {
    /// Protocol name, used in diagnostics.
    pub name: &'static str,
    /// Steps in wire order.
    pub steps: &'static [StepDescriptor],
    /// Current schema text, written into every stream header.
    pub schema: &'static str,
    /// Earlier schema texts, oldest first.
    pub previous_schemas: &'static [&'static str],
}

impl ProtocolDescriptor {
    /// Number of steps.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// The step with the given ordinal.
    pub fn step(&self, ordinal: usize) -> Option<&'static StepDescriptor> {
        self.steps.get(ordinal)
    }

    /// The ordinal of the step with the given name.
    pub fn ordinal_of(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }
}

/// Which side of the protocol a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Write,
    Read,
}

/// A protocol method, rendered the way facades name it.
#[derive(Debug, Clone, Copy)]
pub(crate) enum MethodName<'a> {
    Step(Direction, &'a str),
    End(&'a str),
    StepOrEnd(&'a str),
    Close,
}

impl fmt::Display for MethodName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step(Direction::Write, name) => write!(f, "'write_{name}()'"),
            Self::Step(Direction::Read, name) => write!(f, "'read_{name}()'"),
            Self::End(name) => write!(f, "'end_{name}()'"),
            Self::StepOrEnd(name) => write!(f, "'write_{name}()' or 'end_{name}()'"),
            Self::Close => f.write_str("'close()'"),
        }
    }
}

/// How a reader decodes one step: with the current codec, or with a function
/// that reads an older wire shape and converts it to the current type.
///
/// A facade builds one table of decoders per [`SchemaVersion`] when a reader is
/// opened, then passes the matching entry on every call.
pub enum StepDecoder<R: Read, T> {
    /// The data was written with the current schema.
    Current,
    /// The data was written with an older schema.
    Legacy(fn(&mut CodedInputStream<R>) -> Result<T>),
}

impl<R: Read, T: BinaryCodec> StepDecoder<R, T> {
    /// Decodes one value.
    pub fn decode(&self, stream: &mut CodedInputStream<R>) -> Result<T> {
        match self {
            Self::Current => T::read(stream),
            Self::Legacy(read) => read(stream),
        }
    }

    /// Decodes `count` consecutive values, using the bulk path when current.
    pub fn decode_many(&self, count: usize, stream: &mut CodedInputStream<R>) -> Result<Vec<T>> {
        match self {
            Self::Current => T::read_vec(count, stream),
            Self::Legacy(read) => {
                let mut out = Vec::with_capacity(count.min(crate::codec::MAX_PREALLOCATED_ITEMS));
                for _ in 0..count {
                    out.push(read(stream)?);
                }
                Ok(out)
            }
        }
    }
}

impl<R: Read, T> Clone for StepDecoder<R, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R: Read, T> Copy for StepDecoder<R, T> {}

impl<R: Read, T> fmt::Debug for StepDecoder<R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => f.write_str("Current"),
            Self::Legacy(_) => f.write_str("Legacy(..)"),
        }
    }
}

/// The write half of a protocol backend.
///
/// Every method takes the ordinal of the step it serves and fails with a
/// protocol error, before touching any bytes, when that step is not the one
/// the protocol expects next.
pub trait StepWriter {
    /// What [`close`](Self::close) hands back, typically the sink.
    type Output;

    /// The protocol this writer serves.
    fn protocol(&self) -> &'static ProtocolDescriptor;

    /// Writes the value of a scalar step.
    fn write_step<T: BinaryCodec>(&mut self, step: usize, value: &T) -> Result<()>;

    /// Appends one item to a stream step.
    fn write_stream_item<T: BinaryCodec>(&mut self, step: usize, item: &T) -> Result<()>;

    /// Appends a batch of items to a stream step. An empty batch writes nothing.
    fn write_stream_items<T: BinaryCodec>(&mut self, step: usize, items: &[T]) -> Result<()>;

    /// Terminates a stream step.
    fn end_stream(&mut self, step: usize) -> Result<()>;

    /// Pushes buffered bytes to the sink.
    fn flush(&mut self) -> Result<()>;

    /// Verifies every step was written, then flushes and releases the sink.
    fn close(self) -> Result<Self::Output>
    where
        Self: Sized;
}

/// The read half of a protocol backend.
pub trait StepReader {
    /// Byte source type the decoders operate on.
    type Source: Read;
    /// What [`close`](Self::close) hands back, typically the source.
    type Output;

    /// The protocol this reader serves.
    fn protocol(&self) -> &'static ProtocolDescriptor;

    /// Schema version the data was written with, resolved at open time.
    fn schema_version(&self) -> SchemaVersion;

    /// Reads the value of a scalar step.
    fn read_step<T: BinaryCodec>(
        &mut self,
        step: usize,
        decoder: StepDecoder<Self::Source, T>,
    ) -> Result<T>;

    /// Reads the next item of a stream step, or `None` once the stream has ended.
    fn read_stream_item<T: BinaryCodec>(
        &mut self,
        step: usize,
        decoder: StepDecoder<Self::Source, T>,
    ) -> Result<Option<T>>;

    /// Replaces the contents of `values` with up to `max` further items of a
    /// stream step, spanning blocks as needed.
    ///
    /// Returns `false` once no items remain; `values` is then empty. A `max`
    /// of zero is a [`ZeroCapacity`](crate::StepcodeError::ZeroCapacity) error.
    fn read_stream_items<T: BinaryCodec>(
        &mut self,
        step: usize,
        decoder: StepDecoder<Self::Source, T>,
        values: &mut Vec<T>,
        max: usize,
    ) -> Result<bool>;

    /// Verifies every step was read, then releases the source.
    fn close(self) -> Result<Self::Output>
    where
        Self: Sized;
}

//! # Stepcode
//!
//! The runtime engine for schema-driven binary protocols.
//!
//! ## Overview
//!
//! A *protocol* is an ordered list of named steps, each either a single value
//! (a scalar) or a sequence of items (a stream). A schema compiler turns a
//! protocol definition into a static [`ProtocolDescriptor`] plus a small facade
//! with one method per step; this crate supplies everything underneath:
//!
//! *   **Compact Wire Format:** varint and zig-zag integers, fixed-width floats,
//!     length-prefixed strings, optionals, vectors, maps, N-dimensional arrays,
//!     tagged unions and enums, with a bulk-copy fast path for plain data.
//! *   **Call-Order Enforcement:** writers and readers reject any call that does
//!     not match the protocol's step order, before touching a single byte, and
//!     name both the expected and the attempted call.
//! *   **Stream Batching:** stream items travel in count-prefixed blocks. Single
//!     items and batches can be mixed freely on either side of the wire.
//! *   **Schema Evolution:** a reader matches the schema text in the stream header
//!     against the protocol's history and decodes data from older versions into
//!     current types.
//! *   **Random Access:** an optional trailing index records where every step and
//!     stream item begins.
//!
//! ## File Format
//!
//! ```text
//! [Magic "yardl"] [Format Version u32] [Schema] [Step 0] [Step 1] ... [Index (optional)]
//! ```
//!
//! Streams are encoded as `[count][items...]` blocks terminated by a block with
//! count zero. See [`format`] and [`index`] for the exact layouts.
//!
//! ## Usage
//!
//! ```rust
//! use stepcode::protocol::{ProtocolDescriptor, StepDecoder, StepDescriptor, StepReader, StepWriter};
//! use stepcode::{BinaryCodec, BinaryReader, BinaryWriter};
//!
//! #[derive(Debug, PartialEq, BinaryCodec)]
//! struct Reading {
//!     sensor: u32,
//!     value: f64,
//! }
//!
//! static READINGS: ProtocolDescriptor = ProtocolDescriptor {
//!     name: "Readings",
//!     steps: &[StepDescriptor::scalar("site"), StepDescriptor::stream("readings")],
//!     schema: r#"{"protocol":{"name":"Readings"}}"#,
//!     previous_schemas: &[],
//! };
//!
//! # fn main() -> stepcode::Result<()> {
//! let mut writer = BinaryWriter::new(Vec::new(), &READINGS)?;
//! writer.write_step(0, &"north".to_string())?;
//! writer.write_stream_items(1, &[Reading { sensor: 1, value: 0.5 }, Reading { sensor: 2, value: 1.5 }])?;
//! writer.end_stream(1)?;
//! let bytes = writer.close()?;
//!
//! let mut reader = BinaryReader::new(&bytes[..], &READINGS)?;
//! let site: String = reader.read_step(0, StepDecoder::Current)?;
//! let mut readings = Vec::new();
//! while let Some(r) = reader.read_stream_item::<Reading>(1, StepDecoder::Current)? {
//!     readings.push(r);
//! }
//! reader.close()?;
//!
//! assert_eq!(site, "north");
//! assert_eq!(readings.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **Encapsulated Unsafe:** the only `unsafe` is the memory mapping in
//!   [`BinaryReader::open_mapped`].
//! * **No Panics:** no `unwrap()` or `panic!()` calls in the library (enforced by clippy lints).
//! * **Comprehensive Errors:** all failures correspond to a [`StepcodeError`] variant.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// Lets the derive macro's `::stepcode::` paths resolve inside this crate too.
extern crate self as stepcode;

// --- PUBLIC API MODULES ---
pub mod codec;
pub mod copy;
pub mod error;
pub mod format;
pub mod index;
pub mod indexed;
pub mod inspector;
pub mod protocol;
pub mod reader;
pub mod schema;
pub mod state;
pub mod writer;

// --- LOW-LEVEL MODULES ---
pub mod io;

// --- RE-EXPORTS ---

pub use codec::{BinaryCodec, Complex32, Complex64, DynamicNdArray, NdArray, TriviallySerializable};
pub use error::{Result, StepcodeError};
pub use indexed::{IndexedBinaryReader, IndexedBinaryWriter};
pub use inspector::StepcodeInspector;
pub use protocol::{ProtocolDescriptor, StepDecoder, StepDescriptor, StepKind};
pub use reader::{BinaryReader, ReaderOptions};
pub use schema::SchemaVersion;
pub use writer::{BinaryWriter, WriterOptions};

// Re-export the derive macro so it is accessible as `stepcode::BinaryCodec`
pub use stepcode_derive::BinaryCodec;

/// Constants used throughout the library.
pub mod constants {
    /// The default buffer size for stream I/O.
    pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
}

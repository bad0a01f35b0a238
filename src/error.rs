//! Centralized error handling for stepcode.
//!
//! Every fallible operation in the crate returns [`Result`]. Nothing is retried
//! internally: an error is surfaced to the immediate caller, and a reader or
//! writer that produced one should be treated as unusable afterwards (the
//! stream position is undefined after a failed encode or decode).
//!
//! ## Error Categories
//!
//! - **I/O Errors** ([`StepcodeError::Io`]): the underlying sink or source failed.
//! - **Truncation** ([`StepcodeError::EndOfStream`]): a read needed more bytes than
//!   remain. Kept apart from format errors so that a stream ending cleanly on a
//!   block boundary can be told apart from corruption.
//! - **Format Errors** ([`StepcodeError::Format`]): bad magic bytes, unsupported
//!   format version, or a payload that cannot be decoded.
//! - **Schema Errors** ([`StepcodeError::IncompatibleSchema`]): the schema in the
//!   header matches no version known to the protocol.
//! - **Protocol Errors** ([`StepcodeError::Protocol`]): a step was called out of
//!   order or a reader/writer was closed early. Always a caller bug.
//! - **Capacity Errors** ([`StepcodeError::ZeroCapacity`]): a batch read was given
//!   a zero-sized buffer.
//! - **Index Errors** ([`StepcodeError::Index`]): the random-access index is
//!   missing, unreadable, or was asked for an item that does not exist.
//! - **Conversion Errors** ([`StepcodeError::Conversion`]): a legacy value could
//!   not be converted into the current in-memory type.
//!
//! ## Usage
//!
//! ```rust
//! use stepcode::StepcodeError;
//!
//! fn describe(err: &StepcodeError) -> &'static str {
//!     match err {
//!         StepcodeError::EndOfStream => "truncated",
//!         StepcodeError::Protocol(_) => "misuse",
//!         _ => "other",
//!     }
//! }
//! # assert_eq!(describe(&StepcodeError::EndOfStream), "truncated");
//! ```

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// A specialized `Result` type for stepcode operations.
pub type Result<T> = std::result::Result<T, StepcodeError>;

/// The master error enum covering all failure domains in stepcode.
///
/// This type is `Clone`; I/O errors are wrapped in `Arc` to keep cloning cheap.
#[derive(Debug, Clone, Error)]
pub enum StepcodeError {
    /// The underlying sink or source failed (open failure, write failure, bad seek).
    #[error("I/O error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// More bytes were requested than the source holds.
    #[error("unexpected end of stream")]
    EndOfStream,

    /// The data is not in the expected format.
    ///
    /// Raised for wrong magic bytes, unsupported format versions, and payloads
    /// that cannot be decoded (invalid UTF-8, unknown enum values or union
    /// indices, overlong varints).
    #[error("format error: {0}")]
    Format(String),

    /// The schema embedded in the stream header matches neither the current
    /// schema nor any previous schema of the protocol.
    #[error("the schema of the data does not match any version supported by protocol {protocol}")]
    IncompatibleSchema {
        /// Name of the protocol that rejected the schema.
        protocol: &'static str,
    },

    /// A protocol step was invoked out of order, or the protocol was closed
    /// before all steps were completed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A batch read was given a buffer with zero capacity.
    #[error("batch reads require a buffer capacity greater than zero")]
    ZeroCapacity,

    /// The random-access index could not be built, read, or queried.
    #[error("index error: {0}")]
    Index(String),

    /// A value written under a previous schema could not be converted into
    /// the current in-memory type.
    #[error("conversion error: {0}")]
    Conversion(String),
}

impl StepcodeError {
    /// Returns true if this error signals truncation rather than corruption.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub(crate) fn index(msg: impl Into<String>) -> Self {
        Self::Index(msg.into())
    }
}

impl From<io::Error> for StepcodeError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::EndOfStream
        } else {
            Self::Io(Arc::new(err))
        }
    }
}

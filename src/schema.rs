//! Schema-version resolution and the conversions legacy decoders rely on.
//!
//! A reader learns which schema the data was written with from the stream
//! header. The text is matched exactly against the protocol's previous schemas,
//! oldest first, and then against the current schema. The resulting
//! [`SchemaVersion`] is fixed for the lifetime of the reader and selects which
//! [`StepDecoder`](crate::protocol::StepDecoder) each step uses.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, StepcodeError};
use crate::protocol::ProtocolDescriptor;

/// Ordinal of a schema within a protocol's history: `0` is the oldest,
/// `previous_schemas.len()` is the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion(usize);

impl SchemaVersion {
    /// Builds a version from its ordinal.
    pub const fn new(ordinal: usize) -> Self {
        Self(ordinal)
    }

    /// The ordinal.
    pub const fn ordinal(self) -> usize {
        self.0
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl ProtocolDescriptor {
    /// The version of the current schema.
    pub fn current_version(&self) -> SchemaVersion {
        SchemaVersion(self.previous_schemas.len())
    }

    /// Resolves schema text found in a stream header.
    ///
    /// Previous schemas are checked first, in order, so a schema text that
    /// appears in the history resolves to its oldest position.
    pub fn version_of(&self, schema: &str) -> Result<SchemaVersion> {
        if let Some(ordinal) = self.previous_schemas.iter().position(|s| *s == schema) {
            return Ok(SchemaVersion(ordinal));
        }
        if self.schema == schema {
            return Ok(self.current_version());
        }
        Err(StepcodeError::IncompatibleSchema { protocol: self.name })
    }

    /// The schema text of a version, or `None` if the protocol has no such version.
    pub fn schema_for(&self, version: SchemaVersion) -> Option<&'static str> {
        match version.0.cmp(&self.previous_schemas.len()) {
            std::cmp::Ordering::Less => Some(self.previous_schemas[version.0]),
            std::cmp::Ordering::Equal => Some(self.schema),
            std::cmp::Ordering::Greater => None,
        }
    }
}

/// Maps the union discriminants of an older schema onto the alternatives of
/// the current union type.
///
/// Entry `i` holds the current alternative index for old discriminant `i`, or
/// `None` when that alternative no longer exists.
#[derive(Debug, Clone, Copy)]
pub struct UnionRemap {
    table: &'static [Option<usize>],
}

impl UnionRemap {
    /// Wraps a remapping table.
    pub const fn new(table: &'static [Option<usize>]) -> Self {
        Self { table }
    }

    /// Number of alternatives in the older union.
    pub fn legacy_alternatives(&self) -> usize {
        self.table.len()
    }

    /// Translates an old discriminant.
    pub fn resolve(&self, legacy_index: usize) -> Result<usize> {
        match self.table.get(legacy_index) {
            Some(Some(current)) => Ok(*current),
            Some(None) => Err(StepcodeError::Conversion(format!(
                "union alternative {legacy_index} has no counterpart in the current type"
            ))),
            None => Err(StepcodeError::Format(format!(
                "union index {legacy_index} out of range for {} alternatives",
                self.table.len()
            ))),
        }
    }
}

/// Re-typing helpers for values whose declared type changed between schemas.
pub mod convert {
    use super::*;

    /// Parses text written under an older schema into the current type.
    pub fn parse<T>(text: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        text.trim().parse().map_err(|e: T::Err| {
            StepcodeError::Conversion(format!(
                "cannot convert '{text}' to {}: {e}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Renders a value written under an older schema as text.
    pub fn format<T: fmt::Display>(value: &T) -> String {
        value.to_string()
    }

    /// Narrows or widens an integer, failing if the value does not fit.
    pub fn integer<T, U>(value: T) -> Result<U>
    where
        T: Copy + fmt::Display,
        U: TryFrom<T>,
    {
        U::try_from(value).map_err(|_| {
            StepcodeError::Conversion(format!(
                "{value} does not fit in {}",
                std::any::type_name::<U>()
            ))
        })
    }
}

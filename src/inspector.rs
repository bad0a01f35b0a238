// src/inspector.rs

//! Tools for inspecting the physical structure of stepcode files.
//! Useful for checking what schema a file was written with and how its
//! streams were chunked into blocks.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use serde::Serialize;

use crate::constants::DEFAULT_BUFFER_SIZE;
use crate::error::{Result, StepcodeError};
use crate::format::read_header;
use crate::index::{INDEX_POINTER_SIZE, StreamIndex};
use crate::io::CodedInputStream;
use crate::protocol::ProtocolDescriptor;
use crate::schema::SchemaVersion;

/// A structural report of a stepcode file.
#[derive(Debug, Serialize)]
pub struct FileReport {
    /// Total size of the file in bytes.
    pub file_size: u64,
    /// Format version from the header.
    pub format_version: u32,
    /// Schema text from the header.
    pub schema: String,
    /// Offset where the first step starts.
    pub payload_offset: u64,
    /// The trailing index, if the file has a valid one.
    pub index: Option<IndexReport>,
}

/// Summary of a trailing index.
#[derive(Debug, Serialize)]
pub struct IndexReport {
    /// Offset where the index section starts.
    pub offset: u64,
    /// Indexed steps, in file order.
    pub steps: Vec<StepInfo>,
}

/// Where a step lives and, for streams, how it was written.
#[derive(Debug, Serialize)]
pub struct StepInfo {
    /// Step name.
    pub name: String,
    /// Absolute offset of the step.
    pub offset: u64,
    /// Number of stream items, for streams with at least one item.
    pub items: Option<u64>,
    /// Number of stream blocks, for streams with at least one item.
    pub blocks: Option<usize>,
}

impl FileReport {
    /// Resolves the file's schema against a protocol's schema history.
    pub fn schema_version(&self, protocol: &ProtocolDescriptor) -> Result<SchemaVersion> {
        protocol.version_of(&self.schema)
    }

    /// Size of the payload, excluding header and index.
    pub fn payload_size(&self) -> u64 {
        let end = self.index.as_ref().map_or(self.file_size, |i| i.offset);
        end.saturating_sub(self.payload_offset)
    }
}

/// The stepcode inspector tool.
#[derive(Debug)]
pub struct StepcodeInspector;

impl StepcodeInspector {
    /// Analyzes a file and returns a structural report.
    pub fn inspect<P: AsRef<Path>>(path: P) -> Result<FileReport> {
        Self::inspect_source(File::open(path)?)
    }

    /// Analyzes any seekable source positioned at the start of a stream.
    pub fn inspect_source<R: Read + Seek>(mut source: R) -> Result<FileReport> {
        let start = source.stream_position()?;
        let file_size = source.seek(std::io::SeekFrom::End(0))?;
        source.seek(std::io::SeekFrom::Start(start))?;

        let mut stream = CodedInputStream::with_offset(source, DEFAULT_BUFFER_SIZE, start);
        let header = read_header(&mut stream)?;
        let payload_offset = stream.pos();

        // A file without an index is still a valid file.
        let index = match StreamIndex::read_from(&mut stream) {
            Ok(index) => Some(Self::index_report(&mut stream, &index)?),
            Err(StepcodeError::Index(_)) => None,
            Err(e) => return Err(e),
        };

        Ok(FileReport {
            file_size,
            format_version: header.version,
            schema: header.schema,
            payload_offset,
            index,
        })
    }

    fn index_report<R: Read + Seek>(
        stream: &mut CodedInputStream<R>,
        index: &StreamIndex,
    ) -> Result<IndexReport> {
        stream.seek(-(INDEX_POINTER_SIZE as i64))?;
        let offset = stream.read_fixed_u64()?;

        let mut steps: Vec<StepInfo> = index
            .steps()
            .map(|(name, offset)| {
                let items = index.count_stream(name);
                StepInfo {
                    name: name.to_owned(),
                    offset,
                    items: (items > 0).then_some(items),
                    blocks: (items > 0).then(|| index.block_count(name)),
                }
            })
            .collect();
        steps.sort_by_key(|s| s.offset);

        Ok(IndexReport { offset, steps })
    }
}

impl std::fmt::Display for FileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== STEPCODE INSPECTOR REPORT ===")?;
        writeln!(f, "File Size:      {}", self.file_size)?;
        writeln!(f, "Format Version: {}", self.format_version)?;
        writeln!(f, "Payload:        {} bytes at {}", self.payload_size(), self.payload_offset)?;
        writeln!(f, "Schema:         {}", self.schema)?;
        match &self.index {
            None => writeln!(f, "\n[NO INDEX]"),
            Some(index) => {
                writeln!(f, "\n[INDEX @ {}]", index.offset)?;
                for (i, step) in index.steps.iter().enumerate() {
                    let connector = if i + 1 == index.steps.len() { "└── " } else { "├── " };
                    let stream = match (step.items, step.blocks) {
                        (Some(items), Some(blocks)) => {
                            format!(" | Items: {items} in {blocks} blocks")
                        }
                        _ => String::new(),
                    };
                    writeln!(f, "{connector}{} @ {}{stream}", step.name, step.offset)?;
                }
                Ok(())
            }
        }
    }
}

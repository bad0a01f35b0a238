//! A `SensorLog` protocol facade, written the way a schema compiler emits one:
//! a static descriptor, the record types, one method per step, and a decoder
//! table per schema version.
//!
//! Version history:
//! - v0: `Header.gain` is an `int8`, `Header.note` does not exist,
//!   `Sample.channel` is a `uint32`, and `Reading` has the alternatives
//!   `[label, scalar, counts, obsolete]`.
//! - v1 (current): `gain` is an `int32`, `note` is an optional string,
//!   `channel` is a string, and `Reading` is `[missing, scalar, counts, label]`.

#![allow(dead_code)]
#![allow(missing_docs)]

use std::io::{Read, Seek, Write};

use stepcode::codec::read_union_index;
use stepcode::copy::{copy_step, copy_stream};
use stepcode::io::CodedInputStream;
use stepcode::protocol::{ProtocolDescriptor, StepDecoder, StepDescriptor, StepReader, StepWriter};
use stepcode::schema::{convert, UnionRemap};
use stepcode::{
    BinaryCodec, BinaryReader, BinaryWriter, IndexedBinaryReader, IndexedBinaryWriter, Result,
    SchemaVersion, StepcodeError,
};

pub const SCHEMA_V0: &str = r#"{"protocol":{"name":"SensorLog","sequence":[{"name":"header","type":"SensorLog.Header"},{"name":"id","type":"int64"},{"name":"samples","type":{"stream":{"items":"SensorLog.Sample"}}},{"name":"footer","type":[null,"string"]}]},"types":[{"name":"Header","fields":[{"name":"subject","type":"string"},{"name":"gain","type":"int8"},{"name":"units","type":"SensorLog.Units"},{"name":"matrix","type":{"array":{"items":"float32","dimensions":[2,2]}}}]},{"name":"Reading","type":["string","float64",{"vector":{"items":"uint32"}},"uint8"]},{"name":"Sample","fields":[{"name":"timestamp","type":"uint64"},{"name":"reading","type":"SensorLog.Reading"},{"name":"channel","type":"uint32"}]}]}"#;

pub const SCHEMA_V1: &str = r#"{"protocol":{"name":"SensorLog","sequence":[{"name":"header","type":"SensorLog.Header"},{"name":"id","type":"int64"},{"name":"samples","type":{"stream":{"items":"SensorLog.Sample"}}},{"name":"footer","type":[null,"string"]}]},"types":[{"name":"Header","fields":[{"name":"subject","type":"string"},{"name":"gain","type":"int32"},{"name":"units","type":"SensorLog.Units"},{"name":"matrix","type":{"array":{"items":"float32","dimensions":[2,2]}}},{"name":"note","type":[null,"string"]}]},{"name":"Reading","type":[null,"float64",{"vector":{"items":"uint32"}},"string"]},{"name":"Sample","fields":[{"name":"timestamp","type":"uint64"},{"name":"reading","type":"SensorLog.Reading"},{"name":"channel","type":"string"}]}]}"#;

pub const HEADER: usize = 0;
pub const ID: usize = 1;
pub const SAMPLES: usize = 2;
pub const FOOTER: usize = 3;

const STEPS: &[StepDescriptor] = &[
    StepDescriptor::scalar("header"),
    StepDescriptor::scalar("id"),
    StepDescriptor::stream("samples"),
    StepDescriptor::scalar("footer"),
];

pub static SENSOR_LOG: ProtocolDescriptor = ProtocolDescriptor {
    name: "SensorLog",
    steps: STEPS,
    schema: SCHEMA_V1,
    previous_schemas: &[SCHEMA_V0],
};

/// The same protocol as it was declared when v0 was current. Writing with it
/// produces exactly what a v0 build of the facade produced.
pub static SENSOR_LOG_V0: ProtocolDescriptor = ProtocolDescriptor {
    name: "SensorLog",
    steps: STEPS,
    schema: SCHEMA_V0,
    previous_schemas: &[],
};

// --- Current types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, BinaryCodec)]
#[repr(i16)]
pub enum Units {
    Raw = -1,
    Millivolts = 1,
    Volts = 2,
}

#[derive(Debug, Clone, PartialEq, BinaryCodec)]
pub struct Header {
    pub subject: String,
    pub gain: i32,
    pub units: Units,
    pub matrix: [[f32; 2]; 2],
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, BinaryCodec)]
pub enum Reading {
    Missing,
    Scalar(f64),
    Counts(Vec<u32>),
    Label(String),
}

#[derive(Debug, Clone, PartialEq, BinaryCodec)]
pub struct Sample {
    pub timestamp: u64,
    pub reading: Reading,
    pub channel: String,
}

// --- v0 wire shapes ---

#[derive(Debug, Clone, PartialEq, BinaryCodec)]
pub struct HeaderV0 {
    pub subject: String,
    pub gain: i8,
    pub units: Units,
    pub matrix: [[f32; 2]; 2],
}

#[derive(Debug, Clone, PartialEq, BinaryCodec)]
pub enum ReadingV0 {
    Label(String),
    Scalar(f64),
    Counts(Vec<u32>),
    Obsolete(u8),
}

#[derive(Debug, Clone, PartialEq, BinaryCodec)]
pub struct SampleV0 {
    pub timestamp: u64,
    pub reading: ReadingV0,
    pub channel: u32,
}

const READING_V0: UnionRemap = UnionRemap::new(&[Some(3), Some(1), Some(2), None]);

fn header_v0<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Header> {
    let old = HeaderV0::read(stream)?;
    Ok(Header {
        subject: old.subject,
        gain: i32::from(old.gain),
        units: old.units,
        matrix: old.matrix,
        note: None,
    })
}

fn reading_v0<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Reading> {
    let legacy = read_union_index(stream, READING_V0.legacy_alternatives())?;
    Ok(match READING_V0.resolve(legacy)? {
        1 => Reading::Scalar(f64::read(stream)?),
        2 => Reading::Counts(Vec::read(stream)?),
        3 => Reading::Label(String::read(stream)?),
        other => {
            return Err(StepcodeError::Format(format!("invalid Reading alternative {other}")));
        }
    })
}

fn sample_v0<R: Read>(stream: &mut CodedInputStream<R>) -> Result<Sample> {
    let timestamp = u64::read(stream)?;
    let reading = reading_v0(stream)?;
    let channel = u32::read(stream)?;
    Ok(Sample { timestamp, reading, channel: convert::format(&channel) })
}

/// Per-version decoders for the steps whose wire shape changed.
pub struct Decoders<R: Read> {
    pub header: StepDecoder<R, Header>,
    pub samples: StepDecoder<R, Sample>,
}

impl<R: Read> Decoders<R> {
    pub fn for_version(version: SchemaVersion) -> Self {
        match version.ordinal() {
            0 => Self {
                header: StepDecoder::Legacy(header_v0::<R>),
                samples: StepDecoder::Legacy(sample_v0::<R>),
            },
            _ => Self { header: StepDecoder::Current, samples: StepDecoder::Current },
        }
    }
}

// --- Facade ---

pub struct SensorLogWriter<W: StepWriter> {
    inner: W,
}

impl<W: Write> SensorLogWriter<BinaryWriter<W>> {
    pub fn binary(sink: W) -> Result<Self> {
        Ok(Self { inner: BinaryWriter::new(sink, &SENSOR_LOG)? })
    }
}

impl<W: Write + Seek> SensorLogWriter<IndexedBinaryWriter<W>> {
    pub fn indexed(sink: W) -> Result<Self> {
        Ok(Self { inner: IndexedBinaryWriter::new(sink, &SENSOR_LOG)? })
    }
}

impl<W: StepWriter> SensorLogWriter<W> {
    pub fn from_backend(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_header(&mut self, value: &Header) -> Result<()> {
        self.inner.write_step(HEADER, value)
    }

    pub fn write_id(&mut self, value: &i64) -> Result<()> {
        self.inner.write_step(ID, value)
    }

    pub fn write_samples(&mut self, value: &Sample) -> Result<()> {
        self.inner.write_stream_item(SAMPLES, value)
    }

    pub fn write_samples_batch(&mut self, values: &[Sample]) -> Result<()> {
        self.inner.write_stream_items(SAMPLES, values)
    }

    pub fn end_samples(&mut self) -> Result<()> {
        self.inner.end_stream(SAMPLES)
    }

    pub fn write_footer(&mut self, value: &Option<String>) -> Result<()> {
        self.inner.write_step(FOOTER, value)
    }

    pub fn inner(&self) -> &W {
        &self.inner
    }

    pub fn close(self) -> Result<W::Output> {
        self.inner.close()
    }
}

pub struct SensorLogReader<R: StepReader> {
    inner: R,
    decoders: Decoders<R::Source>,
}

impl<R: Read> SensorLogReader<BinaryReader<R>> {
    pub fn binary(source: R) -> Result<Self> {
        Ok(Self::from_backend(BinaryReader::new(source, &SENSOR_LOG)?))
    }
}

impl<R: Read + Seek> SensorLogReader<IndexedBinaryReader<R>> {
    pub fn indexed(source: R) -> Result<Self> {
        Ok(Self::from_backend(IndexedBinaryReader::new(source, &SENSOR_LOG)?))
    }

    pub fn count_samples(&self) -> Result<u64> {
        self.inner.count_stream(SAMPLES)
    }

    pub fn seek_samples(&mut self, item: u64) -> Result<bool> {
        self.inner.seek_stream_item(SAMPLES, item)
    }

    pub fn seek_footer(&mut self) -> Result<()> {
        self.inner.seek_step(FOOTER)
    }
}

impl<R: StepReader> SensorLogReader<R> {
    pub fn from_backend(inner: R) -> Self {
        let decoders = Decoders::for_version(inner.schema_version());
        Self { inner, decoders }
    }

    pub fn schema_version(&self) -> SchemaVersion {
        self.inner.schema_version()
    }

    pub fn read_header(&mut self) -> Result<Header> {
        self.inner.read_step(HEADER, self.decoders.header)
    }

    pub fn read_id(&mut self) -> Result<i64> {
        self.inner.read_step(ID, StepDecoder::Current)
    }

    pub fn read_samples(&mut self) -> Result<Option<Sample>> {
        self.inner.read_stream_item(SAMPLES, self.decoders.samples)
    }

    pub fn read_samples_batch(&mut self, values: &mut Vec<Sample>, max: usize) -> Result<bool> {
        self.inner.read_stream_items(SAMPLES, self.decoders.samples, values, max)
    }

    pub fn read_footer(&mut self) -> Result<Option<String>> {
        self.inner.read_step(FOOTER, StepDecoder::Current)
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn close(self) -> Result<R::Output> {
        self.inner.close()
    }

    /// Drains every step into `writer`, moving samples in batches of `samples_buffer`.
    pub fn copy_to<W: StepWriter>(
        &mut self,
        writer: &mut SensorLogWriter<W>,
        samples_buffer: usize,
    ) -> Result<()> {
        copy_step(&mut self.inner, &mut writer.inner, HEADER, self.decoders.header)?;
        copy_step::<i64, _, _>(&mut self.inner, &mut writer.inner, ID, StepDecoder::Current)?;
        copy_stream(
            &mut self.inner,
            &mut writer.inner,
            SAMPLES,
            self.decoders.samples,
            samples_buffer,
        )?;
        copy_step::<Option<String>, _, _>(
            &mut self.inner,
            &mut writer.inner,
            FOOTER,
            StepDecoder::Current,
        )
    }
}

// --- Fixtures ---

/// Everything one `SensorLog` stream carries.
#[derive(Debug, Clone, PartialEq)]
pub struct LogData {
    pub header: Header,
    pub id: i64,
    pub samples: Vec<Sample>,
    pub footer: Option<String>,
}

pub fn sample(i: u64) -> Sample {
    let reading = match i % 4 {
        0 => Reading::Missing,
        1 => Reading::Scalar(i as f64 * 0.25),
        2 => Reading::Counts((0..(i % 5) as u32).collect()),
        _ => Reading::Label(format!("mark-{i}")),
    };
    Sample { timestamp: 1_000 + i, reading, channel: format!("ch{}", i % 3) }
}

pub fn log_data(samples: u64) -> LogData {
    LogData {
        header: Header {
            subject: "bench-rig".to_string(),
            gain: -5,
            units: Units::Millivolts,
            matrix: [[1.0, 0.5], [-0.5, 1.0]],
            note: Some("calibrated".to_string()),
        },
        id: -42,
        samples: (0..samples).map(sample).collect(),
        footer: Some("done".to_string()),
    }
}

/// Writes `data` with stream batches of `batch` items (one at a time if `batch` <= 1).
pub fn write_log<W: StepWriter>(
    writer: &mut SensorLogWriter<W>,
    data: &LogData,
    batch: usize,
) -> Result<()> {
    writer.write_header(&data.header)?;
    writer.write_id(&data.id)?;
    if batch <= 1 {
        for s in &data.samples {
            writer.write_samples(s)?;
        }
    } else {
        for chunk in data.samples.chunks(batch) {
            writer.write_samples_batch(chunk)?;
        }
    }
    writer.end_samples()?;
    writer.write_footer(&data.footer)
}

/// Reads a whole stream, samples in batches of `batch` (one at a time if `batch` <= 1).
pub fn read_log<R: StepReader>(reader: &mut SensorLogReader<R>, batch: usize) -> Result<LogData> {
    let header = reader.read_header()?;
    let id = reader.read_id()?;
    let mut samples = Vec::new();
    if batch <= 1 {
        while let Some(s) = reader.read_samples()? {
            samples.push(s);
        }
    } else {
        let mut buffer = Vec::with_capacity(batch);
        while reader.read_samples_batch(&mut buffer, batch)? {
            samples.append(&mut buffer);
        }
    }
    let footer = reader.read_footer()?;
    Ok(LogData { header, id, samples, footer })
}

pub fn encode_log(data: &LogData, batch: usize) -> Result<Vec<u8>> {
    let mut writer = SensorLogWriter::binary(Vec::new())?;
    write_log(&mut writer, data, batch)?;
    writer.close()
}

pub fn decode_log(bytes: &[u8], batch: usize) -> Result<LogData> {
    let mut reader = SensorLogReader::binary(bytes)?;
    let data = read_log(&mut reader, batch)?;
    reader.close()?;
    Ok(data)
}

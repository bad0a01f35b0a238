#![allow(missing_docs)]

mod common;

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use common::*;
use proptest::prelude::*;
use stepcode::index::{StreamIndex, INDEX_MAGIC_BYTES};
use stepcode::{IndexedBinaryReader, IndexedBinaryWriter, Result, StepcodeError};
use tempfile::NamedTempFile;

/// Writes `data` through an indexed writer, cutting the sample stream into
/// the given chunk sizes (cycled; 1 means a single-item call).
fn write_indexed(data: &LogData, chunks: &[usize]) -> Result<Vec<u8>> {
    let mut writer = SensorLogWriter::indexed(Cursor::new(Vec::new()))?;
    writer.write_header(&data.header)?;
    writer.write_id(&data.id)?;
    let mut rest = &data.samples[..];
    let mut sizes = chunks.iter().copied().cycle();
    while !rest.is_empty() {
        let size = sizes.next().unwrap_or(1).clamp(1, rest.len());
        let (head, tail) = rest.split_at(size);
        if size == 1 {
            writer.write_samples(&head[0])?;
        } else {
            writer.write_samples_batch(head)?;
        }
        rest = tail;
    }
    writer.end_samples()?;
    writer.write_footer(&data.footer)?;
    Ok(writer.close()?.into_inner())
}

#[test]
fn indexed_payload_is_the_plain_payload() -> Result<()> {
    let data = log_data(8);
    let indexed = write_indexed(&data, &[3])?;
    let plain = encode_log(&data, 3)?;
    assert_eq!(&indexed[..plain.len()], &plain[..]);

    let trailer = &indexed[indexed.len() - 8..];
    let index_offset = u64::from_le_bytes(trailer.try_into().expect("8 bytes"));
    assert_eq!(index_offset, plain.len() as u64);
    assert_eq!(&indexed[plain.len()..plain.len() + INDEX_MAGIC_BYTES.len()], &INDEX_MAGIC_BYTES);

    // A plain reader sees the same protocol, but not the trailing section.
    let mut reader = SensorLogReader::binary(&indexed[..])?;
    assert_eq!(read_log(&mut reader, 1)?, data);
    assert!(matches!(reader.close(), Err(StepcodeError::Format(_))));
    Ok(())
}

#[test]
fn sequential_reads_through_the_indexed_reader() -> Result<()> {
    let data = log_data(11);
    let bytes = write_indexed(&data, &[1, 4])?;
    let mut reader = SensorLogReader::indexed(Cursor::new(bytes))?;
    assert_eq!(reader.count_samples()?, 11);
    assert_eq!(read_log(&mut reader, 3)?, data);
    reader.close()?;
    Ok(())
}

#[test]
fn seeking_to_a_step_and_back() -> Result<()> {
    let data = log_data(5);
    let bytes = write_indexed(&data, &[2])?;
    let mut reader = SensorLogReader::indexed(Cursor::new(bytes))?;

    reader.seek_footer()?;
    assert_eq!(reader.read_footer()?, data.footer);

    reader.seek_samples(3)?;
    assert_eq!(reader.read_samples()?, Some(data.samples[3].clone()));
    assert_eq!(reader.read_samples()?, Some(data.samples[4].clone()));
    assert_eq!(reader.read_samples()?, None);
    assert_eq!(reader.read_footer()?, data.footer);
    Ok(())
}

#[test]
fn out_of_range_item_does_not_move_the_reader() -> Result<()> {
    let data = log_data(3);
    let bytes = write_indexed(&data, &[3])?;
    let mut reader = SensorLogReader::indexed(Cursor::new(bytes))?;
    assert!(!reader.seek_samples(3)?);
    assert_eq!(reader.read_header()?, data.header);
    Ok(())
}

#[test]
fn empty_stream_has_no_items_to_find() -> Result<()> {
    let data = log_data(0);
    let bytes = write_indexed(&data, &[1])?;
    let mut reader = SensorLogReader::indexed(Cursor::new(bytes))?;
    assert_eq!(reader.count_samples()?, 0);
    assert!(!reader.seek_samples(0)?);

    let index = reader.inner().index();
    assert!(matches!(index.find_stream_item("samples", 0), Err(StepcodeError::Index(_))));
    // The end marker still gives the stream a location.
    assert!(index.step_offset("samples").is_ok());
    Ok(())
}

#[test]
fn index_on_a_file() -> Result<()> {
    let data = log_data(6);
    let file = NamedTempFile::new()?;
    {
        let mut writer = SensorLogWriter::from_backend(IndexedBinaryWriter::create(
            file.path(),
            &SENSOR_LOG,
        )?);
        write_log(&mut writer, &data, 4)?;
        writer.close()?;
    }
    let backend = IndexedBinaryReader::open(file.path(), &SENSOR_LOG)?;
    let mut reader = SensorLogReader::from_backend(backend);
    assert!(reader.seek_samples(5)?);
    assert_eq!(reader.read_samples()?, Some(data.samples[5].clone()));
    Ok(())
}

#[test]
fn index_alone_round_trips() -> Result<()> {
    use stepcode::io::{CodedInputStream, CodedOutputStream};

    let mut index = StreamIndex::new();
    index.set_step_offset("header", 12);
    index.set_step_offset("header", 99);
    index.add_stream_offsets("samples", &[40, 44, 48]);
    index.add_stream_offset("samples", 60);

    let mut out = CodedOutputStream::new(Cursor::new(Vec::new()), 64);
    index.write_to(&mut out)?;
    let bytes = out.into_inner()?.into_inner();

    let mut input = CodedInputStream::new(Cursor::new(bytes), 64);
    let loaded = StreamIndex::read_from(&mut input)?;
    assert_eq!(loaded, index);
    assert_eq!(loaded.step_offset("header")?, 12);
    assert_eq!(loaded.count_stream("samples"), 4);
    assert_eq!(loaded.block_count("samples"), 2);

    let location = loaded.find_stream_item("samples", 1)?;
    assert_eq!((location.offset, location.remaining_in_block), (44, 2));
    let location = loaded.find_stream_item("samples", 3)?;
    assert_eq!((location.offset, location.remaining_in_block), (60, 1));
    Ok(())
}

#[test]
fn corrupted_index_is_an_index_error() -> Result<()> {
    let data = log_data(2);
    let mut bytes = write_indexed(&data, &[1])?;
    let len = bytes.len();
    // Point the trailer at the middle of the payload.
    bytes[len - 8..].copy_from_slice(&20u64.to_le_bytes());
    assert!(matches!(
        IndexedBinaryReader::new(Cursor::new(bytes), &SENSOR_LOG),
        Err(StepcodeError::Index(_))
    ));
    Ok(())
}

/// Storage that reads and writes but cannot report or change its position.
#[derive(Debug)]
struct Pipe<T>(T);

impl<T: Read> Read for Pipe<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<T: Write> Write for Pipe<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<T> Seek for Pipe<T> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "pipe is not seekable"))
    }
}

#[test]
fn unseekable_storage_fails_fast() -> Result<()> {
    let Err(StepcodeError::Index(msg)) = IndexedBinaryWriter::new(Pipe(Vec::new()), &SENSOR_LOG)
    else {
        panic!("an unseekable sink must be rejected with an index error");
    };
    assert!(msg.contains("cannot build index"), "{msg}");

    let bytes = write_indexed(&log_data(3), &[2])?;
    let Err(StepcodeError::Index(msg)) = IndexedBinaryReader::new(Pipe(&bytes[..]), &SENSOR_LOG)
    else {
        panic!("an unseekable source must be rejected with an index error");
    };
    assert!(msg.contains("cannot read index"), "{msg}");
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn every_item_is_reachable_by_seek(
        count in 0u64..40,
        chunks in prop::collection::vec(1usize..7, 1..6),
    ) {
        let data = log_data(count);
        let bytes = write_indexed(&data, &chunks).expect("write");
        let mut reader = SensorLogReader::indexed(Cursor::new(bytes)).expect("open");
        prop_assert_eq!(reader.count_samples().expect("count"), count);

        for i in 0..count {
            prop_assert!(reader.seek_samples(i).expect("seek"));
            let item = reader.read_samples().expect("read");
            prop_assert_eq!(item.as_ref(), data.samples.get(i as usize));
        }

        // After seeking, batched reads continue across block boundaries.
        if count > 0 {
            let start = count / 2;
            prop_assert!(reader.seek_samples(start).expect("seek"));
            let mut rest = Vec::new();
            let mut buffer = Vec::new();
            while reader.read_samples_batch(&mut buffer, 5).expect("batch") {
                rest.append(&mut buffer);
            }
            prop_assert_eq!(&rest[..], &data.samples[start as usize..]);
        }
    }
}

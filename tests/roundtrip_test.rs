#![allow(missing_docs)]

mod common;

use common::*;
use stepcode::{BinaryReader, BinaryWriter, Result, SchemaVersion, StepcodeError};
use tempfile::NamedTempFile;

#[test]
fn every_value_shape_survives_a_round_trip() -> Result<()> {
    // Samples cycle through every Reading alternative, including the unit one.
    let data = log_data(12);
    let bytes = encode_log(&data, 5)?;
    assert_eq!(decode_log(&bytes, 1)?, data);
    Ok(())
}

#[test]
fn empty_optionals_and_empty_stream() -> Result<()> {
    let mut data = log_data(0);
    data.header.note = None;
    data.footer = None;
    let bytes = encode_log(&data, 1)?;
    assert_eq!(decode_log(&bytes, 1)?, data);
    assert_eq!(decode_log(&bytes, 3)?, data);
    Ok(())
}

#[test]
fn current_data_resolves_to_the_current_version() -> Result<()> {
    let bytes = encode_log(&log_data(1), 1)?;
    let reader = SensorLogReader::binary(&bytes[..])?;
    assert_eq!(reader.schema_version(), SENSOR_LOG.current_version());
    assert_eq!(reader.schema_version(), SchemaVersion::new(1));
    Ok(())
}

#[test]
fn file_round_trip_with_plain_and_mapped_readers() -> Result<()> {
    let data = log_data(40);
    let file = NamedTempFile::new()?;

    let mut writer = SensorLogWriter::binary(Vec::new())?;
    write_log(&mut writer, &data, 7)?;
    std::fs::write(file.path(), writer.close()?)?;

    let mut reader = SensorLogReader::from_backend(BinaryReader::open(file.path(), &SENSOR_LOG)?);
    assert_eq!(read_log(&mut reader, 16)?, data);
    reader.close()?;

    let mut mapped =
        SensorLogReader::from_backend(BinaryReader::open_mapped(file.path(), &SENSOR_LOG)?);
    assert_eq!(read_log(&mut mapped, 1)?, data);
    mapped.close()?;
    Ok(())
}

#[test]
fn create_writes_a_file_directly() -> Result<()> {
    let data = log_data(3);
    let file = NamedTempFile::new()?;
    {
        let backend = BinaryWriter::create(file.path(), &SENSOR_LOG)?;
        let mut writer = SensorLogWriter::from_backend(backend);
        write_log(&mut writer, &data, 1)?;
        writer.close()?;
    }
    assert_eq!(std::fs::read(file.path())?, encode_log(&data, 1)?);
    Ok(())
}

#[test]
fn trailing_bytes_fail_close() -> Result<()> {
    let data = log_data(2);
    let mut bytes = encode_log(&data, 1)?;
    bytes.push(0xAA);

    let mut reader = SensorLogReader::binary(&bytes[..])?;
    assert_eq!(read_log(&mut reader, 1)?, data);
    assert!(matches!(reader.close(), Err(StepcodeError::Format(_))));
    Ok(())
}

#[test]
fn copy_to_rewrites_between_backends() -> Result<()> {
    use std::io::Cursor;

    let data = log_data(9);
    let bytes = encode_log(&data, 1)?;

    for buffer in [1, 4, 100] {
        let mut reader = SensorLogReader::binary(&bytes[..])?;
        let mut writer = SensorLogWriter::indexed(Cursor::new(Vec::new()))?;
        reader.copy_to(&mut writer, buffer)?;
        reader.close()?;
        let copied = writer.close()?.into_inner();

        let mut indexed = SensorLogReader::indexed(Cursor::new(copied))?;
        assert_eq!(indexed.count_samples()?, 9);
        assert_eq!(read_log(&mut indexed, 2)?, data);
    }
    Ok(())
}

//! Step-by-step copying from a reader to a writer of the same protocol.
//!
//! A protocol facade's `copy_to` is a sequence of these calls, one per step in
//! protocol order. Because both ends are traits, the same code converts between
//! backends, adds or strips an index, and rewrites data from an older schema in
//! the current one (the reader's decoders do the upgrading).

use tracing::trace;

use crate::codec::BinaryCodec;
use crate::error::Result;
use crate::protocol::{StepDecoder, StepReader, StepWriter};

/// Copies the value of scalar `step`.
pub fn copy_step<T, Rd, Wr>(
    reader: &mut Rd,
    writer: &mut Wr,
    step: usize,
    decoder: StepDecoder<Rd::Source, T>,
) -> Result<()>
where
    T: BinaryCodec,
    Rd: StepReader,
    Wr: StepWriter,
{
    let value = reader.read_step(step, decoder)?;
    writer.write_step(step, &value)
}

/// Copies every item of stream `step` and ends the stream on the writer.
///
/// With `buffer_size` greater than one, items move in batches of up to that
/// many; otherwise one at a time. Returns the number of items copied.
pub fn copy_stream<T, Rd, Wr>(
    reader: &mut Rd,
    writer: &mut Wr,
    step: usize,
    decoder: StepDecoder<Rd::Source, T>,
    buffer_size: usize,
) -> Result<u64>
where
    T: BinaryCodec,
    Rd: StepReader,
    Wr: StepWriter,
{
    let mut copied = 0u64;
    if buffer_size > 1 {
        let mut values = Vec::with_capacity(buffer_size);
        while reader.read_stream_items(step, decoder, &mut values, buffer_size)? {
            writer.write_stream_items(step, &values)?;
            copied += values.len() as u64;
        }
    } else {
        while let Some(item) = reader.read_stream_item(step, decoder)? {
            writer.write_stream_item(step, &item)?;
            copied += 1;
        }
    }
    writer.end_stream(step)?;
    trace!(step, copied, buffer_size, "copied stream");
    Ok(copied)
}

//! Call-order enforcement for protocol writers and readers.
//!
//! Both machines are driven by a single integer cursor and know nothing about
//! bytes, so every backend reuses them unchanged. Checks happen before any I/O:
//! a rejected call leaves the stream exactly where it was.
//!
//! ## Writer
//!
//! The cursor is the ordinal of the next step, `0..=n`. A scalar write or a
//! stream end advances it by one; stream item writes leave it in place.
//!
//! ## Reader
//!
//! The cursor runs over `0..=2n`. Step `i` is expected at `2i`. The odd value
//! `2i + 1` means "stream `i` is known to have ended, but the caller has not
//! observed that yet": a batch read that drains the stream parks the cursor
//! there so that the following stream read can report the end without
//! touching the source, while the next step's read may simply proceed.

use crate::error::{Result, StepcodeError};
use crate::protocol::{Direction, MethodName, ProtocolDescriptor};

#[cold]
#[inline(never)]
fn invalid_call(expected: MethodName<'_>, attempted: MethodName<'_>) -> StepcodeError {
    StepcodeError::Protocol(format!(
        "Expected call to {expected} but received call to {attempted} instead."
    ))
}

/// Tracks which step a writer expects next.
#[derive(Debug, Clone)]
pub struct WriterState {
    protocol: &'static ProtocolDescriptor,
    cursor: usize,
}

impl WriterState {
    /// A fresh machine expecting the first step.
    pub fn new(protocol: &'static ProtocolDescriptor) -> Self {
        Self { protocol, cursor: 0 }
    }

    /// The protocol being enforced.
    pub fn protocol(&self) -> &'static ProtocolDescriptor {
        self.protocol
    }

    /// Ordinal of the next expected step; equals the step count once complete.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// True once every step has been written.
    pub fn is_complete(&self) -> bool {
        self.cursor == self.protocol.step_count()
    }

    /// Checks that a write to `step` (a scalar value or a stream item) is allowed.
    pub fn check_write(&self, step: usize) -> Result<()> {
        if self.cursor == step {
            Ok(())
        } else {
            Err(self.error(self.attempted_write(step)))
        }
    }

    /// Checks that ending stream `step` is allowed.
    pub fn check_end(&self, step: usize) -> Result<()> {
        if self.cursor == step {
            Ok(())
        } else {
            let name = self.step_name(step);
            Err(self.error(MethodName::End(name)))
        }
    }

    /// Checks that the protocol may be closed.
    pub fn check_close(&self) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(self.error(MethodName::Close))
        }
    }

    /// Marks `step` as finished. Call after a scalar write or a stream end.
    pub fn complete(&mut self, step: usize) {
        self.cursor = step + 1;
    }

    fn step_name(&self, step: usize) -> &'static str {
        self.protocol.step(step).map_or("<unknown>", |s| s.name)
    }

    fn attempted_write(&self, step: usize) -> MethodName<'static> {
        MethodName::Step(Direction::Write, self.step_name(step))
    }

    #[cold]
    fn error(&self, attempted: MethodName<'_>) -> StepcodeError {
        let expected = match self.protocol.step(self.cursor) {
            Some(s) if s.is_stream() => MethodName::StepOrEnd(s.name),
            Some(s) => MethodName::Step(Direction::Write, s.name),
            None => MethodName::Close,
        };
        invalid_call(expected, attempted)
    }
}

/// What a stream read should do after passing the order check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRead {
    /// Read from the source.
    Proceed,
    /// The stream already ended; report that without reading.
    Finished,
}

/// Tracks which step a reader expects next.
#[derive(Debug, Clone)]
pub struct ReaderState {
    protocol: &'static ProtocolDescriptor,
    cursor: usize,
}

impl ReaderState {
    /// A fresh machine expecting the first step.
    pub fn new(protocol: &'static ProtocolDescriptor) -> Self {
        Self { protocol, cursor: 0 }
    }

    /// The protocol being enforced.
    pub fn protocol(&self) -> &'static ProtocolDescriptor {
        self.protocol
    }

    /// The raw cursor value, `0..=2n`.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// True once every step has been read.
    pub fn is_complete(&self) -> bool {
        self.cursor == 2 * self.protocol.step_count()
    }

    /// Checks that scalar `step` may be read.
    ///
    /// A preceding stream that is known to have ended counts as finished.
    pub fn begin_scalar(&mut self, step: usize) -> Result<()> {
        let expected = 2 * step;
        if self.cursor == expected {
            return Ok(());
        }
        if step > 0 && self.cursor == expected - 1 {
            self.cursor = expected;
            return Ok(());
        }
        Err(self.error(expected))
    }

    /// Marks scalar `step` as read.
    pub fn finish_scalar(&mut self, step: usize) {
        self.cursor = 2 * step + 2;
    }

    /// Checks that stream `step` may be read.
    pub fn begin_stream(&mut self, step: usize) -> Result<StreamRead> {
        let expected = 2 * step;
        if self.cursor == expected {
            return Ok(StreamRead::Proceed);
        }
        if self.cursor == expected + 1 {
            self.cursor = expected + 2;
            return Ok(StreamRead::Finished);
        }
        if step > 0 && self.cursor == expected - 1 {
            self.cursor = expected;
            return Ok(StreamRead::Proceed);
        }
        Err(self.error(expected))
    }

    /// Records that a read of stream `step` observed its end.
    pub fn stream_ended(&mut self, step: usize) {
        self.cursor = 2 * step + 2;
    }

    /// Records that stream `step` has ended but the caller still holds items
    /// from the read that found out.
    pub fn stream_drained(&mut self, step: usize) {
        self.cursor = 2 * step + 1;
    }

    /// Checks that the protocol may be closed.
    pub fn check_close(&self) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(self.error(2 * self.protocol.step_count()))
        }
    }

    /// Repositions the cursor at the start of `step`. Used by random access.
    pub(crate) fn jump_to(&mut self, step: usize) {
        self.cursor = 2 * step;
    }

    fn method(&self, state: usize) -> MethodName<'static> {
        let ordinal = state / 2;
        match self.protocol.step(ordinal) {
            Some(s) => MethodName::Step(Direction::Read, s.name),
            None if ordinal == self.protocol.step_count() => MethodName::Close,
            None => MethodName::Step(Direction::Read, "<unknown>"),
        }
    }

    #[cold]
    fn error(&self, attempted: usize) -> StepcodeError {
        invalid_call(self.method(self.cursor), self.method(attempted))
    }
}

//! Inbound line framing.
//!
//! Wraps `LinesCodec` with a byte limit. An over-long line becomes a
//! single `Inbound::TooLong` frame instead of a stream error, and the rest
//! of it is dropped as it arrives, so at most `max_length` bytes of a line
//! are ever buffered. `\n` ends a line and a trailing `\r` is stripped.

use std::io;

use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

/// One framed unit of client input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A complete line, without its terminator.
    Line(String),
    /// A line exceeded the limit and is being discarded.
    TooLong,
}

/// Line decoder bounded to `max_length` bytes per line.
#[derive(Debug)]
pub struct InboundCodec {
    lines: LinesCodec,
}

impl InboundCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }
}

fn frame(result: Result<Option<String>, LinesCodecError>) -> Result<Option<Inbound>, io::Error> {
    match result {
        Ok(line) => Ok(line.map(Inbound::Line)),
        Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Inbound::TooLong)),
        // Invalid UTF-8 surfaces here as `InvalidData`.
        Err(LinesCodecError::Io(e)) => Err(e),
    }
}

impl Decoder for InboundCodec {
    type Item = Inbound;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Inbound>, io::Error> {
        frame(self.lines.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Inbound>, io::Error> {
        frame(self.lines.decode_eof(buf))
    }
}

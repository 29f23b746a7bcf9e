//! Bounds-checked command stream decoder.
//!
//! The first error is sticky: once a decoder is fatal it yields nothing more.
//! Fewer than [`COMMAND_HEADER_LEN`] trailing bytes end the stream cleanly.

use tracing::trace;

use crate::commands::{Command, DecodedCommand};
use crate::error::DecodeError;
use crate::opcode::{CommandFlags, Opcode, COMMAND_HEADER_LEN};
use crate::wire::WireReader;

pub struct Decoder<'a> {
    reader: WireReader<'a>,
    fatal: Option<DecodeError>,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            reader: WireReader::new(buf),
            fatal: None,
        }
    }

    pub fn has_command(&self) -> bool {
        self.fatal.is_none() && self.reader.remaining() >= COMMAND_HEADER_LEN
    }

    /// Decode the next command, or `None` at end of stream or after a fatal
    /// error.
    pub fn decode_command(&mut self) -> Option<DecodedCommand> {
        if !self.has_command() {
            return None;
        }
        match self.decode_next() {
            Ok(command) => Some(command),
            Err(err) => {
                self.fatal = Some(err);
                None
            }
        }
    }

    fn decode_next(&mut self) -> Result<DecodedCommand, DecodeError> {
        let raw_opcode = self.reader.read_u32()?;
        let flags = CommandFlags::from_bits_truncate(self.reader.read_u32()?);
        let opcode = Opcode::from_raw(raw_opcode).ok_or(DecodeError::UnknownOpcode(raw_opcode))?;
        trace!(%opcode, offset = self.reader.position(), "decoding command");
        let command = Command::decode(opcode, &mut self.reader)?;
        Ok(DecodedCommand { flags, command })
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    pub fn error(&self) -> Option<&DecodeError> {
        self.fatal.as_ref()
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.reader.position()
    }
}

impl Iterator for Decoder<'_> {
    type Item = DecodedCommand;

    fn next(&mut self) -> Option<Self::Item> {
        self.decode_command()
    }
}

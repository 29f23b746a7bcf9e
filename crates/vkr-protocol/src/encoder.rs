use crate::commands::Command;
use crate::opcode::CommandFlags;
use crate::wire::WireWriter;

/// Builds a command stream, as a guest driver would.
#[derive(Debug, Default)]
pub struct CommandEncoder {
    writer: WireWriter,
}

impl CommandEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, flags: CommandFlags, command: &Command) -> &mut Self {
        self.writer.write_u32(command.opcode().as_raw());
        self.writer.write_u32(flags.bits());
        command.encode(&mut self.writer);
        self
    }

    /// Push with `GENERATE_REPLY` set.
    pub fn push_with_reply(&mut self, command: &Command) -> &mut Self {
        self.push(CommandFlags::GENERATE_REPLY, command)
    }

    pub fn len(&self) -> usize {
        self.writer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writer.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.writer.into_bytes()
    }
}

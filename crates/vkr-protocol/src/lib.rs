//! Guest command stream protocol: object kinds, opcodes, typed command
//! records, the bounds-checked decoder and reply encoding.

pub mod commands;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod object;
pub mod opcode;
pub mod reply;
pub mod types;
pub mod wire;

pub use commands::{Command, CreateInfo, DecodedCommand, RecordedCommand};
pub use decoder::Decoder;
pub use encoder::CommandEncoder;
pub use error::DecodeError;
pub use object::{ObjectId, ObjectType, ResourceId};
pub use opcode::{CommandFlags, Opcode, OpcodeDisposition};
pub use reply::{decode_replies, Reply};

//! Reply records written for commands that carry `GENERATE_REPLY`.
//!
//! Each reply is `{opcode: u32, kind: u32}` followed by the kind's body.
//! Result codes are raw `VkResult` values.

use crate::error::DecodeError;
use crate::opcode::Opcode;
use crate::types::{
    ExtensionProperties, MemoryProperties, MemoryRequirements, PhysicalDeviceProperties,
    QueueFamilyProperties,
};
use crate::wire::{Wire, WireReader, WireWriter};

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The call has no return value.
    None,
    Result(i32),
    PhysicalDeviceCount { result: i32, count: u32 },
    PhysicalDeviceProperties(PhysicalDeviceProperties),
    QueueFamilyProperties(Vec<QueueFamilyProperties>),
    MemoryProperties(MemoryProperties),
    ExtensionProperties {
        result: i32,
        extensions: Vec<ExtensionProperties>,
    },
    MemoryRequirements(MemoryRequirements),
}

impl Reply {
    fn kind(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Result(_) => 1,
            Self::PhysicalDeviceCount { .. } => 2,
            Self::PhysicalDeviceProperties(_) => 3,
            Self::QueueFamilyProperties(_) => 4,
            Self::MemoryProperties(_) => 5,
            Self::ExtensionProperties { .. } => 6,
            Self::MemoryRequirements(_) => 7,
        }
    }

    /// The call's result code, when it has one.
    pub fn result(&self) -> Option<i32> {
        match self {
            Self::Result(result)
            | Self::PhysicalDeviceCount { result, .. }
            | Self::ExtensionProperties { result, .. } => Some(*result),
            _ => None,
        }
    }

    pub fn encode(&self, opcode: Opcode, w: &mut WireWriter) {
        w.write_u32(opcode.as_raw());
        w.write_u32(self.kind());
        match self {
            Self::None => {}
            Self::Result(result) => w.write_i32(*result),
            Self::PhysicalDeviceCount { result, count } => {
                w.write_i32(*result);
                w.write_u32(*count);
            }
            Self::PhysicalDeviceProperties(props) => props.encode(w),
            Self::QueueFamilyProperties(families) => families.encode(w),
            Self::MemoryProperties(props) => props.encode(w),
            Self::ExtensionProperties { result, extensions } => {
                w.write_i32(*result);
                extensions.encode(w);
            }
            Self::MemoryRequirements(reqs) => reqs.encode(w),
        }
    }

    fn decode(r: &mut WireReader<'_>) -> Result<(Opcode, Self), DecodeError> {
        let raw_opcode = r.read_u32()?;
        let opcode = Opcode::from_raw(raw_opcode).ok_or(DecodeError::UnknownOpcode(raw_opcode))?;
        let reply = match r.read_u32()? {
            0 => Self::None,
            1 => Self::Result(r.read_i32()?),
            2 => Self::PhysicalDeviceCount {
                result: r.read_i32()?,
                count: r.read_u32()?,
            },
            3 => Self::PhysicalDeviceProperties(Wire::decode(r)?),
            4 => Self::QueueFamilyProperties(Wire::decode(r)?),
            5 => Self::MemoryProperties(Wire::decode(r)?),
            6 => Self::ExtensionProperties {
                result: r.read_i32()?,
                extensions: Wire::decode(r)?,
            },
            7 => Self::MemoryRequirements(Wire::decode(r)?),
            other => {
                return Err(DecodeError::InvalidValue {
                    field: "reply_kind",
                    value: u64::from(other),
                })
            }
        };
        Ok((opcode, reply))
    }
}

/// Parse a whole reply stream.
pub fn decode_replies(buf: &[u8]) -> Result<Vec<(Opcode, Reply)>, DecodeError> {
    let mut r = WireReader::new(buf);
    let mut replies = Vec::new();
    while r.remaining() > 0 {
        replies.push(Reply::decode(&mut r)?);
    }
    Ok(replies)
}

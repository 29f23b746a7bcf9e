#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated at offset {offset}: need {needed} bytes, {remaining} remain")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("count {count} at offset {offset} exceeds the {remaining} remaining bytes")]
    CountTooLarge {
        offset: usize,
        count: usize,
        remaining: usize,
    },

    #[error("unknown opcode 0x{0:04X}")]
    UnknownOpcode(u32),

    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("invalid value {value} for {field}")]
    InvalidValue { field: &'static str, value: u64 },
}

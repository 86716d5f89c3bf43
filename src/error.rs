/// A failure scoped to one class file. Container-level failures use
/// `anyhow` instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("bad magic number 0x{found:08X}")]
    BadMagic { found: u32 },

    #[error("unsupported class file version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("malformed constant pool: {reason} (index {index})")]
    MalformedPool { index: u16, reason: &'static str },

    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag { index: u16, tag: u8 },

    #[error("truncated input: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("unknown opcode 0x{opcode:02X} at code offset {offset}")]
    BadOpcode { offset: usize, opcode: u8 },

    #[error("invalid {attribute} attribute: {reason}")]
    InvalidAttribute {
        attribute: String,
        reason: String,
    },
}

impl DecodeError {
    pub(crate) fn malformed(index: u16, reason: &'static str) -> Self {
        DecodeError::MalformedPool { index, reason }
    }

    pub(crate) fn invalid_attribute(attribute: &str, reason: impl Into<String>) -> Self {
        DecodeError::InvalidAttribute {
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }
}

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

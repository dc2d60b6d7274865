//! fcode 读取错误

use thiserror::Error;

/// fcode result
pub type FcodeResult<T> = Result<T, FcodeError>;

/// Errors raised while reading a pod archive
#[derive(Debug, Error)]
pub enum FcodeError {
    #[error("Bad fcode magic: 0x{0:08X}")]
    BadMagic(u32),

    #[error("Unsupported fcode version: 0x{0:08X}")]
    BadVersion(u32),

    #[error("Truncated {what} at byte {at}")]
    Truncated { what: &'static str, at: usize },

    #[error("Missing pod entry: {0}")]
    MissingEntry(String),

    #[error("Index {index} out of range for {table} table (len {len})")]
    BadIndex {
        table: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Unknown fcode opcode: {0}")]
    UnknownOpcode(u8),

    #[error("Invalid modified UTF-8: {0}")]
    Utf(String),

    #[error("Zip error: {0}")]
    Zip(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

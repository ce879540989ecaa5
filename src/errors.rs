use std::io;
use thiserror::Error;

use crate::format::Opcode;

/// Possible errors that arise from attempting to decompress an EarthBound
/// command stream, or from the I/O around compressing one.
#[derive(Error, Debug)]
pub enum EbError {
    #[error("compressed stream ended before the 0xFF terminator")]
    UnexpectedEndOfStream,

    #[error("corrupt compressed stream: {0}")]
    CorruptStream(#[from] Corruption),

    #[error("{0}")]
    Io(#[source] io::Error),
}

/// The ways a well-framed command stream can still describe impossible output
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
    #[error("escape byte {0:#04x} does not name a command")]
    ReservedCommand(u8),

    #[error("{command} reads from {index:#06x} but only {produced:#x} bytes have been output")]
    CopyOutOfRange {
        command: Opcode,
        index: usize,
        produced: usize,
    },

    #[error("backward copy of {count} bytes from {index:#06x} runs past the start of the output")]
    BackwardUnderflow { index: usize, count: usize },

    #[error("decompressed output would exceed the limit of {limit:#x} bytes")]
    OutputLimit { limit: usize },
}

impl From<io::Error> for EbError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::UnexpectedEof => EbError::UnexpectedEndOfStream,
            _ => EbError::Io(error),
        }
    }
}

//! Compression and decompression for the data compression used by
//! HAL Laboratory's *EarthBound* (SNES).
//!
//! Compressed blocks are a stream of byte-aligned commands (literal bytes,
//! byte and word runs, incrementing runs, and three kinds of copy from the
//! data already decompressed) ended by a `0xFF` byte. See [`format`] for the
//! exact layout.
//!
//! ```
//! let original = b"EarthBound EarthBound EarthBound!!!!!!!!";
//! let compressed = ebcomp::encode(&original[..]).unwrap();
//! let decompressed = ebcomp::decode(&compressed[..]).unwrap();
//! assert_eq!(&original[..], &decompressed[..]);
//! ```

mod decode;
mod encode;
mod errors;
pub mod format;

pub use decode::{decode, Decoder};
pub use encode::{encode, EncoderBuilder, SearchBackend};
pub use errors::{Corruption, EbError};
pub use format::{Command, Opcode, StreamInfo};

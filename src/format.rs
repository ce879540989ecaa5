//! The command stream format used by EarthBound's compressed data.
//!
//! Compressed data is a sequence of commands followed by a single `0xFF`
//! terminator byte. There is no header and no length prefix; a decoder runs
//! until it sees `0xFF` where a command should start.
//!
//! ## Command Header
//! Every command starts with a three bit opcode, followed by the command's
//! count minus one.
//!
//! | Opcode | Command | Arguments |
//! | :----: | ------- | --------- |
//! | `000`  | [`Literal`]          | `count` raw bytes |
//! | `001`  | [`ConstantByte`]     | one byte, written `count` times |
//! | `010`  | [`ConstantWord`]     | one little endian word, written `count` times |
//! | `011`  | [`IncrementingByte`] | one starting byte, incremented (mod 256) for each of `count` bytes |
//! | `100`  | [`ForwardCopy`]      | big endian index into the output produced so far |
//! | `101`  | [`BitReversedCopy`]  | big endian index; each copied byte has its bits reversed |
//! | `110`  | [`BackwardCopy`]     | big endian index; the source walks backward |
//! | `111`  | escape               | a second opcode and a ten bit count |
//!
//! Small counts fit into the same byte as the opcode:
//! ```text
//! CCC LLLLL
//! ```
//! Larger counts (up to 1024) use the escape opcode, and spill into a second byte:
//! ```text
//! 111 CCC LL  LLLLLLLL
//! ```
//! Escape with an inner opcode of `111` is only valid as the terminator `0xFF`.
//!
//! ## An Example
//! Let's compress the ascii string "ACEGACEG". No run command helps with the first
//! four bytes, so they are stored as a literal. The last four bytes are a copy of
//! the bytes starting at output index 0.
//! ```text
//! 000 00011 <- literal, count 4
//! 41 43 45 47 <- "ACEG"
//! 100 00011 <- forward copy, count 4
//! 00 00 <- from index 0x0000
//! FF <- end of stream
//! ```
//!
//! [`Literal`]: Command::Literal
//! [`ConstantByte`]: Command::ConstantByte
//! [`ConstantWord`]: Command::ConstantWord
//! [`IncrementingByte`]: Command::IncrementingByte
//! [`ForwardCopy`]: Command::ForwardCopy
//! [`BitReversedCopy`]: Command::BitReversedCopy
//! [`BackwardCopy`]: Command::BackwardCopy

use crate::errors::{Corruption, EbError};
use bitstream_io::{BitReader, BitWriter, BE};
use smallvec::SmallVec;
use std::fmt;
use std::io::{Read, Write};
use std::iter;

/// The largest count any single command can carry
pub const MAX_COUNT: usize = 1024;
/// Counts at or above this are written with the two byte escape header
pub const LONG_COUNT: usize = 32;
/// Copy commands address the output with a 16-bit index
pub const MAX_COPY_INDEX: usize = u16::MAX as usize;
/// Marks the end of a command stream
pub const TERMINATOR: u8 = 0xFF;

const ESCAPE: u8 = 0b111;
const OPCODE_BITS: u32 = 3;
const SHORT_COUNT_BITS: u32 = 5;
const LONG_COUNT_BITS: u32 = 10;

/// Storage for literal bytes; short literals stay inline
pub type LiteralBytes = SmallVec<[u8; 32]>;

/// The seven commands that can appear in a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Literal = 0,
    ConstantByte = 1,
    ConstantWord = 2,
    IncrementingByte = 3,
    ForwardCopy = 4,
    BitReversedCopy = 5,
    BackwardCopy = 6,
}

impl Opcode {
    /// Number of argument bytes that follow the header for a command with `count`
    pub const fn argument_len(self, count: usize) -> usize {
        match self {
            Self::Literal => count,
            Self::ConstantByte | Self::IncrementingByte => 1,
            Self::ConstantWord => 2,
            Self::ForwardCopy | Self::BitReversedCopy | Self::BackwardCopy => 2,
        }
    }

    /// Total packed size of a command with `count`, header included
    pub const fn encoded_len(self, count: usize) -> usize {
        header_len(count) + self.argument_len(count)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Literal => "Literal",
            Self::ConstantByte => "ConstantByte",
            Self::ConstantWord => "ConstantWord",
            Self::IncrementingByte => "IncrementingByte",
            Self::ForwardCopy => "ForwardCopy",
            Self::BitReversedCopy => "BitReversedCopy",
            Self::BackwardCopy => "BackwardCopy",
        };
        f.write_str(name)
    }
}

/// Size of the opcode and count header for `count`
const fn header_len(count: usize) -> usize {
    if count >= LONG_COUNT {
        2
    } else {
        1
    }
}

/// One decoded or to-be-encoded command.
///
/// `count` is the real repeat count (1..=1024). For [`ConstantWord`](Command::ConstantWord)
/// it counts words, so the command expands to `2 * count` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Literal(LiteralBytes),
    ConstantByte { count: usize, value: u8 },
    ConstantWord { count: usize, value: u16 },
    IncrementingByte { count: usize, start: u8 },
    ForwardCopy { count: usize, index: u16 },
    BitReversedCopy { count: usize, index: u16 },
    BackwardCopy { count: usize, index: u16 },
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Literal(..) => Opcode::Literal,
            Self::ConstantByte { .. } => Opcode::ConstantByte,
            Self::ConstantWord { .. } => Opcode::ConstantWord,
            Self::IncrementingByte { .. } => Opcode::IncrementingByte,
            Self::ForwardCopy { .. } => Opcode::ForwardCopy,
            Self::BitReversedCopy { .. } => Opcode::BitReversedCopy,
            Self::BackwardCopy { .. } => Opcode::BackwardCopy,
        }
    }

    pub fn count(&self) -> usize {
        match *self {
            Self::Literal(ref bytes) => bytes.len(),
            Self::ConstantByte { count, .. }
            | Self::ConstantWord { count, .. }
            | Self::IncrementingByte { count, .. }
            | Self::ForwardCopy { count, .. }
            | Self::BitReversedCopy { count, .. }
            | Self::BackwardCopy { count, .. } => count,
        }
    }

    /// Number of bytes this command adds to the decompressed output
    pub fn output_len(&self) -> usize {
        match self {
            Self::ConstantWord { count, .. } => count * 2,
            _ => self.count(),
        }
    }

    /// Number of bytes this command occupies in the compressed stream
    pub fn encoded_len(&self) -> usize {
        self.opcode().encoded_len(self.count())
    }

    /// Read the next command from `src`, or `None` if the terminator was reached.
    ///
    /// The command comes with the number of stream bytes it was read from. A
    /// stream may use either header form for counts the packer would write
    /// the other way, so this can differ from [`encoded_len()`](Command::encoded_len).
    pub(crate) fn read<R: Read>(
        src: &mut BitReader<R, BE>,
    ) -> Result<Option<(Self, usize)>, EbError> {
        let op: u8 = src.read(OPCODE_BITS)?;
        let (op, stored, header) = if op == ESCAPE {
            let inner: u8 = src.read(OPCODE_BITS)?;
            let high: u16 = src.read(2)?;
            if inner == ESCAPE {
                // 111 111 11 is the terminator; anything else there is unused
                let byte = 0xFC | high as u8;
                return if byte == TERMINATOR {
                    Ok(None)
                } else {
                    Err(Corruption::ReservedCommand(byte).into())
                };
            }
            let low: u16 = src.read(8)?;
            (inner, high << 8 | low, 2)
        } else {
            (op, src.read::<u16>(SHORT_COUNT_BITS)?, 1)
        };
        let count = stored as usize + 1;

        // 0b111 was handled as the escape above, so `op` is 0..=6
        let cmd = match op {
            0 => {
                let mut bytes: LiteralBytes = SmallVec::from_elem(0, count);
                src.read_bytes(&mut bytes)?;
                Self::Literal(bytes)
            }
            1 => Self::ConstantByte {
                count,
                value: src.read(8)?,
            },
            2 => {
                let low: u8 = src.read(8)?;
                let high: u8 = src.read(8)?;
                Self::ConstantWord {
                    count,
                    value: u16::from_le_bytes([low, high]),
                }
            }
            3 => Self::IncrementingByte {
                count,
                start: src.read(8)?,
            },
            4 => Self::ForwardCopy {
                count,
                index: src.read(16)?,
            },
            5 => Self::BitReversedCopy {
                count,
                index: src.read(16)?,
            },
            _ => Self::BackwardCopy {
                count,
                index: src.read(16)?,
            },
        };

        let size = header + cmd.opcode().argument_len(count);
        Ok(Some((cmd, size)))
    }

    /// Pack `self` into the big endian `BitWriter`
    pub(crate) fn write<W: Write>(&self, wtr: &mut BitWriter<W, BE>) -> Result<(), EbError> {
        let count = self.count();
        debug_assert!((1..=MAX_COUNT).contains(&count), "bad count {}", count);
        let op = self.opcode() as u8;
        let stored = (count - 1) as u16;

        if count >= LONG_COUNT {
            wtr.write(OPCODE_BITS, ESCAPE)?;
            wtr.write(OPCODE_BITS, op)?;
            wtr.write(LONG_COUNT_BITS, stored)?;
        } else {
            wtr.write(OPCODE_BITS, op)?;
            wtr.write(SHORT_COUNT_BITS, stored)?;
        }

        match *self {
            Self::Literal(ref bytes) => wtr.write_bytes(bytes)?,
            Self::ConstantByte { value, .. } => wtr.write(8, value)?,
            Self::ConstantWord { value, .. } => wtr.write_bytes(&value.to_le_bytes())?,
            Self::IncrementingByte { start, .. } => wtr.write(8, start)?,
            Self::ForwardCopy { index, .. }
            | Self::BitReversedCopy { index, .. }
            | Self::BackwardCopy { index, .. } => wtr.write(16, index)?,
        }

        Ok(())
    }

    /// Append the bytes described by `self` to `output`.
    ///
    /// Copy commands read from `output` itself, and may read bytes that they
    /// have just written.
    pub(crate) fn expand_into(&self, output: &mut Vec<u8>) -> Result<(), Corruption> {
        let count = self.count();
        match *self {
            Self::Literal(ref bytes) => output.extend_from_slice(bytes),
            Self::ConstantByte { value, .. } => output.extend(iter::repeat(value).take(count)),
            Self::ConstantWord { value, .. } => {
                let word = value.to_le_bytes();
                for _ in 0..count {
                    output.extend_from_slice(&word);
                }
            }
            Self::IncrementingByte { start, .. } => {
                output.extend((0..count).map(|k| start.wrapping_add(k as u8)))
            }
            Self::ForwardCopy { index, .. } => {
                let start = self.check_source(index, output.len())?;
                for i in start..start + count {
                    let byte = output[i];
                    output.push(byte);
                }
            }
            Self::BitReversedCopy { index, .. } => {
                let start = self.check_source(index, output.len())?;
                for i in start..start + count {
                    let byte = output[i].reverse_bits();
                    output.push(byte);
                }
            }
            Self::BackwardCopy { index, .. } => {
                let start = self.check_source(index, output.len())?;
                if count > start + 1 {
                    return Err(Corruption::BackwardUnderflow { index: start, count });
                }
                for i in 0..count {
                    let byte = output[start - i];
                    output.push(byte);
                }
            }
        }

        Ok(())
    }

    /// A copy may only start inside the output that already exists
    fn check_source(&self, index: u16, produced: usize) -> Result<usize, Corruption> {
        let index = index as usize;
        if index < produced {
            Ok(index)
        } else {
            Err(Corruption::CopyOutOfRange {
                command: self.opcode(),
                index,
                produced,
            })
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} x{}", self.opcode(), self.count())?;
        match *self {
            Self::Literal(ref bytes) => write!(f, " {:02x?}", &bytes[..]),
            Self::ConstantByte { value, .. } => write!(f, " ({:#04x})", value),
            Self::ConstantWord { value, .. } => write!(f, " ({:#06x})", value),
            Self::IncrementingByte { start, .. } => write!(f, " from {:#04x}", start),
            Self::ForwardCopy { index, .. }
            | Self::BitReversedCopy { index, .. }
            | Self::BackwardCopy { index, .. } => write!(f, " from {:#06x}", index),
        }
    }
}

/// Sizes observed while decoding one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    /// bytes of compressed input consumed, terminator included
    pub compressed_size: usize,
    pub decompressed_size: usize,
}

impl StreamInfo {
    /// Offset of the terminator, for a stream that starts at `start`
    pub fn last_offset(&self, start: u64) -> u64 {
        (start + self.compressed_size as u64).saturating_sub(1)
    }

    /// compressed size divided by decompressed size
    pub fn ratio(&self) -> f64 {
        self.compressed_size as f64 / self.decompressed_size as f64
    }
}

impl fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "Last offset read, inclusive: {:X}",
            self.last_offset(0)
        )?;
        writeln!(
            f,
            "Compressed size: {:#X} ({}) bytes",
            self.compressed_size, self.compressed_size
        )?;
        writeln!(
            f,
            "Uncompressed size: {:#X} ({}) bytes",
            self.decompressed_size, self.decompressed_size
        )?;
        write!(f, "Ratio: {:.6}", self.ratio())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bitstream_io::BigEndian;
    use smallvec::smallvec;
    use std::io::Cursor;

    fn pack(cmd: &Command) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut wtr = BitWriter::endian(&mut out, BigEndian);
            cmd.write(&mut wtr).unwrap();
        }
        out
    }

    fn unpack_sized(bytes: &[u8]) -> Option<(Command, usize)> {
        let mut rdr = BitReader::endian(Cursor::new(bytes), BigEndian);
        Command::read(&mut rdr).unwrap()
    }

    fn unpack(bytes: &[u8]) -> Option<Command> {
        unpack_sized(bytes).map(|(cmd, _)| cmd)
    }

    fn expand(cmd: Command, mut output: Vec<u8>) -> Result<Vec<u8>, Corruption> {
        cmd.expand_into(&mut output).map(|_| output)
    }

    #[test]
    fn short_and_escaped_headers() {
        let short = Command::ConstantByte { count: 31, value: 0x41 };
        assert_eq!(pack(&short), [0b001_11110, 0x41]);

        let long = Command::ConstantByte { count: 32, value: 0x41 };
        assert_eq!(pack(&long), [0b111_001_00, 0b0001_1111, 0x41]);

        let max = Command::ForwardCopy {
            count: MAX_COUNT,
            index: 0x1234,
        };
        assert_eq!(pack(&max), [0b111_100_11, 0xFF, 0x12, 0x34]);
        assert_eq!(max.encoded_len(), 4);
    }

    #[test]
    fn headers_read_back() {
        let cmds = [
            Command::Literal(smallvec![1, 2, 3]),
            Command::ConstantWord { count: 40, value: 0xBEEF },
            Command::IncrementingByte { count: 1, start: 9 },
            Command::BackwardCopy { count: 700, index: 0x0400 },
        ];
        for cmd in &cmds {
            let packed = pack(cmd);
            assert_eq!(packed.len(), cmd.encoded_len());
            assert_eq!(unpack_sized(&packed), Some((cmd.clone(), packed.len())));
        }
    }

    #[test]
    fn constant_word_argument_is_little_endian() {
        let cmd = Command::ConstantWord { count: 2, value: 0x2211 };
        assert_eq!(pack(&cmd), [0b010_00001, 0x11, 0x22]);
        assert_eq!(expand(cmd, vec![]).unwrap(), [0x11, 0x22, 0x11, 0x22]);
    }

    #[test]
    fn compact_count_of_32_is_accepted() {
        // 001 11111 carries a count of 32 without the escape
        let (cmd, size) = unpack_sized(&[0b001_11111, 0x07]).unwrap();
        assert_eq!(cmd, Command::ConstantByte { count: 32, value: 7 });
        assert_eq!(size, 2);
        assert_eq!(cmd.encoded_len(), 3);
    }

    #[test]
    fn escaped_small_count_is_accepted() {
        // 111 001 00 00000100 is a count of 5 that would fit the short form
        let (cmd, size) = unpack_sized(&[0b111_001_00, 0x04, 0x07]).unwrap();
        assert_eq!(cmd, Command::ConstantByte { count: 5, value: 7 });
        assert_eq!(size, 3);
        assert_eq!(cmd.encoded_len(), 2);
    }

    #[test]
    fn terminator_and_reserved_escapes() {
        assert_eq!(unpack(&[TERMINATOR]), None);

        for &byte in &[0xFCu8, 0xFD, 0xFE] {
            let mut rdr = BitReader::endian(Cursor::new([byte, 0x00]), BigEndian);
            match Command::read(&mut rdr) {
                Err(EbError::CorruptStream(Corruption::ReservedCommand(b))) => assert_eq!(b, byte),
                other => panic!("expected reserved command error, got {:?}", other),
            }
        }
    }

    #[test]
    fn incrementing_byte_wraps() {
        let cmd = Command::IncrementingByte { count: 4, start: 0xFE };
        assert_eq!(expand(cmd, vec![]).unwrap(), [0xFE, 0xFF, 0x00, 0x01]);
    }

    #[test]
    fn bit_reversal() {
        assert_eq!(0x80u8.reverse_bits(), 0x01);
        assert_eq!(0x01u8.reverse_bits(), 0x80);
        assert!((0..=255u8).all(|b| b.reverse_bits().reverse_bits() == b));

        let cmd = Command::BitReversedCopy { count: 3, index: 0 };
        let out = expand(cmd, vec![0x80, 0x0F, 0xA0]).unwrap();
        assert_eq!(out, [0x80, 0x0F, 0xA0, 0x01, 0xF0, 0x05]);
    }

    #[test]
    fn overlapping_forward_copy() {
        let cmd = Command::ForwardCopy { count: 5, index: 0 };
        assert_eq!(expand(cmd, b"ab".to_vec()).unwrap(), b"abababa");
    }

    #[test]
    fn backward_copy_walks_down() {
        let cmd = Command::BackwardCopy { count: 3, index: 2 };
        assert_eq!(expand(cmd, b"xyz".to_vec()).unwrap(), b"xyzzyx");

        let cmd = Command::BackwardCopy { count: 4, index: 2 };
        assert_eq!(
            expand(cmd, b"xyz".to_vec()),
            Err(Corruption::BackwardUnderflow { index: 2, count: 4 })
        );
    }

    #[test]
    fn copies_must_start_in_existing_output() {
        let cmd = Command::ForwardCopy { count: 1, index: 3 };
        assert_eq!(
            expand(cmd, b"abc".to_vec()),
            Err(Corruption::CopyOutOfRange {
                command: Opcode::ForwardCopy,
                index: 3,
                produced: 3
            })
        );
    }
}

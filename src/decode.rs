use crate::errors::{Corruption, EbError};
use crate::format::{Command, StreamInfo};
use bitstream_io::{BigEndian, BitReader};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, Cursor, Read, Write},
    path::Path,
};

type LogWtr<'a> = &'a mut dyn Write;

/// Specify the decoding settings, such as logging, input, and output.
///
/// To create a new `Decoder`, use [`for_reader()`], [`for_bytes()`], or
/// [`for_file()`]. Then, change any of the decoder settings.
/// Finally, decode the input data with [`decode()`].
/// ```
/// # use ebcomp::{EncoderBuilder, Decoder};
/// let original = b"ABBACABBACD";
/// let compressed = EncoderBuilder::for_bytes(original)
///     .encode_to_vec()
///     .unwrap();
/// let decompressed = Decoder::for_bytes(&compressed)
///     .decode()
///     .unwrap();
/// assert_eq!(&original[..], decompressed);
/// ```
/// Compressed data has no length prefix, so a stream embedded in a larger
/// image is decoded by starting at its offset. [`decode_with_info()`] reports
/// how much of the input the stream used:
/// ```
/// # use ebcomp::Decoder;
/// let image = [0x00, 0x00, 0x21, 0x07, 0xFF, 0x12, 0x34];
/// let (data, info) = Decoder::for_bytes(&image[2..]).decode_with_info().unwrap();
/// assert_eq!(data, [7, 7]);
/// assert_eq!(info.compressed_size, 3);
/// ```
/// [`for_reader()`]: Decoder::for_reader
/// [`for_bytes()`]: Decoder::for_bytes
/// [`for_file()`]: Decoder::for_file
/// [`decode()`]: Decoder::decode
/// [`decode_with_info()`]: Decoder::decode_with_info
pub struct Decoder<'a, R: Read> {
    src: BitReader<R, BigEndian>,
    log: Option<LogWtr<'a>>,
    limit: Option<usize>,
}

impl<'a, R: Read> Decoder<'a, R> {
    #[inline]
    pub fn for_reader(rdr: R) -> Self {
        Self {
            src: BitReader::endian(rdr, BigEndian),
            log: None,
            limit: None,
        }
    }

    #[inline]
    pub fn with_logging<W: Write>(&mut self, wtr: &'a mut W) -> &mut Self {
        self.log = Some(wtr as LogWtr);
        self
    }

    /// Fail with [`Corruption::OutputLimit`] instead of producing more than `limit` bytes
    #[inline]
    pub fn with_limit(&mut self, limit: usize) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    #[inline]
    pub fn decode(&mut self) -> Result<Vec<u8>, EbError> {
        do_decode(self).map(|(output, _)| output)
    }

    /// Decode, and also report the compressed and decompressed sizes
    #[inline]
    pub fn decode_with_info(&mut self) -> Result<(Vec<u8>, StreamInfo), EbError> {
        do_decode(self)
    }
}

impl<'a> Decoder<'a, Cursor<&'a [u8]>> {
    #[inline]
    pub fn for_bytes(bytes: &'a [u8]) -> Self {
        let rdr = Cursor::new(bytes);
        Self::for_reader(rdr)
    }
}

impl<'a> Decoder<'a, BufReader<File>> {
    #[inline]
    pub fn for_file<P: AsRef<Path>>(p: P) -> Result<Self, EbError> {
        File::open(p)
            .map(BufReader::new)
            .map(Self::for_reader)
            .map_err(Into::into)
    }
}

/// Decompress an EarthBound command stream into a `Vec<u8>`
///
/// This is a convenience function to decode a `Read`er without
/// having to import and set up a [`Decoder`]
pub fn decode<R: Read>(rdr: R) -> Result<Vec<u8>, EbError> {
    Decoder::for_reader(rdr).decode()
}

fn do_decode<R: Read>(opt: &mut Decoder<R>) -> Result<(Vec<u8>, StreamInfo), EbError> {
    let Decoder { src, log, limit } = opt;

    // set up the log with a map to count how often each command is used
    let mut log = log.as_mut().map(|l| (l, BTreeMap::new()));

    let mut output: Vec<u8> = Vec::new();
    // the terminator byte
    let mut compressed_size = 1;

    while let Some((cmd, size)) = Command::read(src)? {
        if let Some(limit) = *limit {
            if output.len() + cmd.output_len() > limit {
                return Err(Corruption::OutputLimit { limit }.into());
            }
        }

        if let Some((wtr, freq)) = &mut log {
            writeln!(wtr, "{:04x} - {}", output.len(), &cmd)?;
            *freq.entry(cmd.opcode() as u8).or_insert(0u32) += 1;
        }

        compressed_size += size;
        cmd.expand_into(&mut output)?;
    }

    let info = StreamInfo {
        compressed_size,
        decompressed_size: output.len(),
    };

    if let Some((wtr, freq)) = &mut log {
        writeln!(wtr, "# Command Frequencies (by opcode)\n{:?}", freq)?;
        writeln!(wtr, "{}", info)?;
    }

    Ok((output, info))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counts_the_terminator() {
        let (data, info) = Decoder::for_bytes(&[0xFF]).decode_with_info().unwrap();
        assert!(data.is_empty());
        assert_eq!(
            info,
            StreamInfo {
                compressed_size: 1,
                decompressed_size: 0
            }
        );
    }

    #[test]
    fn logs_each_command() {
        let stream = [0x01, b'h', b'i', 0x20, b'!', 0xFF];
        let mut log = Vec::new();
        let data = Decoder::for_bytes(&stream)
            .with_logging(&mut log)
            .decode()
            .unwrap();
        assert_eq!(data, b"hi!");

        let log = String::from_utf8(log).unwrap();
        assert!(log.contains("0000 - Literal x2"), "{}", log);
        assert!(log.contains("0002 - ConstantByte x1 (0x21)"), "{}", log);
    }

    #[test]
    fn limit_stops_large_output() {
        // a single command asking for 1024 bytes
        let stream = [0b111_001_11, 0xFF, 0x00, 0xFF];
        let err = Decoder::for_bytes(&stream).with_limit(1000).decode();
        match err {
            Err(EbError::CorruptStream(Corruption::OutputLimit { limit: 1000 })) => (),
            other => panic!("expected output limit error, got {:?}", other),
        }

        let ok = Decoder::for_bytes(&stream).with_limit(1024).decode().unwrap();
        assert_eq!(ok.len(), 1024);
    }
}

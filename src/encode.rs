use crate::{errors::EbError, format::TERMINATOR};
use bitstream_io::{BigEndian, BitWriter};
use std::{
    fs::File,
    io::Write,
    io::{BufReader, BufWriter, Cursor, Read},
    path::Path,
};

mod search;
mod select;

use self::select::CommandPass;

type LogWtr<'a> = &'a mut dyn Write;

/// How the copy strategies search the input before the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchBackend {
    /// Check every earlier source index in order on the current thread
    Brute,
    /// Split the source indices across the `rayon` thread pool.
    /// Produces the same output as [`Brute`](SearchBackend::Brute).
    Parallel,
}

/// Specify the encoding settings, such as logging, input, and output
///
/// To create a new `EncoderBuilder`, use [`for_reader()`], [`for_file()`], or [`for_bytes()`].
/// Then, change any of the encoding settings with `EncoderBuilder`'s helper methods.
/// Finally, encode the input data with [`encode_to_writer()`], [`encode_to_file()`], or [`encode_to_vec()`].
/// ```
/// # use ebcomp::{EncoderBuilder, SearchBackend};
/// let input = b"ABBACABBCADFEGABA";
/// let compressed = EncoderBuilder::for_bytes(input)
///     .search_backend(SearchBackend::Parallel)
///     .with_logging(&mut ::std::io::stdout())
///     .encode_to_vec();
/// ```
///
/// At every position of the input, the encoder tries six kinds of match (a run of a byte,
/// a run of a word, an incrementing run, and three kinds of copy from earlier input) and
/// keeps whichever covers the most input per byte of output. Bytes that no match
/// covers cheaply are gathered into literal runs.
///
/// The default encoding settings are no logging and the [`Brute`] search.
///
/// [`for_reader()`]: EncoderBuilder::for_reader
/// [`for_file()`]: EncoderBuilder::for_file
/// [`for_bytes()`]: EncoderBuilder::for_bytes
/// [`encode_to_writer()`]: EncoderBuilder::encode_to_writer
/// [`encode_to_file()`]: EncoderBuilder::encode_to_file
/// [`encode_to_vec()`]: EncoderBuilder::encode_to_vec
/// [`Brute`]: SearchBackend::Brute
pub struct EncoderBuilder<'a, R> {
    rdr: R,
    backend: SearchBackend,
    log: Option<LogWtr<'a>>,
}

impl<'a, R: Read> EncoderBuilder<'a, R> {
    /// Create a new `EncoderBuilder` for the data in `rdr`.
    #[inline]
    pub fn for_reader(rdr: R) -> Self {
        Self {
            rdr,
            backend: SearchBackend::Brute,
            log: None,
        }
    }

    /// Set the algorithm used to search for copy matches when encoding
    #[inline]
    pub fn search_backend(&mut self, backend: SearchBackend) -> &mut Self {
        self.backend = backend;
        self
    }

    /// Write each chosen command to `log` while the input is being encoded.
    #[inline]
    pub fn with_logging<L: Write>(&mut self, log: &'a mut L) -> &mut Self {
        let log = Some(log as &'a mut dyn Write);
        self.log = log;
        self
    }

    /// Start the encoding and write the compressed data out to `wtr`
    #[inline]
    pub fn encode_to_writer<W: Write>(&mut self, wtr: W) -> Result<(), EbError> {
        do_encode(self, wtr)
    }

    /// Start the encoding and write the compressed data out to the newly created
    /// `File` `f`
    #[inline]
    pub fn encode_to_file<P: AsRef<Path>>(&mut self, f: P) -> Result<(), EbError> {
        let mut wtr = BufWriter::new(File::create(f)?);
        self.encode_to_writer(&mut wtr)?;
        wtr.flush().map_err(Into::into)
    }

    /// Start the encoding and return the compressed data in a `Vec<u8>`.
    #[inline]
    pub fn encode_to_vec(&mut self) -> Result<Vec<u8>, EbError> {
        let mut data = Vec::new();
        self.encode_to_writer(&mut data).map(|_| data)
    }
}

impl<'a> EncoderBuilder<'a, BufReader<File>> {
    /// Create a new `EncoderBuilder` for the file at `p`.
    #[inline]
    pub fn for_file<P: AsRef<Path>>(p: P) -> Result<Self, EbError> {
        let rdr = BufReader::new(File::open(p)?);
        Ok(Self::for_reader(rdr))
    }
}

impl<'a> EncoderBuilder<'a, Cursor<&'a [u8]>> {
    /// Create a new `EncoderBuilder` for the data the `bytes` slice.
    #[inline]
    pub fn for_bytes(bytes: &'a [u8]) -> Self {
        let rdr = Cursor::new(bytes);
        Self::for_reader(rdr)
    }
}

/// Compress data into an EarthBound command stream
///
/// This is a convenience function to encode a `Read`er without having to
/// import and set up an [`EncoderBuilder`].
/// ```
/// let compressed = ebcomp::encode(&b"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"[..]).unwrap();
/// assert_eq!(compressed, [0xE4, 0x1F, 0x41, 0xFF]);
/// ```
pub fn encode<R: Read>(rdr: R) -> Result<Vec<u8>, EbError> {
    EncoderBuilder::for_reader(rdr).encode_to_vec()
}

fn do_encode<R: Read, W: Write>(
    opts: &mut EncoderBuilder<'_, R>,
    mut wtr: W,
) -> Result<(), EbError> {
    let EncoderBuilder { rdr, backend, log } = opts;

    // every copy strategy needs random access to the whole input
    let mut input = Vec::new();
    rdr.read_to_end(&mut input)?;

    let pass = select::compress(&input, *backend, log)?;

    if let Some(wtr) = log.as_mut() {
        writeln!(
            wtr,
            "# {} commands, {:#x} bytes => {:#x} bytes",
            pass.commands.len(),
            pass.decompressed_size,
            pass.compressed_size()
        )?;
    }

    write_stream(&mut wtr, &pass)
}

fn write_stream(wtr: &mut dyn Write, pass: &CommandPass) -> Result<(), EbError> {
    let mut out = BitWriter::endian(wtr, BigEndian);

    for cmd in &pass.commands {
        cmd.write(&mut out)?;
    }
    // every command ends on a byte boundary, so the terminator does too
    out.write(8, TERMINATOR).map_err(Into::into)
}

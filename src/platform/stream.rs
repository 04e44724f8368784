// LogWarden - platform/stream.rs
//
// Turns an attachment reader into a sequence of decompressed byte chunks.
// Plain logs are read as-is, gzip streams are inflated incrementally, and
// zip archives are spooled to a scoped temp file so the first `.log` entry
// can be extracted (bounded) and then read back in chunks.
//
// Temp files are owned by the returned stream or by the opening call, so
// they are removed on success, on error and when the stream is dropped.

use crate::core::model::LogEncoding;
use crate::util::constants;
use crate::util::error::StreamError;
use flate2::write::MultiGzDecoder;
use std::io::{self, Read, Seek, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;
use zip::CompressionMethod;

/// Prefix of every scratch file the adapter creates.
pub const SCRATCH_PREFIX: &str = "logwarden-";

/// Stream adapter settings.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Bytes read from the source per chunk.
    pub chunk_size: usize,
    /// Decoded bytes delivered before the stream ends with `LogTooLarge`.
    /// Archive entries are extracted up to one byte past it.
    pub max_log_bytes: u64,
    /// Largest archive accepted for spooling.
    pub max_spool_bytes: u64,
    /// Where scratch files go; the system temp dir when `None`.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: constants::DEFAULT_CHUNK_SIZE,
            max_log_bytes: constants::DEFAULT_MAX_LOG_BYTES,
            max_spool_bytes: constants::MAX_ARCHIVE_SPOOL_BYTES,
            scratch_dir: None,
        }
    }
}

/// Decompressed chunks of one attachment.
///
/// No chunk is longer than the configured chunk size, and at most
/// `max_log_bytes` bytes are delivered in total. A source with more than that
/// ends with [`StreamError::LogTooLarge`].
pub struct ChunkStream {
    reader: Box<dyn Read + Send>,
    chunk_size: usize,
    gzip: Option<GzipInflater>,
    /// Extracted archive entry; deleted when the stream is dropped.
    _extracted: Option<NamedTempFile>,
    limit: u64,
    delivered: u64,
    over_limit: bool,
    skipped_chunks: usize,
    eof: bool,
    done: bool,
}

impl ChunkStream {
    fn new(
        reader: Box<dyn Read + Send>,
        chunk_size: usize,
        limit: u64,
        gzip: Option<GzipInflater>,
        extracted: Option<NamedTempFile>,
    ) -> Self {
        Self {
            reader,
            chunk_size,
            gzip,
            _extracted: extracted,
            limit,
            delivered: 0,
            over_limit: false,
            skipped_chunks: 0,
            eof: false,
            done: false,
        }
    }

    /// Gzip chunks that failed to inflate and were dropped.
    pub fn skipped_chunks(&self) -> usize {
        self.skipped_chunks
    }

    /// Next decoded chunk, or `None` at end of input.
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        let Some(gzip) = self.gzip.as_mut() else {
            let raw = read_chunk(self.reader.as_mut(), self.chunk_size)?;
            return Ok((!raw.is_empty()).then_some(raw));
        };

        loop {
            if gzip.output_len() >= self.chunk_size {
                return Ok(Some(gzip.take_output(self.chunk_size)));
            }
            if gzip.has_input() {
                if !gzip.inflate(self.chunk_size) {
                    self.skipped_chunks += 1;
                }
                continue;
            }
            if self.eof {
                let rest = gzip.take_output(self.chunk_size);
                return Ok((!rest.is_empty()).then_some(rest));
            }

            let raw = read_chunk(self.reader.as_mut(), self.chunk_size)?;
            if raw.is_empty() {
                self.eof = true;
                gzip.finish();
            } else {
                gzip.push_input(raw);
            }
        }
    }
}

impl Iterator for ChunkStream {
    type Item = Result<Vec<u8>, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.over_limit {
            self.done = true;
            return Some(Err(StreamError::LogTooLarge { limit: self.limit }));
        }

        let mut chunk = match self.next_chunk() {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        let remaining = self.limit.saturating_sub(self.delivered);
        if chunk.len() as u64 > remaining {
            tracing::debug!(limit = self.limit, "Decoded log exceeds the byte cap");
            chunk.truncate(remaining as usize);
            self.over_limit = true;
            if chunk.is_empty() {
                self.done = true;
                return Some(Err(StreamError::LogTooLarge { limit: self.limit }));
            }
        }
        self.delivered += chunk.len() as u64;
        Some(Ok(chunk))
    }
}

/// One `read` of at most `chunk_size` bytes; short reads pass through.
fn read_chunk(reader: &mut dyn Read, chunk_size: usize) -> Result<Vec<u8>, StreamError> {
    let mut buf = vec![0u8; chunk_size];
    loop {
        match reader.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                return Ok(buf);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => return Err(io_error("reading attachment", source)),
        }
    }
}

// =============================================================================
// Gzip inflation
// =============================================================================

/// Push-style gzip decoder fed in small steps, so the output buffered at any
/// time stays near one chunk no matter how compressible the input is.
struct GzipInflater {
    decoder: MultiGzDecoder<Vec<u8>>,
    /// Compressed chunk being fed.
    input: Vec<u8>,
    /// Bytes of `input` the decoder has accepted.
    fed: usize,
}

impl GzipInflater {
    fn new() -> Self {
        Self {
            decoder: MultiGzDecoder::new(Vec::new()),
            input: Vec::new(),
            fed: 0,
        }
    }

    fn has_input(&self) -> bool {
        self.fed < self.input.len()
    }

    fn output_len(&self) -> usize {
        self.decoder.get_ref().len()
    }

    fn push_input(&mut self, raw: Vec<u8>) {
        self.input = raw;
        self.fed = 0;
    }

    /// Feed the current input until `target` output bytes are buffered or the
    /// input runs out. Returns `false` when the rest of the input had to be
    /// dropped; the decoder is then reset so a later gzip member can resync.
    fn inflate(&mut self, target: usize) -> bool {
        while self.has_input() && self.output_len() < target {
            let end = (self.fed + constants::GZIP_INPUT_STEP).min(self.input.len());
            match self.decoder.write(&self.input[self.fed..end]) {
                Ok(n) if n > 0 => self.fed += n,
                Ok(_) => return self.drop_input("gzip decoder accepted no input"),
                Err(e) => return self.drop_input(&e.to_string()),
            }
        }
        true
    }

    fn drop_input(&mut self, error: &str) -> bool {
        tracing::debug!(
            error,
            dropped = self.input.len() - self.fed,
            "Skipping gzip chunk that failed to inflate"
        );
        self.fed = self.input.len();
        let output = std::mem::take(self.decoder.get_mut());
        self.decoder = MultiGzDecoder::new(output);
        false
    }

    /// At most `max` bytes of buffered output, oldest first.
    fn take_output(&mut self, max: usize) -> Vec<u8> {
        let output = self.decoder.get_mut();
        if output.len() <= max {
            return std::mem::take(output);
        }
        let rest = output.split_off(max);
        std::mem::replace(output, rest)
    }

    /// Flush the decoder at end of input.
    fn finish(&mut self) {
        if let Err(e) = self.decoder.try_finish() {
            tracing::debug!(error = %e, "Gzip stream ended without a clean trailer");
        }
    }
}

/// Wrap `reader` in the decoder for `encoding`.
///
/// Archive mode does its spooling and extraction here, so container errors
/// (`TooLarge`, `NoLogEntry`, `UnsupportedCodec`) are returned before any
/// chunk is produced.
pub fn open_chunks(
    reader: Box<dyn Read + Send>,
    encoding: LogEncoding,
    config: &StreamConfig,
) -> Result<ChunkStream, StreamError> {
    let chunk_size = config
        .chunk_size
        .clamp(constants::MIN_CHUNK_SIZE, constants::MAX_CHUNK_SIZE);

    let limit = config.max_log_bytes;

    match encoding {
        LogEncoding::Plain => Ok(ChunkStream::new(reader, chunk_size, limit, None, None)),
        LogEncoding::Gzip => Ok(ChunkStream::new(
            reader,
            chunk_size,
            limit,
            Some(GzipInflater::new()),
            None,
        )),
        LogEncoding::Zip => {
            let extracted = extract_log_entry(reader, config)?;
            let file = extracted
                .reopen()
                .map_err(|source| io_error("reopening extracted log", source))?;
            Ok(ChunkStream::new(
                Box::new(file),
                chunk_size,
                limit,
                None,
                Some(extracted),
            ))
        }
    }
}

/// Spool the archive, locate the first `.log` entry and extract it into a
/// fresh scratch file. The spool is deleted before returning.
fn extract_log_entry(
    mut reader: Box<dyn Read + Send>,
    config: &StreamConfig,
) -> Result<NamedTempFile, StreamError> {
    let mut spool = scratch_file(config, "creating archive spool")?;
    let limit = config.max_spool_bytes;
    let spooled = io::copy(&mut reader.by_ref().take(limit + 1), spool.as_file_mut())
        .map_err(|source| io_error("spooling archive", source))?;
    if spooled > limit {
        tracing::debug!(limit, "Archive exceeds spool limit");
        return Err(StreamError::TooLarge { limit });
    }
    spool
        .as_file_mut()
        .rewind()
        .map_err(|source| io_error("rewinding archive spool", source))?;

    let mut archive = zip::ZipArchive::new(spool.as_file_mut())
        .map_err(|source| StreamError::Archive { source })?;
    let entries = archive.len();

    let mut found = None;
    for index in 0..entries {
        let entry = archive
            .by_index_raw(index)
            .map_err(|source| StreamError::Archive { source })?;
        if !entry.is_dir()
            && entry
                .name()
                .to_ascii_lowercase()
                .ends_with(constants::ARCHIVE_LOG_SUFFIX)
        {
            found = Some((index, entry.name().to_string(), entry.compression()));
            break;
        }
    }
    let Some((index, name, method)) = found else {
        return Err(StreamError::NoLogEntry { entries });
    };

    if !matches!(method, CompressionMethod::Stored | CompressionMethod::Deflated) {
        tracing::debug!(entry = %name, method = ?method, "Unsupported archive compression");
        return Err(StreamError::UnsupportedCodec {
            entry: name,
            method: format!("{method:?}"),
        });
    }

    let mut extracted = scratch_file(config, "creating extraction file")?;
    let mut entry = archive
        .by_index(index)
        .map_err(|source| StreamError::Archive { source })?;
    let written = io::copy(
        &mut (&mut entry).take(config.max_log_bytes + 1),
        extracted.as_file_mut(),
    )
    .map_err(|source| io_error("extracting archive entry", source))?;

    tracing::debug!(
        entry = %name,
        spooled,
        extracted = written,
        "Archive log entry extracted"
    );
    Ok(extracted)
}

fn scratch_file(config: &StreamConfig, operation: &'static str) -> Result<NamedTempFile, StreamError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(SCRATCH_PREFIX);
    let file = match &config.scratch_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    };
    file.map_err(|source| io_error(operation, source))
}

fn io_error(operation: &'static str, source: io::Error) -> StreamError {
    StreamError::Io { operation, source }
}

// =============================================================================
// Tests
// =============================================================================

// LogWarden - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation (Rule 2).
// All errors preserve the causal chain for diagnostic logging.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all LogWarden operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum LogWardenError {
    /// Phase table loading or validation failed.
    PhaseTable(PhaseTableError),

    /// Opening or decompressing an attachment failed.
    Stream(StreamError),

    /// Line assembly failed.
    Line(LineError),

    /// Product catalog loading failed.
    Catalog(CatalogError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for LogWardenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PhaseTable(e) => write!(f, "Phase table error: {e}"),
            Self::Stream(e) => write!(f, "Stream error: {e}"),
            Self::Line(e) => write!(f, "Line error: {e}"),
            Self::Catalog(e) => write!(f, "Catalog error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for LogWardenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PhaseTable(e) => Some(e),
            Self::Stream(e) => Some(e),
            Self::Line(e) => Some(e),
            Self::Catalog(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Phase table errors
// ---------------------------------------------------------------------------

/// Errors related to phase table loading and validation.
#[derive(Debug)]
pub enum PhaseTableError {
    /// TOML file could not be parsed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Table file exceeds the maximum allowed size.
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    /// A required field is missing or empty.
    MissingField {
        table_id: String,
        field: &'static str,
    },

    /// A regex pattern in the table is invalid.
    InvalidRegex {
        table_id: String,
        phase: String,
        pattern: String,
        source: regex::Error,
    },

    /// A regex pattern exceeds the maximum allowed length.
    RegexTooLong {
        table_id: String,
        phase: String,
        length: usize,
        max_length: usize,
    },

    /// `stop` or `rearm` declared on a phase that is not the last one.
    MisplacedCompletion { table_id: String, phase: String },

    /// A table declares more phases than allowed.
    TooManyPhases {
        table_id: String,
        count: usize,
        max: usize,
    },

    /// A phase declares more triggers than allowed.
    TooManyTriggers {
        table_id: String,
        phase: String,
        count: usize,
        max: usize,
    },

    /// Maximum number of tables exceeded.
    TooManyTables { count: usize, max: usize },

    /// The requested table id is not loaded.
    UnknownTable { id: String },

    /// I/O error reading a table file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for PhaseTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Failed to parse TOML '{}': {source}", path.display())
            }
            Self::FileTooLarge {
                path,
                size,
                max_size,
            } => write!(
                f,
                "Phase table '{}' is {size} bytes, exceeds maximum of {max_size} bytes",
                path.display()
            ),
            Self::MissingField { table_id, field } => {
                write!(f, "Table '{table_id}': missing required field '{field}'")
            }
            Self::InvalidRegex {
                table_id,
                phase,
                pattern,
                source,
            } => write!(
                f,
                "Table '{table_id}': invalid pattern in phase '{phase}' ('{pattern}'): {source}"
            ),
            Self::RegexTooLong {
                table_id,
                phase,
                length,
                max_length,
            } => write!(
                f,
                "Table '{table_id}': pattern in phase '{phase}' is {length} chars, \
                 exceeds maximum of {max_length}"
            ),
            Self::MisplacedCompletion { table_id, phase } => write!(
                f,
                "Table '{table_id}': phase '{phase}' declares stop/rearm but is not the last phase"
            ),
            Self::TooManyPhases {
                table_id,
                count,
                max,
            } => write!(
                f,
                "Table '{table_id}' declares {count} phases, maximum is {max}"
            ),
            Self::TooManyTriggers {
                table_id,
                phase,
                count,
                max,
            } => write!(
                f,
                "Table '{table_id}': phase '{phase}' declares {count} triggers, maximum is {max}"
            ),
            Self::TooManyTables { count, max } => {
                write!(f, "Too many phase tables loaded ({count}), maximum is {max}")
            }
            Self::UnknownTable { id } => write!(f, "No phase table with id '{id}' is loaded"),
            Self::Io { path, source } => {
                write!(
                    f,
                    "Failed to read phase table '{}': {source}",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for PhaseTableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::InvalidRegex { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<PhaseTableError> for LogWardenError {
    fn from(e: PhaseTableError) -> Self {
        Self::PhaseTable(e)
    }
}

// ---------------------------------------------------------------------------
// Stream errors
// ---------------------------------------------------------------------------

/// Errors raised while turning an attachment into decompressed chunks.
#[derive(Debug)]
pub enum StreamError {
    /// Reading the source or a spool file failed.
    Io {
        operation: &'static str,
        source: io::Error,
    },

    /// The archive entry uses a compression method the decoder cannot handle
    /// (e.g. Deflate64). Never produces partial output.
    UnsupportedCodec { entry: String, method: String },

    /// The archive contains no entry ending in `.log`.
    NoLogEntry { entries: usize },

    /// The container exceeded the spool limit.
    TooLarge { limit: u64 },

    /// The decoded log exceeded the byte cap. Raised after exactly `limit`
    /// bytes have been delivered.
    LogTooLarge { limit: u64 },

    /// The archive structure is unreadable.
    Archive { source: zip::result::ZipError },

    /// The attachment name carries no recognised extension.
    UnrecognizedAttachment { file_name: String },
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { operation, source } => write!(f, "I/O error during {operation}: {source}"),
            Self::UnsupportedCodec { entry, method } => write!(
                f,
                "Archive entry '{entry}' uses unsupported compression method {method}"
            ),
            Self::NoLogEntry { entries } => {
                write!(f, "Archive has {entries} entries but none is a .log file")
            }
            Self::TooLarge { limit } => {
                write!(f, "Attachment exceeds the {limit}-byte spool limit")
            }
            Self::LogTooLarge { limit } => {
                write!(f, "Decoded log exceeds the {limit}-byte cap")
            }
            Self::Archive { source } => write!(f, "Unreadable archive: {source}"),
            Self::UnrecognizedAttachment { file_name } => write!(
                f,
                "Attachment '{file_name}' is not a .log, .log.gz, .gz or .zip file"
            ),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Archive { source } => Some(source),
            _ => None,
        }
    }
}

impl From<StreamError> for LogWardenError {
    fn from(e: StreamError) -> Self {
        Self::Stream(e)
    }
}

// ---------------------------------------------------------------------------
// Line errors
// ---------------------------------------------------------------------------

/// Errors that terminate line assembly. After any of these the line
/// sequence is exhausted.
#[derive(Debug)]
pub enum LineError {
    /// The underlying chunk source failed.
    Source(StreamError),

    /// Bytes that are not valid UTF-8 and are not a split character.
    InvalidEncoding { offset: u64, bytes: Vec<u8> },

    /// Undecodable bytes carried across a chunk boundary exceeded the cap.
    PendingOverflow { pending: usize, limit: usize },

    /// Text without a line terminator exceeded the cap.
    LineTooLong { length: usize, limit: usize },
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(e) => write!(f, "{e}"),
            Self::InvalidEncoding { offset, bytes } => write!(
                f,
                "Invalid UTF-8 at byte offset {offset}: {}",
                bytes
                    .iter()
                    .map(|b| format!("{b:02x}"))
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
            Self::PendingOverflow { pending, limit } => write!(
                f,
                "{pending} undecodable bytes pending across chunks, limit is {limit}"
            ),
            Self::LineTooLong { length, limit } => write!(
                f,
                "Line exceeds {limit} bytes without a terminator ({length} buffered)"
            ),
        }
    }
}

impl std::error::Error for LineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Source(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StreamError> for LineError {
    fn from(e: StreamError) -> Self {
        Self::Source(e)
    }
}

impl From<LineError> for LogWardenError {
    fn from(e: LineError) -> Self {
        Self::Line(e)
    }
}

// ---------------------------------------------------------------------------
// Catalog errors
// ---------------------------------------------------------------------------

/// Errors related to loading the product catalog export.
#[derive(Debug)]
pub enum CatalogError {
    /// JSON parsing failed.
    JsonParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Catalog file exceeds the maximum allowed size.
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    /// I/O error reading the catalog.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JsonParse { path, source } => {
                write!(f, "Catalog parse error '{}': {source}", path.display())
            }
            Self::FileTooLarge {
                path,
                size,
                max_size,
            } => write!(
                f,
                "Catalog '{}' is {size} bytes, exceeds maximum of {max_size} bytes",
                path.display()
            ),
            Self::Io { path, source } => {
                write!(f, "Catalog I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::JsonParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<CatalogError> for LogWardenError {
    fn from(e: CatalogError) -> Self {
        Self::Catalog(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading a config-referenced file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for LogWardenError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Convenience type alias for LogWarden results.
pub type Result<T> = std::result::Result<T, LogWardenError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_line_error_preserves_stream_source() {
        let err = LineError::from(StreamError::Io {
            operation: "read",
            source: io::Error::new(io::ErrorKind::UnexpectedEof, "short read"),
        });
        let source = err.source().expect("stream error should be chained");
        assert!(source.to_string().contains("short read"));
    }

    #[test]
    fn test_invalid_encoding_display_is_hex() {
        let err = LineError::InvalidEncoding {
            offset: 12,
            bytes: vec![0xc3, 0x28],
        };
        assert_eq!(err.to_string(), "Invalid UTF-8 at byte offset 12: c3 28");
    }

    #[test]
    fn test_top_level_wraps_phase_table_error() {
        let err: LogWardenError = PhaseTableError::UnknownTable {
            id: "nope".to_string(),
        }
        .into();
        assert!(err.to_string().starts_with("Phase table error:"));
        assert!(err.source().is_some());
    }
}

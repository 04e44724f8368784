// LogWarden - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Every resource bound used by the pipeline is declared here (Rule 11).

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "LogWarden";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "LogWarden";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Stream limits
// =============================================================================

/// Default read chunk size in bytes for plain and gzip sources.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024; // 64 KB

/// Smallest accepted chunk size. Anything lower turns every read into a
/// syscall storm without changing correctness.
pub const MIN_CHUNK_SIZE: usize = 512;

/// Largest accepted chunk size.
pub const MAX_CHUNK_SIZE: usize = 4 * 1024 * 1024; // 4 MiB

/// Compressed bytes handed to the gzip decoder per step. Deflate expands at
/// most about 1032:1, so one step adds at most ~66 KB of output.
pub const GZIP_INPUT_STEP: usize = 64;

/// Maximum number of bytes spooled to disk for a single zip attachment.
///
/// The archive has to land on disk before its central directory can be read,
/// so this bound applies to the compressed container, not the log inside it.
pub const MAX_ARCHIVE_SPOOL_BYTES: u64 = 64 * 1024 * 1024; // 64 MiB

/// File name suffix of the archive entry that carries the log.
pub const ARCHIVE_LOG_SUFFIX: &str = ".log";

// =============================================================================
// Line assembly limits
// =============================================================================

/// Maximum number of undecodable trailing bytes carried across a chunk
/// boundary. A UTF-8 scalar is at most 4 bytes, so anything beyond this is
/// garbage, not a split character.
pub const DEFAULT_MAX_PENDING_BYTES: usize = 16;

/// Maximum accumulated text without a line terminator before the assembler
/// gives up on the stream.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024; // 1 MiB

/// Hard upper bound on the configurable line cap.
pub const ABSOLUTE_MAX_LINE_BYTES: usize = 16 * 1024 * 1024; // 16 MiB

/// Byte order mark skipped at the very start of a stream.
pub const BYTE_ORDER_MARK: char = '\u{feff}';

// =============================================================================
// Phase engine limits
// =============================================================================

/// Cumulative source bytes (line, carriage return, terminator and byte
/// order mark) accepted per analysis before it ends with an overflow.
pub const DEFAULT_MAX_LOG_BYTES: u64 = 32 * 1024 * 1024; // 32 MiB

/// Smallest configurable log cap.
pub const MIN_MAX_LOG_BYTES: u64 = 64 * 1024; // 64 KB

/// Largest configurable log cap.
pub const ABSOLUTE_MAX_LOG_BYTES: u64 = 1024 * 1024 * 1024; // 1 GiB

/// Default number of lines retained in a phase window.
pub const DEFAULT_WINDOW_CAPACITY: usize = 256;

/// Smallest configurable window. Patterns spanning a settings block need at
/// least this many lines of context.
pub const MIN_WINDOW_CAPACITY: usize = 16;

/// Largest configurable window.
pub const MAX_WINDOW_CAPACITY: usize = 65_536;

/// Serial code embedded in the system section of a log, e.g. `BLUS30443`.
pub const SERIAL_PATTERN: &str = r"Serial: (?P<id>[A-Za-z]{4}\d{5})";

/// Title line embedded next to the serial.
pub const TITLE_PATTERN: &str = r"Title: (?P<title>.+)$";

/// Marker introducing the selected-libraries list in the core settings.
pub const LIBRARIES_MARKER: &str = "Load libraries:";

/// Extension stripped from selected library names.
pub const LIBRARY_SUFFIX: &str = ".sprx";

/// Substrings that identify a GPU/driver banner line for the flush probe.
pub const DRIVER_BANNER_MARKERS: &[&str] = &[
    "Found vulkan-compatible GPU:",
    "GL RENDERER:",
    "GL VERSION:",
];

// =============================================================================
// Phase table limits
// =============================================================================

/// Maximum number of phase tables that can be loaded (built-in + user).
pub const MAX_PHASE_TABLES: usize = 32;

/// Maximum number of phases in a single table.
pub const MAX_PHASES_PER_TABLE: usize = 32;

/// Maximum number of triggers on a single phase.
pub const MAX_TRIGGERS_PER_PHASE: usize = 8;

/// Maximum size of a phase table TOML file in bytes.
pub const MAX_PHASE_TABLE_FILE_SIZE: u64 = 64 * 1024; // 64 KB

/// Maximum regex pattern length to prevent ReDoS.
pub const MAX_REGEX_PATTERN_LENGTH: usize = 4_096;

/// Table used when neither the CLI nor config.toml names one.
pub const DEFAULT_PHASE_TABLE: &str = "rpcs3-settings";

// =============================================================================
// Moderation
// =============================================================================

/// Maximum size of a banned-phrases file in bytes.
pub const MAX_BANNED_FILE_SIZE: u64 = 1024 * 1024; // 1 MiB

/// Maximum number of banned phrases held at once.
pub const MAX_BANNED_PHRASES: usize = 10_000;

/// Maximum size of a product catalog JSON export in bytes.
pub const MAX_CATALOG_FILE_SIZE: u64 = 64 * 1024 * 1024; // 64 MiB

/// Date format used by the compatibility database export.
pub const CATALOG_DATE_FORMAT: &str = "%Y-%m-%d";

// =============================================================================
// Report limits
// =============================================================================

/// Maximum characters in one fenced plain-text report segment, fences
/// included.
pub const DEFAULT_SEGMENT_CHARS: usize = 2_000;

/// Smallest usable segment size.
pub const MIN_SEGMENT_CHARS: usize = 200;

/// Maximum characters in a structured report section body.
pub const MAX_SECTION_CHARS: usize = 1_024;

/// Maximum number of sections in a structured report.
pub const MAX_REPORT_SECTIONS: usize = 4;

/// Maximum characters of a product title shown in the product line.
pub const MAX_TITLE_CHARS: usize = 40;

/// Placeholder for an optional field that was never extracted.
pub const MISSING_FIELD: &str = "Unknown";

/// Placeholder for a missing numeric tuning field.
pub const MISSING_NUMERIC: &str = "N/A";

/// Placeholder for an empty library selection.
pub const NO_LIBRARIES: &str = "None";

/// Compatibility thread link; the thread id and `.html` are appended.
pub const COMPAT_THREAD_URL_PREFIX: &str = "https://forums.rpcs3.net/thread-";

/// Zero-width joiner inserted by the sanitizer.
pub const ZERO_WIDTH_JOINER: char = '\u{200d}';

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a log line included in debug output.
/// Prevents accidental exposure of sensitive data in long lines.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Attachment discovery
// =============================================================================

/// Glob patterns of attachment names routed into the pipeline.
pub const ACCEPTED_ATTACHMENT_PATTERNS: &[&str] = &["*.log", "*.log.gz", "*.gz", "*.zip"];

/// Maximum directory recursion depth for `--recursive`.
pub const DEFAULT_MAX_DEPTH: usize = 10;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// User phase-table subdirectory name.
pub const PHASES_DIR_NAME: &str = "phases";

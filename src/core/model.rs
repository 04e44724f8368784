// LogWarden - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no platform
// dependencies. These types are the shared vocabulary across all layers.

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Extracted fields, keyed by capture name. Ordered so reports and JSON
/// output are deterministic.
pub type FieldMap = BTreeMap<String, String>;

// =============================================================================
// Attachments
// =============================================================================

/// A reference to a user-submitted attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Where the bytes live: a URL for the chat platform, a path for the CLI.
    pub locator: String,

    /// File name as submitted. Drives the decompression strategy.
    pub file_name: String,

    /// Size announced by the platform, if any.
    pub declared_size: Option<u64>,
}

impl Attachment {
    pub fn new(locator: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            file_name: file_name.into(),
            declared_size: None,
        }
    }

    /// Encoding implied by the file name, or `None` for names the pipeline
    /// does not accept.
    pub fn encoding(&self) -> Option<LogEncoding> {
        LogEncoding::from_file_name(&self.file_name)
    }
}

/// How the attachment bytes are packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEncoding {
    /// Plain text log.
    Plain,
    /// A single gzip stream.
    Gzip,
    /// A zip archive holding a `.log` entry.
    Zip,
}

impl LogEncoding {
    /// Map a file name extension (case-insensitive) to an encoding.
    ///
    /// `.log` is plain, `.log.gz` and `.gz` are gzip, `.zip` is an archive.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".log") {
            Some(Self::Plain)
        } else if lower.ends_with(".gz") {
            Some(Self::Gzip)
        } else if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

// =============================================================================
// Product descriptor
// =============================================================================

/// Compatibility status as published by the compatibility database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProductStatus {
    #[default]
    Unknown,
    Nothing,
    Loadable,
    Intro,
    Ingame,
    Playable,
}

impl ProductStatus {
    /// Parse the database spelling. Unrecognised values map to `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label {
            "Nothing" => Self::Nothing,
            "Loadable" => Self::Loadable,
            "Intro" => Self::Intro,
            "Ingame" => Self::Ingame,
            "Playable" => Self::Playable,
            _ => Self::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Nothing => "Nothing",
            Self::Loadable => "Loadable",
            Self::Intro => "Intro",
            Self::Ingame => "Ingame",
            Self::Playable => "Playable",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the external resolver knows about the product a log was produced by.
///
/// `ProductDescriptor::unknown()` is the explicit sentinel used until a serial
/// is resolved, and whenever resolution fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct ProductDescriptor {
    /// Serial code found in the log, e.g. `BLUS30443`.
    pub serial: Option<String>,
    pub title: Option<String>,
    pub status: ProductStatus,
    /// Forum thread id of the compatibility report.
    pub thread: Option<u64>,
    pub pull_request: Option<u64>,
    pub commit: Option<String>,
    /// Date of the last compatibility update.
    pub updated: Option<NaiveDate>,
}

impl ProductDescriptor {
    /// Sentinel for "no serial seen yet".
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Sentinel for "serial seen, but the resolver has no record of it".
    pub fn unresolved(serial: &str) -> Self {
        Self {
            serial: Some(serial.to_string()),
            ..Self::default()
        }
    }

    /// True when the resolver returned a database record.
    pub fn is_known(&self) -> bool {
        self.status != ProductStatus::Unknown
    }
}

/// Resolves a serial code to a product descriptor.
///
/// Implementations must not fail: any lookup problem is reported as
/// `ProductDescriptor::unresolved(serial)`.
pub trait ProductResolver: Send + Sync {
    fn resolve(&self, serial: &str) -> ProductDescriptor;
}

// =============================================================================
// Phase tables (runtime representation)
// =============================================================================

/// How a phase trigger is compared against an incoming line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// The trigger occurs anywhere in the line.
    #[default]
    Contains,
    /// The trimmed line equals the trigger.
    Exact,
}

impl TriggerMode {
    pub fn matches(&self, line: &str, trigger: &str) -> bool {
        match self {
            Self::Contains => line.contains(trigger),
            Self::Exact => line.trim() == trigger,
        }
    }
}

/// Side effects a phase runs after its extraction pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    /// Find the serial code and ask the product resolver about it.
    ResolveProduct,
    /// Scan for banned phrases; the first hit ends the analysis.
    BannedContent,
    /// Collect the `Load libraries:` list.
    CollectLibraries,
}

/// Predicates that let a phase extract before its trigger arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushProbeKind {
    /// The line looks like part of a GPU/driver banner block.
    DriverBanner,
}

impl FlushProbeKind {
    /// Whether `line` has the data shape this probe looks for.
    pub fn recognizes(&self, line: &str) -> bool {
        match self {
            Self::DriverBanner => crate::util::constants::DRIVER_BANNER_MARKERS
                .iter()
                .any(|marker| line.contains(marker)),
        }
    }
}

/// What happens once a phase's trigger has been seen and it finalized
/// successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Completion {
    /// Move on to the next phase. On the last phase this is the implicit
    /// terminal state and behaves like `Stop`.
    #[default]
    Advance,
    /// Report `Stop` and halt.
    Stop,
    /// Report `Stop`, keep the finished section and start over at phase 0
    /// with a fresh state.
    Rearm,
}

/// One compiled stage of a phase table.
#[derive(Debug, Clone)]
pub struct PhaseDescriptor {
    pub name: String,
    /// Any of these ends the phase.
    pub triggers: Vec<String>,
    pub trigger_mode: TriggerMode,
    /// Matched against the joined window at finalization. Named captures
    /// become fields.
    pub pattern: Option<Regex>,
    pub handlers: Vec<HandlerKind>,
    pub flush_probe: Option<FlushProbeKind>,
    pub on_trigger: Completion,
}

impl PhaseDescriptor {
    /// Returns the trigger that `line` satisfies, if any.
    pub fn matched_trigger(&self, line: &str) -> Option<&str> {
        self.triggers
            .iter()
            .find(|t| self.trigger_mode.matches(line, t))
            .map(String::as_str)
    }
}

/// A named, versioned, ordered list of phases.
#[derive(Debug, Clone)]
pub struct PhaseTable {
    /// Unique table identifier (e.g. "rpcs3-settings").
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    /// Overrides the configured window capacity when set.
    pub window_capacity: Option<usize>,
    /// Finds the serial code; has an `id` capture.
    pub serial_pattern: Regex,
    /// Finds the product title printed by the emulator; has a `title`
    /// capture.
    pub title_pattern: Regex,
    pub phases: Vec<PhaseDescriptor>,
    /// Whether this is a built-in table (true) or user-defined (false).
    pub is_builtin: bool,
}

// =============================================================================
// Status codes
// =============================================================================

/// Payload-free status, used for comparisons and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Success,
    Piracy,
    Stop,
    Overflow,
    Fail,
    UnsupportedCodec,
}

impl StatusCode {
    /// Numeric code shared with existing bot integrations.
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Piracy => 1,
            Self::Stop => 2,
            Self::Overflow => -1,
            Self::Fail => -2,
            Self::UnsupportedCodec => -3,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "SUCCESS",
            Self::Piracy => "PIRACY",
            Self::Stop => "STOP",
            Self::Overflow => "OVERFLOW",
            Self::Fail => "FAIL",
            Self::UnsupportedCodec => "UNSUPPORTED_CODEC",
        })
    }
}

/// A banned phrase found in a phase window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PiracyHit {
    pub phase_index: usize,
    pub phase_name: String,
    /// The banned phrase as listed.
    pub trigger: String,
    /// The log line that contained it.
    pub context: String,
}

/// Why an analysis could not produce a usable result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// A declared extraction pattern did not match its window.
    PatternMismatch,
    /// The stream ended before the terminal phase completed.
    Truncated,
    /// The bytes are not valid text.
    InvalidEncoding,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PatternMismatch => "extraction pattern did not match",
            Self::Truncated => "log ended before the final section",
            Self::InvalidEncoding => "log is not valid UTF-8",
        })
    }
}

/// Context for a `Fail` status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionFailure {
    pub phase_index: usize,
    pub phase_name: String,
    /// The trigger that finalized the phase; `None` when the failure was not
    /// caused by a trigger (end of stream, decoding).
    pub trigger: Option<String>,
    pub reason: FailureReason,
}

/// Which bound an `Overflow` status tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowSource {
    /// Cumulative bytes fed to the engine.
    LogBytes,
    /// A single unterminated line.
    LineLength,
    /// Undecodable bytes carried across chunks.
    PendingBytes,
}

/// Result of feeding one line to the phase engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedStatus {
    Success,
    Piracy(PiracyHit),
    Stop,
    Overflow {
        consumed: u64,
        limit: u64,
        source: OverflowSource,
    },
    Fail(ExtractionFailure),
    /// Propagated from the stream adapter; the engine never produces it.
    UnsupportedCodec { detail: String },
}

impl FeedStatus {
    pub fn code(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::Success,
            Self::Piracy(_) => StatusCode::Piracy,
            Self::Stop => StatusCode::Stop,
            Self::Overflow { .. } => StatusCode::Overflow,
            Self::Fail(_) => StatusCode::Fail,
            Self::UnsupportedCodec { .. } => StatusCode::UnsupportedCodec,
        }
    }

    /// True for statuses that end the analysis without a section result.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Piracy(_) | Self::Overflow { .. } | Self::Fail(_) | Self::UnsupportedCodec { .. }
        )
    }
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success | Self::Stop => write!(f, "{}", self.code()),
            Self::Piracy(hit) => write!(
                f,
                "PIRACY: '{}' in phase {} ({})",
                hit.trigger, hit.phase_index, hit.phase_name
            ),
            Self::Overflow {
                consumed,
                limit,
                source,
            } => write!(
                f,
                "OVERFLOW: {consumed} bytes consumed, limit {limit} ({source:?})"
            ),
            Self::Fail(failure) => match &failure.trigger {
                Some(trigger) => write!(
                    f,
                    "FAIL: {} in phase {} ({}) at trigger '{trigger}'",
                    failure.reason, failure.phase_index, failure.phase_name
                ),
                None => write!(
                    f,
                    "FAIL: {} in phase {} ({})",
                    failure.reason, failure.phase_index, failure.phase_name
                ),
            },
            Self::UnsupportedCodec { detail } => write!(f, "UNSUPPORTED_CODEC: {detail}"),
        }
    }
}

// =============================================================================
// Analysis (sanitized result of one log section)
// =============================================================================

/// Everything extracted from one log section, already sanitized for output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Analysis {
    /// Id of the phase table that produced this analysis.
    pub table_id: String,
    /// Zero-based index of the section within the stream (increments on
    /// rearm).
    pub section: usize,
    pub fields: FieldMap,
    pub libraries: Vec<String>,
    pub product: ProductDescriptor,
    pub piracy: Option<PiracyHit>,
    /// False for best-effort snapshots of an unfinished section.
    pub complete: bool,
}

impl Analysis {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

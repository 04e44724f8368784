// LogWarden - core/phase.rs
//
// Phase table parsing, validation, and compilation.
// Core layer: accepts TOML strings, never touches the filesystem.
// I/O is handled by app::phase_mgr which feeds content here.

use crate::core::model::{
    Completion, FlushProbeKind, HandlerKind, PhaseDescriptor, PhaseTable, TriggerMode,
};
use crate::util::constants;
use crate::util::error::PhaseTableError;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

// =============================================================================
// TOML deserialization structures (raw input)
// =============================================================================

/// Raw TOML phase table as deserialized from a .toml file.
/// Validated and compiled into a `PhaseTable` for runtime use.
#[derive(Debug, Deserialize)]
pub struct PhaseTableDefinition {
    pub table: TableMeta,
    #[serde(default)]
    pub phases: Vec<PhaseDef>,
}

#[derive(Debug, Deserialize)]
pub struct TableMeta {
    pub id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub window_capacity: Option<usize>,
    #[serde(default)]
    pub serial_pattern: Option<String>,
    #[serde(default)]
    pub title_pattern: Option<String>,
}

fn default_version() -> String {
    "1".to_string()
}

#[derive(Debug, Deserialize)]
pub struct PhaseDef {
    pub name: String,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default, rename = "match")]
    pub trigger_mode: TriggerMode,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub handlers: Vec<HandlerKind>,
    #[serde(default)]
    pub flush_probe: Option<FlushProbeKind>,
    #[serde(default)]
    pub on_trigger: Completion,
}

// =============================================================================
// Validation and compilation
// =============================================================================

/// Parse a TOML string into a `PhaseTableDefinition`.
///
/// `source_path` is used for error messages only (not for I/O).
pub fn parse_table_toml(
    toml_content: &str,
    source_path: &Path,
) -> Result<PhaseTableDefinition, PhaseTableError> {
    toml::from_str(toml_content).map_err(|e| PhaseTableError::TomlParse {
        path: source_path.to_path_buf(),
        source: e,
    })
}

/// Validate a `PhaseTableDefinition` and compile it into a runtime `PhaseTable`.
///
/// Validates:
/// - Required fields are present and non-empty
/// - Every phase has at least one non-empty trigger, within the trigger cap
/// - Patterns are valid and within size limits
/// - `stop`/`rearm` only appear on the last phase
pub fn validate_and_compile(
    def: PhaseTableDefinition,
    is_builtin: bool,
) -> Result<PhaseTable, PhaseTableError> {
    let id = def.table.id.trim().to_string();

    if id.is_empty() {
        return Err(PhaseTableError::MissingField {
            table_id: "(empty)".to_string(),
            field: "table.id",
        });
    }
    if def.table.name.trim().is_empty() {
        return Err(PhaseTableError::MissingField {
            table_id: id,
            field: "table.name",
        });
    }
    if def.phases.is_empty() {
        return Err(PhaseTableError::MissingField {
            table_id: id,
            field: "phases",
        });
    }
    if def.phases.len() > constants::MAX_PHASES_PER_TABLE {
        return Err(PhaseTableError::TooManyPhases {
            table_id: id,
            count: def.phases.len(),
            max: constants::MAX_PHASES_PER_TABLE,
        });
    }

    let last = def.phases.len() - 1;
    let mut phases = Vec::with_capacity(def.phases.len());

    for (index, phase) in def.phases.into_iter().enumerate() {
        if phase.name.trim().is_empty() {
            return Err(PhaseTableError::MissingField {
                table_id: id,
                field: "phases.name",
            });
        }

        let triggers: Vec<String> = phase
            .triggers
            .into_iter()
            .filter(|t| !t.trim().is_empty())
            .collect();
        if triggers.is_empty() {
            return Err(PhaseTableError::MissingField {
                table_id: id,
                field: "phases.triggers",
            });
        }
        if triggers.len() > constants::MAX_TRIGGERS_PER_PHASE {
            return Err(PhaseTableError::TooManyTriggers {
                table_id: id,
                phase: phase.name,
                count: triggers.len(),
                max: constants::MAX_TRIGGERS_PER_PHASE,
            });
        }

        if index != last && phase.on_trigger != Completion::Advance {
            return Err(PhaseTableError::MisplacedCompletion {
                table_id: id,
                phase: phase.name,
            });
        }

        let pattern = match phase.pattern.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => Some(compile_regex(&id, &phase.name, p)?),
            _ => None,
        };

        if phase.flush_probe.is_some() && pattern.is_none() {
            tracing::warn!(
                table_id = %id,
                phase = %phase.name,
                "Phase declares a flush probe but no pattern; the probe has nothing to extract"
            );
        }

        phases.push(PhaseDescriptor {
            name: phase.name,
            triggers,
            trigger_mode: phase.trigger_mode,
            pattern,
            handlers: phase.handlers,
            flush_probe: phase.flush_probe,
            on_trigger: phase.on_trigger,
        });
    }

    let serial_pattern = compile_regex(
        &id,
        "table.serial_pattern",
        def.table
            .serial_pattern
            .as_deref()
            .unwrap_or(constants::SERIAL_PATTERN),
    )?;
    if !serial_pattern.capture_names().flatten().any(|n| n == "id") {
        return Err(PhaseTableError::MissingField {
            table_id: id,
            field: "table.serial_pattern (id capture)",
        });
    }
    let title_pattern = compile_regex(
        &id,
        "table.title_pattern",
        def.table
            .title_pattern
            .as_deref()
            .unwrap_or(constants::TITLE_PATTERN),
    )?;
    if !title_pattern.capture_names().flatten().any(|n| n == "title") {
        return Err(PhaseTableError::MissingField {
            table_id: id,
            field: "table.title_pattern (title capture)",
        });
    }

    let window_capacity = def
        .table
        .window_capacity
        .map(|c| c.clamp(constants::MIN_WINDOW_CAPACITY, constants::MAX_WINDOW_CAPACITY));

    Ok(PhaseTable {
        id,
        name: def.table.name,
        version: def.table.version,
        description: def.table.description,
        window_capacity,
        serial_pattern,
        title_pattern,
        phases,
        is_builtin,
    })
}

/// Compile a regex pattern with length validation to prevent ReDoS.
fn compile_regex(table_id: &str, phase: &str, pattern: &str) -> Result<Regex, PhaseTableError> {
    if pattern.len() > constants::MAX_REGEX_PATTERN_LENGTH {
        return Err(PhaseTableError::RegexTooLong {
            table_id: table_id.to_string(),
            phase: phase.to_string(),
            length: pattern.len(),
            max_length: constants::MAX_REGEX_PATTERN_LENGTH,
        });
    }

    Regex::new(pattern).map_err(|e| PhaseTableError::InvalidRegex {
        table_id: table_id.to_string(),
        phase: phase.to_string(),
        pattern: pattern.to_string(),
        source: e,
    })
}

// =============================================================================
// Built-in tables (embedded at compile time)
// =============================================================================

/// Embedded TOML content for built-in tables.
/// Each tuple is (filename, TOML content).
pub fn builtin_table_sources() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "rpcs3_settings.toml",
            include_str!("../../phases/rpcs3_settings.toml"),
        ),
        (
            "rpcs3_session.toml",
            include_str!("../../phases/rpcs3_session.toml"),
        ),
    ]
}

/// Load and validate all built-in tables.
///
/// Invalid tables are logged as errors and skipped (non-fatal).
pub fn load_builtin_tables() -> Vec<PhaseTable> {
    let mut tables = Vec::new();

    for (filename, content) in builtin_table_sources() {
        let path = Path::new("<builtin>").join(filename);
        match parse_table_toml(content, &path).and_then(|def| validate_and_compile(def, true)) {
            Ok(table) => {
                tracing::debug!(
                    table_id = %table.id,
                    phases = table.phases.len(),
                    "Loaded built-in phase table"
                );
                tables.push(table);
            }
            Err(e) => {
                tracing::error!(file = filename, error = %e, "Failed to load built-in phase table");
            }
        }
    }

    tables
}

// =============================================================================
// Tests
// =============================================================================

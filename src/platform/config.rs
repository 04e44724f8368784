// LogWarden - platform/config.rs
//
// Platform-specific configuration, data directory resolution, and config.toml
// loading with startup validation (Rule 13).
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Resolved platform paths for LogWarden data and configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/logwarden/)
    pub config_dir: PathBuf,

    /// User phase-table directory (e.g. ~/.config/logwarden/phases/)
    pub user_phases_dir: PathBuf,

    /// Data directory for caches and scratch files.
    pub data_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let user_phases_dir = config_dir.join(constants::PHASES_DIR_NAME);
            let data_dir = proj_dirs.data_dir().to_path_buf();

            tracing::debug!(
                config = %config_dir.display(),
                phases = %user_phases_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                user_phases_dir,
                data_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                config_dir: fallback.clone(),
                user_phases_dir: fallback.join(constants::PHASES_DIR_NAME),
                data_dir: fallback,
            }
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation (Rule 13)
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub parsing: ParsingSection,
    pub phases: PhasesSection,
    pub moderation: ModerationSection,
    pub resolver: ResolverSection,
    pub report: ReportSection,
    pub logging: LoggingSection,
}

/// `[parsing]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ParsingSection {
    /// Read chunk size in bytes.
    pub chunk_size_bytes: Option<usize>,
    /// Cumulative log size cap in bytes.
    pub max_log_bytes: Option<u64>,
    /// Longest unterminated line in bytes.
    pub max_line_bytes: Option<usize>,
    /// Undecodable bytes carried across chunks.
    pub max_pending_bytes: Option<usize>,
    /// Lines kept per phase window.
    pub window_capacity: Option<usize>,
    /// Directory for archive scratch files.
    pub scratch_directory: Option<String>,
}

/// `[phases]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct PhasesSection {
    /// Table id used when none is given on the command line.
    pub default_table: Option<String>,
    /// Additional phase-table directory.
    pub user_table_directory: Option<String>,
}

/// `[moderation]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ModerationSection {
    /// Inline banned phrases, highest priority first.
    pub banned_phrases: Option<Vec<String>>,
    /// File with one banned phrase per line.
    pub banned_phrases_file: Option<String>,
}

/// `[resolver]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ResolverSection {
    /// JSON export of the compatibility database.
    pub catalog_file: Option<String>,
}

/// `[report]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ReportSection {
    /// Characters per fenced plain-text segment.
    pub segment_chars: Option<usize>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Log file path (empty = stderr only).
    pub file: Option<String>,
}

/// Validated application configuration derived from `config.toml`.
///
/// All values are validated against named constants at load time (Rule 13).
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // -- Parsing --
    pub chunk_size: usize,
    pub max_log_bytes: u64,
    pub max_line_bytes: usize,
    pub max_pending_bytes: usize,
    pub window_capacity: usize,
    pub scratch_dir: Option<PathBuf>,

    // -- Phases --
    pub phase_table: String,
    pub user_table_dir: Option<PathBuf>,

    // -- Moderation --
    pub banned_phrases: Vec<String>,
    pub banned_phrases_file: Option<PathBuf>,

    // -- Resolver --
    pub catalog_file: Option<PathBuf>,

    // -- Report --
    pub segment_chars: usize,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
    /// Log file path.
    pub log_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chunk_size: constants::DEFAULT_CHUNK_SIZE,
            max_log_bytes: constants::DEFAULT_MAX_LOG_BYTES,
            max_line_bytes: constants::DEFAULT_MAX_LINE_BYTES,
            max_pending_bytes: constants::DEFAULT_MAX_PENDING_BYTES,
            window_capacity: constants::DEFAULT_WINDOW_CAPACITY,
            scratch_dir: None,
            phase_table: constants::DEFAULT_PHASE_TABLE.to_string(),
            user_table_dir: None,
            banned_phrases: Vec::new(),
            banned_phrases_file: None,
            catalog_file: None,
            segment_chars: constants::DEFAULT_SEGMENT_CHARS,
            log_level: None,
            log_file: None,
        }
    }
}

impl AppConfig {
    /// Inline phrases followed by the phrases file, if one is configured.
    pub fn banned_phrase_list(&self) -> Result<Vec<String>, ConfigError> {
        let mut phrases = self.banned_phrases.clone();
        if let Some(path) = &self.banned_phrases_file {
            phrases.extend(read_banned_phrases(path)?);
        }
        if phrases.len() > constants::MAX_BANNED_PHRASES {
            tracing::warn!(
                count = phrases.len(),
                max = constants::MAX_BANNED_PHRASES,
                "Banned phrase list truncated"
            );
            phrases.truncate(constants::MAX_BANNED_PHRASES);
        }
        Ok(phrases)
    }
}

/// Read a banned-phrase file: one phrase per line, `#` starts a comment
/// line, blank lines are ignored.
pub fn read_banned_phrases(path: &Path) -> Result<Vec<String>, ConfigError> {
    let metadata = std::fs::metadata(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if metadata.len() > constants::MAX_BANNED_FILE_SIZE {
        return Err(ConfigError::ValueOutOfRange {
            field: "moderation.banned_phrases_file".to_string(),
            value: format!("{} ({} bytes)", path.display(), metadata.len()),
            expected: format!("at most {} bytes", constants::MAX_BANNED_FILE_SIZE),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let phrases: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect();

    tracing::debug!(path = %path.display(), count = phrases.len(), "Loaded banned phrases");
    Ok(phrases)
}

/// Load and validate `config.toml` from the given config directory.
pub fn load_config(config_dir: &Path) -> (AppConfig, Vec<String>) {
    load_config_file(&config_dir.join(constants::CONFIG_FILE_NAME))
}

/// Load and validate a config file.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// If the file does not exist, returns defaults with no warnings (first-run).
/// If the file is unparseable, returns defaults with an error warning
/// (fail-fast on misconfiguration per Rule 13 -- the application still starts
/// but the user is informed).
pub fn load_config_file(config_path: &Path) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), warnings);
    }

    let content = match std::fs::read_to_string(config_path) {
        Ok(c) => c,
        Err(e) => {
            let msg = format!(
                "Could not read config file '{}': {e}. Using defaults.",
                config_path.display()
            );
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    let raw: RawConfig = match toml::from_str(&content) {
        Ok(r) => r,
        Err(e) => {
            let msg = format!(
                "Failed to parse config file '{}': {e}. Using defaults.",
                config_path.display()
            );
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    tracing::info!(path = %config_path.display(), "Loaded config.toml");
    let config = validate(raw, &mut warnings);

    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }

    (config, warnings)
}

/// Validate each field against named constants, accumulating all warnings.
fn validate(raw: RawConfig, warnings: &mut Vec<String>) -> AppConfig {
    let mut config = AppConfig::default();

    // -- Parsing: chunk_size_bytes --
    if let Some(size) = raw.parsing.chunk_size_bytes {
        if (constants::MIN_CHUNK_SIZE..=constants::MAX_CHUNK_SIZE).contains(&size) {
            config.chunk_size = size;
        } else {
            warnings.push(format!(
                "[parsing] chunk_size_bytes = {size} is out of range ({}-{}). Using default ({}).",
                constants::MIN_CHUNK_SIZE,
                constants::MAX_CHUNK_SIZE,
                constants::DEFAULT_CHUNK_SIZE,
            ));
        }
    }

    // -- Parsing: max_log_bytes --
    if let Some(bytes) = raw.parsing.max_log_bytes {
        if (constants::MIN_MAX_LOG_BYTES..=constants::ABSOLUTE_MAX_LOG_BYTES).contains(&bytes) {
            config.max_log_bytes = bytes;
        } else {
            warnings.push(format!(
                "[parsing] max_log_bytes = {bytes} is out of range ({}-{}). Using default ({}).",
                constants::MIN_MAX_LOG_BYTES,
                constants::ABSOLUTE_MAX_LOG_BYTES,
                constants::DEFAULT_MAX_LOG_BYTES,
            ));
        }
    }

    // -- Parsing: max_line_bytes --
    if let Some(bytes) = raw.parsing.max_line_bytes {
        if (1..=constants::ABSOLUTE_MAX_LINE_BYTES).contains(&bytes) {
            config.max_line_bytes = bytes;
        } else {
            warnings.push(format!(
                "[parsing] max_line_bytes = {bytes} is out of range (1-{}). Using default ({}).",
                constants::ABSOLUTE_MAX_LINE_BYTES,
                constants::DEFAULT_MAX_LINE_BYTES,
            ));
        }
    }

    // -- Parsing: max_pending_bytes --
    // A UTF-8 character is at most 4 bytes, so 3 is the smallest cap that
    // lets every split character through.
    if let Some(bytes) = raw.parsing.max_pending_bytes {
        if (3..=constants::MIN_CHUNK_SIZE).contains(&bytes) {
            config.max_pending_bytes = bytes;
        } else {
            warnings.push(format!(
                "[parsing] max_pending_bytes = {bytes} is out of range (3-{}). Using default ({}).",
                constants::MIN_CHUNK_SIZE,
                constants::DEFAULT_MAX_PENDING_BYTES,
            ));
        }
    }

    // -- Parsing: window_capacity --
    if let Some(lines) = raw.parsing.window_capacity {
        if (constants::MIN_WINDOW_CAPACITY..=constants::MAX_WINDOW_CAPACITY).contains(&lines) {
            config.window_capacity = lines;
        } else {
            warnings.push(format!(
                "[parsing] window_capacity = {lines} is out of range ({}-{}). Using default ({}).",
                constants::MIN_WINDOW_CAPACITY,
                constants::MAX_WINDOW_CAPACITY,
                constants::DEFAULT_WINDOW_CAPACITY,
            ));
        }
    }

    config.scratch_dir = non_empty_path(raw.parsing.scratch_directory);

    // -- Phases --
    if let Some(table) = raw.phases.default_table {
        if table.trim().is_empty() {
            warnings.push(format!(
                "[phases] default_table is empty. Using default ({}).",
                constants::DEFAULT_PHASE_TABLE
            ));
        } else {
            config.phase_table = table.trim().to_string();
        }
    }
    config.user_table_dir = non_empty_path(raw.phases.user_table_directory);

    // -- Moderation --
    if let Some(phrases) = raw.moderation.banned_phrases {
        config.banned_phrases = phrases;
    }
    config.banned_phrases_file = non_empty_path(raw.moderation.banned_phrases_file);

    // -- Resolver --
    config.catalog_file = non_empty_path(raw.resolver.catalog_file);

    // -- Report: segment_chars --
    if let Some(chars) = raw.report.segment_chars {
        if (constants::MIN_SEGMENT_CHARS..=constants::DEFAULT_SEGMENT_CHARS).contains(&chars) {
            config.segment_chars = chars;
        } else {
            warnings.push(format!(
                "[report] segment_chars = {chars} is out of range ({}-{}). Using default ({}).",
                constants::MIN_SEGMENT_CHARS,
                constants::DEFAULT_SEGMENT_CHARS,
                constants::DEFAULT_SEGMENT_CHARS,
            ));
        }
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.clone());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default ({}).",
                constants::DEFAULT_LOG_LEVEL,
            ));
        }
    }

    // -- Logging: file --
    if let Some(ref file) = raw.logging.file {
        if !file.is_empty() {
            config.log_file = Some(file.clone());
        }
    }

    config
}

fn non_empty_path(value: Option<String>) -> Option<PathBuf> {
    value.filter(|v| !v.trim().is_empty()).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, body: &str) {
        std::fs::write(dir.join(constants::CONFIG_FILE_NAME), body).unwrap();
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, warnings) = load_config(dir.path());
        assert!(warnings.is_empty());
        assert_eq!(config.max_log_bytes, constants::DEFAULT_MAX_LOG_BYTES);
        assert_eq!(config.phase_table, constants::DEFAULT_PHASE_TABLE);
    }

    #[test]
    fn test_valid_values_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
[parsing]
max_log_bytes = 1048576
window_capacity = 512

[phases]
default_table = "rpcs3-session"

[moderation]
banned_phrases = ["cracktool"]

[report]
segment_chars = 1500

[logging]
level = "debug"

[future_section]
ignored = true
"#,
        );
        let (config, warnings) = load_config(dir.path());
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(config.max_log_bytes, 1_048_576);
        assert_eq!(config.window_capacity, 512);
        assert_eq!(config.phase_table, "rpcs3-session");
        assert_eq!(config.banned_phrases, vec!["cracktool"]);
        assert_eq!(config.segment_chars, 1_500);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_out_of_range_values_warn_and_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "[parsing]\nmax_log_bytes = 1\nwindow_capacity = 1\n\n[report]\nsegment_chars = 5000\n",
        );
        let (config, warnings) = load_config(dir.path());
        assert_eq!(warnings.len(), 3);
        assert_eq!(config.max_log_bytes, constants::DEFAULT_MAX_LOG_BYTES);
        assert_eq!(config.window_capacity, constants::DEFAULT_WINDOW_CAPACITY);
        assert_eq!(config.segment_chars, constants::DEFAULT_SEGMENT_CHARS);
    }

    #[test]
    fn test_unparseable_file_warns() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "[parsing\n");
        let (config, warnings) = load_config(dir.path());
        assert_eq!(warnings.len(), 1);
        assert_eq!(config.chunk_size, constants::DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_banned_phrase_file_merges_after_inline() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("banned.txt");
        std::fs::write(&file, "# comment\nwarez\n\n  cracked by  \n").unwrap();

        let config = AppConfig {
            banned_phrases: vec!["cracktool".to_string()],
            banned_phrases_file: Some(file),
            ..AppConfig::default()
        };
        assert_eq!(
            config.banned_phrase_list().unwrap(),
            vec!["cracktool", "warez", "cracked by"]
        );
    }
}

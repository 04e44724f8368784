// LogWarden - app/context.rs
//
// Everything an analysis needs besides the attachment itself: the selected
// phase table, resource limits, the shared banned-phrase list and the
// product resolver. One context serves many concurrent analyses; each gets
// its own engine.

use crate::app::catalog::UnknownResolver;
use crate::core::engine::{EngineLimits, PhaseEngine};
use crate::core::lines::LineLimits;
use crate::core::model::{PhaseTable, ProductResolver};
use crate::core::moderation::BannedPhrases;
use crate::platform::config::AppConfig;
use crate::platform::stream::StreamConfig;
use crate::util::error::ConfigError;
use std::sync::Arc;

#[derive(Clone)]
pub struct AnalyzerContext {
    pub table: Arc<PhaseTable>,
    pub engine_limits: EngineLimits,
    pub line_limits: LineLimits,
    pub stream: StreamConfig,
    pub banned: BannedPhrases,
    pub resolver: Arc<dyn ProductResolver>,
}

impl AnalyzerContext {
    /// Context with default limits, no banned phrases and no resolver data.
    pub fn new(table: PhaseTable) -> Self {
        Self {
            table: Arc::new(table),
            engine_limits: EngineLimits::default(),
            line_limits: LineLimits::default(),
            stream: StreamConfig::default(),
            banned: BannedPhrases::default(),
            resolver: Arc::new(UnknownResolver),
        }
    }

    /// Context with the limits from a validated config.
    pub fn from_config(config: &AppConfig, table: PhaseTable) -> Self {
        Self {
            engine_limits: EngineLimits {
                max_log_bytes: config.max_log_bytes,
                window_capacity: config.window_capacity,
            },
            line_limits: LineLimits {
                max_pending_bytes: config.max_pending_bytes,
                max_line_bytes: config.max_line_bytes,
            },
            stream: StreamConfig {
                chunk_size: config.chunk_size,
                max_log_bytes: config.max_log_bytes,
                scratch_dir: config.scratch_dir.clone(),
                ..StreamConfig::default()
            },
            ..Self::new(table)
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ProductResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_banned(mut self, banned: BannedPhrases) -> Self {
        self.banned = banned;
        self
    }

    /// Fresh engine for one analysis.
    pub fn engine(&self) -> PhaseEngine {
        PhaseEngine::new(
            Arc::clone(&self.table),
            self.engine_limits,
            self.banned.clone(),
            Arc::clone(&self.resolver),
        )
    }

    /// Re-read the configured banned phrases and swap them in. Analyses
    /// already running keep the snapshot they took.
    pub fn reload_banned(&self, config: &AppConfig) -> Result<usize, ConfigError> {
        let phrases = config.banned_phrase_list()?;
        self.banned.replace(phrases);
        Ok(self.banned.len())
    }
}

impl std::fmt::Debug for AnalyzerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerContext")
            .field("table", &self.table.id)
            .field("engine_limits", &self.engine_limits)
            .field("line_limits", &self.line_limits)
            .field("banned", &self.banned.len())
            .finish_non_exhaustive()
    }
}

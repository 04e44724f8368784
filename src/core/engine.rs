// LogWarden - core/engine.rs
//
// The phase engine: consumes log lines one at a time, buffers them in the
// active phase's bounded window, and finalizes the phase when one of its
// triggers appears. Finalization extracts named fields, runs the phase
// handlers, and moves to the next phase, stops, or rearms.
//
// Once a fatal status (or a plain stop) has been returned the engine is
// halted and every later call returns that same status.

use crate::core::model::{
    Analysis, Completion, ExtractionFailure, FailureReason, FeedStatus, FieldMap, HandlerKind,
    OverflowSource, PhaseDescriptor, PhaseTable, PiracyHit, ProductDescriptor, ProductResolver,
};
use crate::core::moderation::{self, BannedPhrases};
use crate::core::sanitize;
use crate::util::{constants, logging};
use regex::{Captures, Regex};
use std::collections::VecDeque;
use std::sync::Arc;

/// Resource bounds for one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    /// Cumulative bytes (line plus terminator) accepted per section.
    pub max_log_bytes: u64,
    /// Lines retained per phase window, unless the table overrides it.
    pub window_capacity: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_log_bytes: constants::DEFAULT_MAX_LOG_BYTES,
            window_capacity: constants::DEFAULT_WINDOW_CAPACITY,
        }
    }
}

// =============================================================================
// Parse state
// =============================================================================

/// Mutable state of one log section. Replaced wholesale on rearm; the
/// stream-wide byte total lives on the engine.
#[derive(Debug, Default)]
pub struct ParseState {
    phase_index: usize,
    window: VecDeque<String>,
    /// Raw bytes fed during this section.
    consumed: u64,
    /// Lines fed during this section, trigger lines included.
    lines: u64,
    fields: FieldMap,
    libraries: Vec<String>,
    piracy: Option<PiracyHit>,
    product: ProductDescriptor,
    serial: Option<String>,
    /// Title printed by the emulator, used when the resolver has no record.
    log_title: Option<String>,
    /// The active phase already extracted through its flush probe.
    extracted_eagerly: bool,
}

impl ParseState {
    pub fn phase_index(&self) -> usize {
        self.phase_index
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Raw (unsanitized) fields extracted so far.
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }
}

// =============================================================================
// Engine
// =============================================================================

pub struct PhaseEngine {
    table: Arc<PhaseTable>,
    limits: EngineLimits,
    banned: BannedPhrases,
    resolver: Arc<dyn ProductResolver>,
    state: ParseState,
    /// Raw bytes fed across every section of the stream.
    consumed: u64,
    completed: Vec<Analysis>,
    sections: usize,
    halted: Option<FeedStatus>,
}

impl PhaseEngine {
    pub fn new(
        table: Arc<PhaseTable>,
        limits: EngineLimits,
        banned: BannedPhrases,
        resolver: Arc<dyn ProductResolver>,
    ) -> Self {
        tracing::debug!(
            table_id = %table.id,
            version = %table.version,
            phases = table.phases.len(),
            max_log_bytes = limits.max_log_bytes,
            "Phase engine created"
        );
        Self {
            table,
            limits,
            banned,
            resolver,
            state: ParseState::default(),
            consumed: 0,
            completed: Vec::new(),
            sections: 0,
            halted: None,
        }
    }

    pub fn table(&self) -> &PhaseTable {
        &self.table
    }

    pub fn state(&self) -> &ParseState {
        &self.state
    }

    /// Raw bytes fed since the engine was created. Not reset on rearm.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Number of sections completed so far (including ones already taken).
    pub fn sections_completed(&self) -> usize {
        self.sections
    }

    fn window_capacity(&self) -> usize {
        self.table
            .window_capacity
            .unwrap_or(self.limits.window_capacity)
            .max(1)
    }

    /// Feed one line (without its terminator), counted as `line.len() + 1`
    /// bytes.
    pub fn feed(&mut self, line: &str) -> FeedStatus {
        self.feed_counted(line, line.len() as u64 + 1)
    }

    /// Feed one line that occupied `raw_bytes` in the source, terminator,
    /// carriage return and byte-order mark included.
    pub fn feed_counted(&mut self, line: &str, raw_bytes: u64) -> FeedStatus {
        if let Some(status) = &self.halted {
            return status.clone();
        }

        self.consumed = self.consumed.saturating_add(raw_bytes);
        self.state.consumed += raw_bytes;
        self.state.lines += 1;
        if self.consumed > self.limits.max_log_bytes {
            return self.halt(FeedStatus::Overflow {
                consumed: self.consumed,
                limit: self.limits.max_log_bytes,
                source: OverflowSource::LogBytes,
            });
        }

        let table = Arc::clone(&self.table);
        let phase = &table.phases[self.state.phase_index];
        if let Some(trigger) = phase.matched_trigger(line) {
            return self.finalize_phase(&table, Some(trigger));
        }
        self.buffer_line(&table, line)
    }

    /// Signal end of stream.
    ///
    /// In the last phase, end of stream acts as its trigger. Anywhere else
    /// the log is truncated, unless an earlier section already completed.
    pub fn finish(&mut self) -> FeedStatus {
        if let Some(status) = &self.halted {
            return status.clone();
        }

        let table = Arc::clone(&self.table);
        let last = table.phases.len() - 1;
        let fresh_after_rearm = self.sections > 0 && self.state.lines == 0;

        if self.state.phase_index == last && !fresh_after_rearm {
            return self.finalize_phase(&table, None);
        }
        if self.sections > 0 {
            return self.halt(FeedStatus::Stop);
        }

        let phase = &table.phases[self.state.phase_index];
        self.halt(FeedStatus::Fail(ExtractionFailure {
            phase_index: self.state.phase_index,
            phase_name: phase.name.clone(),
            trigger: None,
            reason: FailureReason::Truncated,
        }))
    }

    /// Sections completed since the last call, oldest first.
    pub fn take_completed(&mut self) -> Vec<Analysis> {
        std::mem::take(&mut self.completed)
    }

    /// Best-effort snapshot of the section in progress.
    pub fn partial_analysis(&self) -> Analysis {
        self.build_analysis(false)
    }

    // -------------------------------------------------------------------------
    // Line buffering
    // -------------------------------------------------------------------------

    fn buffer_line(&mut self, table: &PhaseTable, line: &str) -> FeedStatus {
        let index = self.state.phase_index;
        let phase = &table.phases[index];

        if self.state.window.len() >= self.window_capacity() {
            if let Some(probe) = phase.flush_probe {
                let recognized = self
                    .state
                    .window
                    .front()
                    .is_some_and(|oldest| probe.recognizes(oldest));
                if recognized {
                    self.extract_eagerly(phase);
                }
            }
            if let Some(evicted) = self.state.window.pop_front() {
                if let Some(status) = self.inspect_evicted(table, index, &evicted) {
                    return self.halt(status);
                }
            }
        }

        self.state.window.push_back(line.to_string());
        FeedStatus::Success
    }

    fn extract_eagerly(&mut self, phase: &PhaseDescriptor) {
        let Some(pattern) = &phase.pattern else {
            return;
        };
        let text = self.window_text();
        match pattern.captures(&text) {
            Some(caps) => {
                merge_captures(&mut self.state.fields, pattern, &caps);
                self.state.extracted_eagerly = true;
                tracing::debug!(phase = %phase.name, "Flush probe extracted fields early");
            }
            None => {
                tracing::debug!(phase = %phase.name, "Flush probe matched but pattern did not");
            }
        }
    }

    /// Line-level handler checks for a line leaving the window.
    fn inspect_evicted(&mut self, table: &PhaseTable, index: usize, line: &str) -> Option<FeedStatus> {
        let phase = &table.phases[index];
        for handler in &phase.handlers {
            match handler {
                HandlerKind::BannedContent => {
                    let phrases = self.banned.snapshot();
                    if let Some(found) = moderation::find_banned(&phrases, std::iter::once(line)) {
                        let hit = moderation::piracy_hit(index, &phase.name, found);
                        self.state.piracy = Some(hit.clone());
                        return Some(FeedStatus::Piracy(hit));
                    }
                }
                HandlerKind::ResolveProduct => self.observe_product_line(table, line),
                HandlerKind::CollectLibraries => {}
            }
        }
        None
    }

    // -------------------------------------------------------------------------
    // Phase finalization
    // -------------------------------------------------------------------------

    fn finalize_phase(&mut self, table: &PhaseTable, trigger: Option<&str>) -> FeedStatus {
        let index = self.state.phase_index;
        let phase = &table.phases[index];
        let text = self.window_text();

        if let Some(pattern) = &phase.pattern {
            match pattern.captures(&text) {
                Some(caps) => merge_captures(&mut self.state.fields, pattern, &caps),
                None if self.state.extracted_eagerly => {
                    tracing::debug!(
                        phase = %phase.name,
                        "Pattern did not match remaining window; keeping early extraction"
                    );
                }
                None => {
                    return self.halt(FeedStatus::Fail(ExtractionFailure {
                        phase_index: index,
                        phase_name: phase.name.clone(),
                        trigger: trigger.map(str::to_string),
                        reason: FailureReason::PatternMismatch,
                    }));
                }
            }
        }

        for handler in &phase.handlers {
            match handler {
                HandlerKind::ResolveProduct => {
                    let window = std::mem::take(&mut self.state.window);
                    for line in &window {
                        self.observe_product_line(table, line);
                    }
                    self.state.window = window;
                    if self.state.serial.is_none() {
                        tracing::debug!(phase = %phase.name, "No serial code found; product stays unknown");
                    }
                }
                HandlerKind::BannedContent => {
                    let phrases = self.banned.snapshot();
                    let found = moderation::find_banned(
                        &phrases,
                        self.state.window.iter().map(String::as_str),
                    );
                    if let Some(found) = found {
                        let hit = moderation::piracy_hit(index, &phase.name, found);
                        self.state.piracy = Some(hit.clone());
                        return self.halt(FeedStatus::Piracy(hit));
                    }
                }
                HandlerKind::CollectLibraries => {
                    let libraries = parse_libraries(&text);
                    if !libraries.is_empty() {
                        self.state.libraries = libraries;
                    }
                }
            }
        }

        let is_last = index + 1 == table.phases.len();
        match phase.on_trigger {
            Completion::Rearm if trigger.is_some() => {
                self.complete_section();
                tracing::info!(
                    table_id = %table.id,
                    sections = self.sections,
                    trigger = trigger.unwrap_or_default(),
                    "Section complete; rearming"
                );
                self.state = ParseState::default();
                FeedStatus::Stop
            }
            Completion::Advance if !is_last => {
                tracing::debug!(
                    phase = %phase.name,
                    index,
                    trigger = trigger.unwrap_or_default(),
                    window = self.state.window.len(),
                    "Phase complete"
                );
                self.state.phase_index += 1;
                self.state.window.clear();
                self.state.extracted_eagerly = false;
                FeedStatus::Success
            }
            _ => {
                self.complete_section();
                self.halt(FeedStatus::Stop)
            }
        }
    }

    fn observe_product_line(&mut self, table: &PhaseTable, line: &str) {
        if self.state.serial.is_none() {
            if let Some(id) = first_capture(&table.serial_pattern, line, "id") {
                let serial = id.to_ascii_uppercase();
                tracing::debug!(serial = %serial, "Resolving product serial");
                let mut product = self.resolver.resolve(&serial);
                if product.serial.is_none() {
                    product.serial = Some(serial.clone());
                }
                self.state.product = product;
                self.state.serial = Some(serial);
            }
        }
        if self.state.log_title.is_none() {
            if let Some(title) = first_capture(&table.title_pattern, line, "title") {
                self.state.log_title = Some(title.to_string());
            }
        }
    }

    // -------------------------------------------------------------------------
    // Results
    // -------------------------------------------------------------------------

    fn complete_section(&mut self) {
        let analysis = self.build_analysis(true);
        tracing::info!(
            table_id = %self.table.id,
            section = analysis.section,
            fields = analysis.fields.len(),
            libraries = analysis.libraries.len(),
            "Section analysed"
        );
        self.completed.push(analysis);
        self.sections += 1;
    }

    fn build_analysis(&self, complete: bool) -> Analysis {
        let mut product = self.state.product.clone();
        if !product.is_known() && product.title.is_none() {
            product.title = self.state.log_title.clone();
        }

        Analysis {
            table_id: self.table.id.clone(),
            section: self.sections,
            fields: sanitize::sanitize_fields(&self.state.fields),
            libraries: self
                .state
                .libraries
                .iter()
                .map(|l| sanitize::sanitize(l))
                .collect(),
            product: sanitize::sanitize_product(&product),
            piracy: self.state.piracy.as_ref().map(sanitize::sanitize_piracy),
            complete,
        }
    }

    fn halt(&mut self, status: FeedStatus) -> FeedStatus {
        match &status {
            FeedStatus::Piracy(hit) => tracing::warn!(
                table_id = %self.table.id,
                phase = %hit.phase_name,
                trigger = %hit.trigger,
                context = logging::preview(&hit.context),
                "Banned content detected"
            ),
            FeedStatus::Stop => tracing::debug!(table_id = %self.table.id, "Engine stopped"),
            other => tracing::info!(
                table_id = %self.table.id,
                phase = self.state.phase_index,
                consumed = self.consumed,
                status = %other,
                "Analysis halted"
            ),
        }
        self.halted = Some(status.clone());
        status
    }

    /// Window lines joined with `\n`, with a trailing `\n`.
    fn window_text(&self) -> String {
        let len = self.state.window.iter().map(|l| l.len() + 1).sum();
        let mut text = String::with_capacity(len);
        for line in &self.state.window {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

/// Merge named, non-empty captures into `fields`, trimmed. Later values
/// overwrite earlier ones.
fn merge_captures(fields: &mut FieldMap, pattern: &Regex, caps: &Captures<'_>) {
    for name in pattern.capture_names().flatten() {
        if let Some(m) = caps.name(name) {
            let value = m.as_str().trim();
            if !value.is_empty() {
                fields.insert(name.to_string(), value.to_string());
            }
        }
    }
}

fn first_capture<'t>(pattern: &Regex, line: &'t str, name: &str) -> Option<&'t str> {
    pattern
        .captures(line)
        .and_then(|caps| caps.name(name))
        .map(|m| m.as_str().trim())
        .filter(|v| !v.is_empty())
}

/// Library names listed after `Load libraries:`, either inline as `[a, b]`
/// or as following `- name` lines. The `.sprx` suffix is dropped.
pub fn parse_libraries(text: &str) -> Vec<String> {
    let Some(start) = text.find(constants::LIBRARIES_MARKER) else {
        return Vec::new();
    };
    let mut lines = text[start + constants::LIBRARIES_MARKER.len()..].lines();
    let inline = lines.next().unwrap_or_default().trim();

    if let Some(inner) = inline.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return inner
            .split(',')
            .map(clean_library)
            .filter(|l| !l.is_empty())
            .collect();
    }

    let mut libraries = Vec::new();
    for line in lines {
        match line.trim_start().strip_prefix('-') {
            Some(item) => {
                let name = clean_library(item);
                if !name.is_empty() {
                    libraries.push(name);
                }
            }
            None => break,
        }
    }
    libraries
}

fn clean_library(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(constants::LIBRARY_SUFFIX)
        .trim()
        .to_string()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{ProductStatus, StatusCode};
    use crate::core::phase;
    use std::path::Path;

    struct FixedResolver;

    impl ProductResolver for FixedResolver {
        fn resolve(&self, serial: &str) -> ProductDescriptor {
            if serial == "BLUS30443" {
                ProductDescriptor {
                    serial: Some(serial.to_string()),
                    title: Some("Demon's Souls".to_string()),
                    status: ProductStatus::Playable,
                    ..ProductDescriptor::default()
                }
            } else {
                ProductDescriptor::unresolved(serial)
            }
        }
    }

    fn table(toml: &str) -> Arc<PhaseTable> {
        let def = phase::parse_table_toml(toml, Path::new("test.toml")).unwrap();
        Arc::new(phase::validate_and_compile(def, false).unwrap())
    }

    fn engine(toml: &str, banned: &[&str]) -> PhaseEngine {
        PhaseEngine::new(
            table(toml),
            EngineLimits::default(),
            BannedPhrases::new(banned.iter().map(|s| s.to_string()).collect()),
            Arc::new(FixedResolver),
        )
    }

    fn feed_all(engine: &mut PhaseEngine, lines: &[&str]) -> Vec<FeedStatus> {
        lines.iter().map(|l| engine.feed(l)).collect()
    }

    const SYSTEM_TABLE: &str = r#"
[table]
id = "system"
name = "System"

[[phases]]
name = "system"
triggers = ["Core:"]
pattern = '(?P<build>RPCS3 v\S+)'
handlers = ["resolve_product", "banned_content"]

[[phases]]
name = "core"
triggers = ["Log:"]
on_trigger = "stop"
"#;

    #[test]
    fn test_overflow_one_byte_past_cap() {
        let mut engine = engine(
            r#"
[table]
id = "never"
name = "Never"

[[phases]]
name = "only"
triggers = ["this trigger never appears"]
"#,
            &[],
        );

        // 1023 chars + terminator = 1 KiB per line; fill the cap exactly.
        let line = "x".repeat(1023);
        let lines = constants::DEFAULT_MAX_LOG_BYTES / 1024;
        for _ in 0..lines {
            assert_eq!(engine.feed(&line), FeedStatus::Success);
        }
        assert_eq!(engine.consumed(), constants::DEFAULT_MAX_LOG_BYTES);

        match engine.feed("") {
            FeedStatus::Overflow {
                consumed,
                limit,
                source,
            } => {
                assert_eq!(consumed, constants::DEFAULT_MAX_LOG_BYTES + 1);
                assert_eq!(limit, constants::DEFAULT_MAX_LOG_BYTES);
                assert_eq!(source, OverflowSource::LogBytes);
            }
            other => panic!("Expected Overflow, got: {other:?}"),
        }
        assert_eq!(engine.feed("more").code(), StatusCode::Overflow);
        assert_eq!(engine.finish().code(), StatusCode::Overflow);
    }

    #[test]
    fn test_piracy_beats_successful_extraction() {
        let mut engine = engine(SYSTEM_TABLE, &["cracktool"]);
        let statuses = feed_all(
            &mut engine,
            &["RPCS3 v0.0.5-6668", "SYS: Loaded with CrackTool v2", "Core:"],
        );

        match &statuses[2] {
            FeedStatus::Piracy(hit) => {
                assert_eq!(hit.trigger, "cracktool");
                assert_eq!(hit.context, "SYS: Loaded with CrackTool v2");
                assert_eq!(hit.phase_index, 0);
                assert_eq!(hit.phase_name, "system");
            }
            other => panic!("Expected Piracy, got: {other:?}"),
        }
        // The pattern ran before the policy check.
        let partial = engine.partial_analysis();
        assert_eq!(partial.field("build"), Some("RPCS3 v0.0.5-6668"));
        assert!(partial.piracy.is_some());
        assert!(!partial.complete);
        assert_eq!(engine.feed("Log:").code(), StatusCode::Piracy);
    }

    #[test]
    fn test_pattern_mismatch_is_fatal_with_context() {
        let mut engine = engine(SYSTEM_TABLE, &[]);
        let statuses = feed_all(&mut engine, &["no build line here", "Core:"]);
        assert_eq!(
            statuses[1],
            FeedStatus::Fail(ExtractionFailure {
                phase_index: 0,
                phase_name: "system".to_string(),
                trigger: Some("Core:".to_string()),
                reason: FailureReason::PatternMismatch,
            })
        );
        assert!(engine.is_halted());
        assert_eq!(engine.feed("Log:"), statuses[1]);
    }

    #[test]
    fn test_phase_without_pattern_is_noop() {
        let mut engine = engine(
            r#"
[table]
id = "plain"
name = "Plain"

[[phases]]
name = "vfs"
triggers = ["Video:"]

[[phases]]
name = "video"
triggers = ["Audio:"]
"#,
            &[],
        );
        assert_eq!(engine.feed("/dev_hdd0/: $(EmulatorDir)dev_hdd0/"), FeedStatus::Success);
        assert_eq!(engine.feed("Video:"), FeedStatus::Success);
        assert_eq!(engine.state().phase_index(), 1);
        assert_eq!(engine.state().window_len(), 0, "trigger line is not buffered");
    }

    #[test]
    fn test_rearm_produces_independent_sections() {
        let mut engine = engine(
            r#"
[table]
id = "rearm"
name = "Rearm"

[[phases]]
name = "settings"
triggers = ["Core:"]
pattern = 'Build: (?P<build>\S+)'

[[phases]]
name = "body"
triggers = ["Stopping emulator..."]
pattern = '(?s)\A(?:.*?GPU: (?P<gpu>[^\n]*))?'
on_trigger = "rearm"
"#,
            &[],
        );

        let first = feed_all(
            &mut engine,
            &["Build: A", "Core:", "GPU: GeForce", "Stopping emulator..."],
        );
        assert_eq!(first.last(), Some(&FeedStatus::Stop));
        assert!(!engine.is_halted());
        assert_eq!(engine.state().phase_index(), 0);
        assert_eq!(engine.state().consumed(), 0);
        assert_eq!(engine.state().lines(), 0);
        assert_eq!(engine.consumed(), 49, "stream total survives the rearm");

        let second = feed_all(&mut engine, &["Build: B", "Core:", "Stopping emulator..."]);
        assert_eq!(second.last(), Some(&FeedStatus::Stop));
        assert_eq!(engine.finish(), FeedStatus::Stop);

        let sections = engine.take_completed();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].section, 0);
        assert_eq!(sections[0].field("build"), Some("A"));
        assert_eq!(sections[0].field("gpu"), Some("GeForce"));
        assert_eq!(sections[1].section, 1);
        assert_eq!(sections[1].field("build"), Some("B"));
        assert_eq!(sections[1].field("gpu"), None, "no carry-over between sections");
    }

    const SESSION_TABLE: &str = r#"
[table]
id = "session"
name = "Session"

[[phases]]
name = "session"
triggers = ["Stopping emulator..."]
on_trigger = "rearm"
"#;

    #[test]
    fn test_rearmed_sections_share_the_byte_cap() {
        let mut engine = PhaseEngine::new(
            table(SESSION_TABLE),
            EngineLimits {
                max_log_bytes: 1024,
                ..EngineLimits::default()
            },
            BannedPhrases::default(),
            Arc::new(FixedResolver),
        );

        // 101 + 21 bytes per section; no single section comes near the cap.
        let filler = "x".repeat(100);
        let mut overflow = None;
        for _ in 0..20 {
            let statuses = feed_all(&mut engine, &[&filler, "Stopping emulator..."]);
            if let Some(status) = statuses.into_iter().find(|s| s.code() == StatusCode::Overflow) {
                overflow = Some(status);
                break;
            }
        }

        match overflow {
            Some(FeedStatus::Overflow { consumed, limit, .. }) => {
                assert_eq!(limit, 1024);
                assert!(consumed > 1024);
            }
            other => panic!("Expected Overflow, got: {other:?}"),
        }
        assert_eq!(engine.sections_completed(), 8);
        assert!(engine.is_halted());
    }

    #[test]
    fn test_finish_right_after_rearm_does_not_open_a_section() {
        let mut engine = engine(SESSION_TABLE, &[]);
        assert_eq!(engine.feed("Booting"), FeedStatus::Success);
        assert_eq!(engine.feed("Stopping emulator..."), FeedStatus::Stop);
        assert_eq!(engine.finish(), FeedStatus::Stop);
        assert_eq!(engine.take_completed().len(), 1);
    }

    #[test]
    fn test_empty_line_after_rearm_opens_a_section() {
        let mut engine = engine(SESSION_TABLE, &[]);
        feed_all(&mut engine, &["Booting", "Stopping emulator..."]);
        assert_eq!(engine.feed_counted("", 1), FeedStatus::Success);
        assert_eq!(engine.state().lines(), 1);
        assert_eq!(engine.finish(), FeedStatus::Stop);
        assert_eq!(engine.take_completed().len(), 2);
    }

    #[test]
    fn test_feed_counted_charges_raw_bytes() {
        let mut engine = PhaseEngine::new(
            table(SESSION_TABLE),
            EngineLimits {
                max_log_bytes: 100,
                ..EngineLimits::default()
            },
            BannedPhrases::default(),
            Arc::new(FixedResolver),
        );

        // "filler line\r\n" is 13 bytes on disk but 11 after stripping.
        for _ in 0..7 {
            assert_eq!(engine.feed_counted("filler line", 13), FeedStatus::Success);
        }
        assert_eq!(engine.consumed(), 91);
        match engine.feed_counted("filler line", 13) {
            FeedStatus::Overflow { consumed, .. } => assert_eq!(consumed, 104),
            other => panic!("Expected Overflow, got: {other:?}"),
        }
    }

    const BANNER_TABLE: &str = r#"
[table]
id = "banner"
name = "Banner"
window_capacity = 16

[[phases]]
name = "body"
triggers = ["Stopping emulator..."]
pattern = "Found vulkan-compatible GPU: '(?P<vulkan_gpu>[^']*)'"
flush_probe = "driver_banner"
on_trigger = "stop"
"#;

    fn banner_run(toml: &str) -> (FeedStatus, PhaseEngine) {
        let mut engine = engine(toml, &[]);
        engine.feed("RSX: Found vulkan-compatible GPU: 'GeForce GTX 1070' running on driver 430.86.0.0");
        for i in 0..40 {
            assert_eq!(engine.feed(&format!("PPU: frame {i}")), FeedStatus::Success);
        }
        let status = engine.feed("Stopping emulator...");
        (status, engine)
    }

    #[test]
    fn test_flush_probe_extracts_before_eviction() {
        let (status, mut engine) = banner_run(BANNER_TABLE);
        assert_eq!(status, FeedStatus::Stop);
        let sections = engine.take_completed();
        assert_eq!(sections[0].field("vulkan_gpu"), Some("GeForce GTX 1070"));
    }

    #[test]
    fn test_without_flush_probe_banner_is_lost() {
        let toml = BANNER_TABLE.replace("flush_probe = \"driver_banner\"\n", "");
        let (status, _) = banner_run(&toml);
        assert_eq!(status.code(), StatusCode::Fail);
    }

    #[test]
    fn test_banned_phrase_scrolled_out_of_window_is_caught() {
        let mut engine = engine(
            r#"
[table]
id = "long"
name = "Long"
window_capacity = 16

[[phases]]
name = "system"
triggers = ["Core:"]
handlers = ["banned_content"]
"#,
            &["Warez"],
        );
        engine.feed("SYS: patched by warez group");
        let statuses: Vec<FeedStatus> = (0..40).map(|i| engine.feed(&format!("filler {i}"))).collect();
        let hit = statuses
            .iter()
            .find_map(|s| match s {
                FeedStatus::Piracy(hit) => Some(hit.clone()),
                _ => None,
            })
            .expect("evicted line must still be scanned");
        assert_eq!(hit.trigger, "Warez");
        assert_eq!(hit.context, "SYS: patched by warez group");
    }

    #[test]
    fn test_missing_serial_leaves_unknown_product() {
        let mut engine = engine(SYSTEM_TABLE, &[]);
        feed_all(&mut engine, &["RPCS3 v0.0.5", "SYS: nothing to see", "Core:"]);
        assert_eq!(engine.finish(), FeedStatus::Stop);
        let sections = engine.take_completed();
        assert_eq!(sections[0].product, ProductDescriptor::unknown());
    }

    #[test]
    fn test_serial_resolved_through_resolver() {
        let mut engine = engine(SYSTEM_TABLE, &[]);
        feed_all(
            &mut engine,
            &[
                "RPCS3 v0.0.5",
                "SYS: Title: Demon's Souls",
                "SYS: Serial: BLUS30443",
                "Core:",
                "Log:",
            ],
        );
        let sections = engine.take_completed();
        let product = &sections[0].product;
        assert_eq!(product.status, ProductStatus::Playable);
        assert_eq!(product.serial.as_deref(), Some("BLUS30443"));
    }

    #[test]
    fn test_unresolved_serial_keeps_log_title() {
        let mut engine = engine(SYSTEM_TABLE, &[]);
        feed_all(
            &mut engine,
            &[
                "RPCS3 v0.0.5",
                "SYS: Title: Homebrew Thing",
                "SYS: Serial: npeb99999",
                "Core:",
                "Log:",
            ],
        );
        let sections = engine.take_completed();
        let product = &sections[0].product;
        assert!(!product.is_known());
        assert_eq!(product.serial.as_deref(), Some("NPEB99999"));
        assert_eq!(product.title.as_deref(), Some("Homebrew Thing"));
    }

    #[test]
    fn test_end_of_stream_in_earlier_phase_is_truncated() {
        let mut engine = engine(SYSTEM_TABLE, &[]);
        engine.feed("RPCS3 v0.0.5");
        match engine.finish() {
            FeedStatus::Fail(failure) => {
                assert_eq!(failure.reason, FailureReason::Truncated);
                assert_eq!(failure.phase_index, 0);
                assert_eq!(failure.trigger, None);
            }
            other => panic!("Expected Fail, got: {other:?}"),
        }
    }

    #[test]
    fn test_fields_are_sanitized_in_analysis() {
        let mut engine = engine(SYSTEM_TABLE, &[]);
        feed_all(&mut engine, &["RPCS3 v`@everyone`", "Core:", "Log:"]);
        let raw = engine.state().fields().get("build").cloned().unwrap();
        assert_eq!(raw, "RPCS3 v`@everyone`");
        let sections = engine.take_completed();
        let build = sections[0].field("build").unwrap();
        assert_eq!(build, sanitize::sanitize(&raw));
        assert_eq!(sanitize::sanitize(build), build);
    }

    #[test]
    fn test_parse_libraries_list_and_inline_forms() {
        let listed = "Load libraries:\n  - libsysutil_np_trophy.sprx\n  - libfs.sprx\n  Hook static functions: false\n";
        assert_eq!(parse_libraries(listed), vec!["libsysutil_np_trophy", "libfs"]);
        assert!(parse_libraries("Load libraries: []\n").is_empty());
        assert_eq!(
            parse_libraries("Load libraries: [liba.sprx, libb.sprx]\n"),
            vec!["liba", "libb"]
        );
        assert!(parse_libraries("no marker\n").is_empty());
    }
}

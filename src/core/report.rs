// LogWarden - core/report.rs
//
// Renders an Analysis for the chat output surface: a plain-text summary split
// into fenced segments, or a structured report with a few named sections.
// Values are normalized for display here; the analysis itself keeps the raw
// (sanitized) strings.

use crate::core::model::{Analysis, FeedStatus, FieldMap, ProductDescriptor};
use crate::util::constants;
use serde::Serialize;

const FENCE_OPEN: &str = "```\n";
const FENCE_CLOSE: &str = "```";
const ELLIPSIS: char = '…';
const NO_PULL_REQUEST: &str = r"¯\_(ツ)_/¯";

/// Fields rendered as "N/A" rather than "Unknown" when absent.
const NUMERIC_FIELDS: &[&str] = &[
    "ppu_threads",
    "spu_threads",
    "spu_delay_penalty",
    "resolution_scale",
    "texture_scale_threshold",
];

/// One named block of a structured report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSection {
    pub name: String,
    pub body: String,
}

/// Multi-section report, serialized as JSON by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuredReport {
    pub title: String,
    pub sections: Vec<ReportSection>,
    /// Shown with partial (best-effort) reports.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ReportBuilder {
    segment_chars: usize,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self {
            segment_chars: constants::DEFAULT_SEGMENT_CHARS,
        }
    }
}

impl ReportBuilder {
    /// Builder with a custom segment size, clamped to the platform limit.
    pub fn new(segment_chars: usize) -> Self {
        Self {
            segment_chars: segment_chars
                .clamp(constants::MIN_SEGMENT_CHARS, constants::DEFAULT_SEGMENT_CHARS),
        }
    }

    pub fn segment_chars(&self) -> usize {
        self.segment_chars
    }

    /// Plain-text summary as fenced segments.
    pub fn plain_text(&self, analysis: &Analysis) -> Vec<String> {
        self.fence(&summary_lines(analysis))
    }

    /// Plain-text summary of an unfinished section, headed by a note naming
    /// the status that ended the analysis.
    pub fn best_effort(&self, analysis: &Analysis, status: &FeedStatus) -> Vec<String> {
        let mut lines = vec![early_termination_note(status), String::new()];
        lines.extend(summary_lines(analysis));
        self.fence(&lines)
    }

    pub fn structured(&self, analysis: &Analysis) -> StructuredReport {
        let fields = normalize_fields(&analysis.fields);
        let product = &analysis.product;

        let mut build_info = product_lines(product);
        build_info.extend(["build", "cpu_info"].iter().filter_map(|k| fields.get(*k).cloned()));

        let mut gpu = video_lines(&fields);
        gpu.extend(driver_lines(&fields));

        let mut sections = vec![
            section("Build Info", &build_info),
            section("CPU Settings", &cpu_lines(&fields)),
            section("GPU Settings", &gpu),
        ];
        if !analysis.libraries.is_empty() {
            sections.push(section(
                "Selected Libraries",
                &[analysis.libraries.join(", ")],
            ));
        }
        sections.truncate(constants::MAX_REPORT_SECTIONS);

        let notes = if analysis.complete {
            Vec::new()
        } else {
            vec!["Partial analysis: the log ended early or was rejected.".to_string()]
        };

        StructuredReport {
            title: product
                .title
                .clone()
                .or_else(|| product.serial.clone())
                .unwrap_or_else(|| constants::MISSING_FIELD.to_string()),
            sections,
            notes,
        }
    }

    /// Notice for a `PIRACY` result, or `None` when the analysis has no hit.
    pub fn piracy_notice(&self, analysis: &Analysis) -> Option<String> {
        analysis.piracy.as_ref().map(|hit| {
            format!(
                "Pirated release detected. The log contains the banned phrase \"{}\" (phase {}: {}). The log was not analysed.",
                hit.trigger, hit.phase_index, hit.phase_name
            )
        })
    }

    /// Pack lines into fenced segments. A line is never split across
    /// segments; a line too long for any segment is truncated.
    fn fence(&self, lines: &[String]) -> Vec<String> {
        let overhead = FENCE_OPEN.chars().count() + FENCE_CLOSE.chars().count();
        let budget = self.segment_chars - overhead;

        let mut segments = Vec::new();
        let mut body = String::new();
        let mut body_chars = 0;

        for line in lines {
            if body.is_empty() && line.is_empty() {
                continue;
            }
            let line = truncate_chars(line, budget - 1);
            let line_chars = line.chars().count() + 1;
            if body_chars + line_chars > budget {
                segments.push(wrap(&body));
                body.clear();
                body_chars = 0;
                if line.is_empty() {
                    continue;
                }
            }
            body.push_str(&line);
            body.push('\n');
            body_chars += line_chars;
        }
        if !body.is_empty() {
            segments.push(wrap(&body));
        }
        segments
    }
}

// =============================================================================
// Normalization
// =============================================================================

/// Display form of the extracted fields.
pub fn normalize_fields(fields: &FieldMap) -> FieldMap {
    let mut out = fields.clone();

    for key in ["ppu_threads", "spu_threads"] {
        if out.get(key).map(String::as_str) == Some("0") {
            out.insert(key.to_string(), "Auto".to_string());
        }
    }

    let af_label = match out.get("af_override").map(String::as_str) {
        Some("0") => Some("Auto"),
        Some("1") => Some("Disabled"),
        _ => None,
    };
    if let Some(label) = af_label {
        out.insert("af_override".to_string(), label.to_string());
    }

    if out.get("strict_rendering_mode").map(String::as_str) == Some("true") {
        out.insert("resolution_scale".to_string(), "Strict Mode".to_string());
    }

    if let Some(loader) = out.get_mut("lib_loader") {
        *loader = lib_loader_label(loader);
    }

    if matches!(out.get("gpu").map(String::as_str), Some("\"\"") | Some("")) {
        out.remove("gpu");
    }

    for value in out.values_mut() {
        match value.as_str() {
            "true" => *value = "✓".to_string(),
            "false" => *value = "✗".to_string(),
            _ => {}
        }
    }
    out
}

/// Short label for the library loader setting.
pub fn lib_loader_label(raw: &str) -> String {
    let lower = raw.to_lowercase();
    match (lower.contains("auto"), lower.contains("manual")) {
        (true, true) => "Auto & manual select".to_string(),
        (true, false) => "Auto".to_string(),
        (false, true) => "Manual selection".to_string(),
        (false, false) => raw.to_string(),
    }
}

fn value<'a>(fields: &'a FieldMap, key: &str) -> &'a str {
    match fields.get(key) {
        Some(v) => v,
        None if NUMERIC_FIELDS.contains(&key) => constants::MISSING_NUMERIC,
        None => constants::MISSING_FIELD,
    }
}

// =============================================================================
// Line layout
// =============================================================================

fn summary_lines(analysis: &Analysis) -> Vec<String> {
    let fields = normalize_fields(&analysis.fields);
    let mut lines = Vec::new();

    for key in ["build", "cpu_info"] {
        if let Some(v) = fields.get(key) {
            lines.push(v.clone());
        }
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }

    lines.extend(product_lines(&analysis.product));
    lines.push(String::new());

    lines.extend(cpu_lines(&fields));
    lines.push(format!("Selected Libraries: {}", libraries_text(analysis)));
    lines.push(String::new());

    lines.extend(video_lines(&fields));
    lines.extend(driver_lines(&fields));
    lines
}

fn cpu_lines(f: &FieldMap) -> Vec<String> {
    vec![
        format!(
            "PPU Decoder: {:>21} | Thread Scheduler: {}",
            value(f, "ppu_decoder"),
            value(f, "thread_scheduler")
        ),
        format!(
            "SPU Decoder: {:>21} | SPU Threads: {}",
            value(f, "spu_decoder"),
            value(f, "spu_threads")
        ),
        format!(
            "SPU Lower Thread Priority: {:>7} | Hook Static Functions: {}",
            value(f, "spu_lower_thread_priority"),
            value(f, "hook_static_functions")
        ),
        format!(
            "SPU Loop Detection: {:>14} | Lib Loader: {}",
            value(f, "spu_loop_detection"),
            value(f, "lib_loader")
        ),
        format!(
            "PPU Threads: {:>21} | SPU Delay Penalty: {}",
            value(f, "ppu_threads"),
            value(f, "spu_delay_penalty")
        ),
    ]
}

fn video_lines(f: &FieldMap) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Renderer: {:>24} | Frame Limit: {}",
            value(f, "renderer"),
            value(f, "frame_limit")
        ),
        format!(
            "Resolution: {:>22} | Write Color Buffers: {}",
            value(f, "resolution"),
            value(f, "write_color_buffers")
        ),
        format!(
            "Resolution Scale: {:>16} | Use GPU texture scaling: {}",
            value(f, "resolution_scale"),
            value(f, "gpu_texture_scaling")
        ),
        format!(
            "Resolution Scale Threshold: {:>6} | Anisotropic Filter Override: {}",
            value(f, "texture_scale_threshold"),
            value(f, "af_override")
        ),
        format!(
            "VSync: {:>27} | Strict Rendering Mode: {}",
            value(f, "vsync"),
            value(f, "strict_rendering_mode")
        ),
    ];
    if let Some(aspect) = f.get("aspect_ratio") {
        lines.push(format!("Aspect Ratio: {aspect:>20}"));
    }
    lines.push(format!("GPU: {:>29}", value(f, "gpu")));
    lines
}

/// Driver details found in the session body, when present.
fn driver_lines(f: &FieldMap) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(gpu) = f.get("vulkan_gpu") {
        match f.get("vulkan_driver_version") {
            Some(driver) => lines.push(format!("Vulkan GPU: {gpu} (driver {driver})")),
            None => lines.push(format!("Vulkan GPU: {gpu}")),
        }
    }
    if let Some(renderer) = f.get("gl_renderer") {
        lines.push(format!("GL Renderer: {renderer}"));
    }
    if let Some(version) = f.get("gl_version") {
        lines.push(format!("GL Version: {version}"));
    }
    lines
}

fn libraries_text(analysis: &Analysis) -> String {
    if analysis.libraries.is_empty() {
        constants::NO_LIBRARIES.to_string()
    } else {
        analysis.libraries.join(", ")
    }
}

/// Compatibility summary for the product, plus the thread link when known.
pub fn product_lines(product: &ProductDescriptor) -> Vec<String> {
    if product.is_known() {
        let updated = product
            .updated
            .map(|d| d.format(constants::CATALOG_DATE_FORMAT).to_string())
            .unwrap_or_default();
        let mut lines = vec![format!(
            "ID:{:9} Title:{:40} PR:{:4} Status:{:8} Updated:{:10}",
            product.serial.as_deref().unwrap_or_default(),
            trim_title(product.title.as_deref().unwrap_or(constants::MISSING_FIELD)),
            product
                .pull_request
                .map(|pr| pr.to_string())
                .unwrap_or_else(|| NO_PULL_REQUEST.to_string()),
            product.status.label(),
            updated,
        )];
        if let Some(thread) = product.thread {
            lines.push(format!("{}{thread}.html", constants::COMPAT_THREAD_URL_PREFIX));
        }
        return lines;
    }

    match &product.serial {
        Some(serial) => {
            let mut lines = vec![format!(
                "Product code {serial} was not found in compatibility database, possibly untested!"
            )];
            if let Some(title) = &product.title {
                lines.push(format!("Title: {title}"));
            }
            lines
        }
        None => vec!["No product code found in the log.".to_string()],
    }
}

fn trim_title(title: &str) -> String {
    if title.chars().count() <= constants::MAX_TITLE_CHARS {
        return title.to_string();
    }
    let mut out: String = title.chars().take(constants::MAX_TITLE_CHARS - 3).collect();
    out.push_str("...");
    out
}

fn early_termination_note(status: &FeedStatus) -> String {
    format!("Note: analysis ended early ({status}); the fields below may be incomplete.")
}

fn section(name: &str, lines: &[String]) -> ReportSection {
    let mut body = String::new();
    for line in lines {
        let needed = line.chars().count() + usize::from(!body.is_empty());
        if body.chars().count() + needed > constants::MAX_SECTION_CHARS {
            if body.is_empty() {
                body = truncate_chars(line, constants::MAX_SECTION_CHARS);
            }
            break;
        }
        if !body.is_empty() {
            body.push('\n');
        }
        body.push_str(line);
    }
    ReportSection {
        name: name.to_string(),
        body,
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push(ELLIPSIS);
    out
}

fn wrap(body: &str) -> String {
    format!("{FENCE_OPEN}{body}{FENCE_CLOSE}")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{ExtractionFailure, FailureReason, PiracyHit, ProductStatus};
    use chrono::NaiveDate;

    fn analysis(fields: &[(&str, &str)], libraries: &[&str]) -> Analysis {
        Analysis {
            table_id: "rpcs3-settings".to_string(),
            section: 0,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            libraries: libraries.iter().map(|s| s.to_string()).collect(),
            product: ProductDescriptor::unknown(),
            piracy: None,
            complete: true,
        }
    }

    fn known_product(title: &str) -> ProductDescriptor {
        ProductDescriptor {
            serial: Some("BLUS30443".to_string()),
            title: Some(title.to_string()),
            status: ProductStatus::Playable,
            thread: Some(1234),
            pull_request: Some(42),
            commit: None,
            updated: NaiveDate::from_ymd_opt(2019, 3, 2),
        }
    }

    #[test]
    fn test_normalization_rules() {
        let raw = analysis(
            &[
                ("spu_threads", "0"),
                ("ppu_threads", "2"),
                ("af_override", "1"),
                ("strict_rendering_mode", "true"),
                ("resolution_scale", "150"),
                ("lib_loader", "Load automatic and manual selection"),
                ("gpu", "\"\""),
                ("write_color_buffers", "false"),
            ],
            &[],
        );
        let f = normalize_fields(&raw.fields);
        assert_eq!(f["spu_threads"], "Auto");
        assert_eq!(f["ppu_threads"], "2");
        assert_eq!(f["af_override"], "Disabled");
        assert_eq!(f["resolution_scale"], "Strict Mode");
        assert_eq!(f["strict_rendering_mode"], "✓");
        assert_eq!(f["lib_loader"], "Auto & manual select");
        assert!(!f.contains_key("gpu"));
        assert_eq!(f["write_color_buffers"], "✗");

        let auto = normalize_fields(&analysis(&[("af_override", "0")], &[]).fields);
        assert_eq!(auto["af_override"], "Auto");
    }

    #[test]
    fn test_lib_loader_labels() {
        assert_eq!(lib_loader_label("Automatically load required libraries"), "Auto");
        assert_eq!(lib_loader_label("Manually load selected libraries"), "Manual selection");
        assert_eq!(lib_loader_label("Load liblv2.sprx only"), "Load liblv2.sprx only");
    }

    #[test]
    fn test_plain_text_column_layout_and_placeholders() {
        let a = analysis(
            &[
                ("ppu_decoder", "Recompiler (LLVM)"),
                ("thread_scheduler", "Operating System"),
                ("spu_threads", "0"),
            ],
            &[],
        );
        let segments = ReportBuilder::default().plain_text(&a);
        assert_eq!(segments.len(), 1);
        let text = &segments[0];
        assert!(text.starts_with("```\n"));
        assert!(text.ends_with("```"));
        assert!(text.contains("PPU Decoder:     Recompiler (LLVM) | Thread Scheduler: Operating System\n"));
        assert!(text.contains("| SPU Threads: Auto\n"));
        assert!(text.contains("Selected Libraries: None\n"));
        assert!(text.contains(&format!("GPU: {:>29}\n", "Unknown")));
        assert!(text.contains(&format!("Resolution Scale Threshold: {:>6} |", "N/A")));
    }

    #[test]
    fn test_segments_respect_limit_without_splitting_lines() {
        let builder = ReportBuilder::default();
        let lines: Vec<String> = (0..500).map(|i| format!("library line number {i:05}")).collect();
        let segments = builder.fence(&lines);
        assert!(segments.len() > 1);

        let mut rejoined = Vec::new();
        for segment in &segments {
            assert!(segment.chars().count() <= constants::DEFAULT_SEGMENT_CHARS);
            let body = segment
                .strip_prefix(FENCE_OPEN)
                .and_then(|s| s.strip_suffix(FENCE_CLOSE))
                .unwrap();
            rejoined.extend(body.lines().map(str::to_string));
        }
        assert_eq!(rejoined, lines);
    }

    #[test]
    fn test_overlong_line_is_truncated_with_ellipsis() {
        let builder = ReportBuilder::new(300);
        let segments = builder.fence(&["é".repeat(5_000)]);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].chars().count(), 300);
        assert!(segments[0].ends_with("…\n```"));
    }

    #[test]
    fn test_structured_sections_are_bounded() {
        let libraries: Vec<String> = (0..400).map(|i| format!("libsomething_{i}")).collect();
        let refs: Vec<&str> = libraries.iter().map(String::as_str).collect();
        let mut a = analysis(&[("build", "RPCS3 v0.0.5-6668")], &refs);
        a.product = known_product("Demon's Souls");

        let report = ReportBuilder::default().structured(&a);
        assert_eq!(report.title, "Demon's Souls");
        assert_eq!(report.sections.len(), 4);
        assert_eq!(report.sections[3].name, "Selected Libraries");
        for section in &report.sections {
            assert!(section.body.chars().count() <= constants::MAX_SECTION_CHARS);
        }
        assert!(report.notes.is_empty());

        let no_libs = ReportBuilder::default().structured(&analysis(&[], &[]));
        assert_eq!(no_libs.sections.len(), 3);
        assert_eq!(no_libs.title, "Unknown");
    }

    #[test]
    fn test_product_line_formats() {
        let lines = product_lines(&known_product("Demon's Souls"));
        assert!(lines[0].starts_with("ID:BLUS30443 Title:Demon's Souls"));
        assert!(lines[0].contains("PR:42   Status:Playable Updated:2019-03-02"));
        assert_eq!(lines[1], "https://forums.rpcs3.net/thread-1234.html");

        let long = product_lines(&known_product(&"x".repeat(50)));
        assert!(long[0].contains(&format!("Title:{}... PR", "x".repeat(37))));

        let missing = product_lines(&ProductDescriptor::unresolved("NPEB99999"));
        assert_eq!(
            missing[0],
            "Product code NPEB99999 was not found in compatibility database, possibly untested!"
        );
    }

    #[test]
    fn test_best_effort_report_carries_note() {
        let mut a = analysis(&[("build", "RPCS3 v0.0.5")], &[]);
        a.complete = false;
        let status = FeedStatus::Fail(ExtractionFailure {
            phase_index: 2,
            phase_name: "core".to_string(),
            trigger: Some("VFS:".to_string()),
            reason: FailureReason::PatternMismatch,
        });
        let segments = ReportBuilder::default().best_effort(&a, &status);
        assert!(segments[0].starts_with("```\nNote: analysis ended early (FAIL:"));
        assert!(segments[0].contains("RPCS3 v0.0.5"));
        assert_eq!(ReportBuilder::default().structured(&a).notes.len(), 1);
    }

    #[test]
    fn test_piracy_notice_names_trigger() {
        let mut a = analysis(&[], &[]);
        assert!(ReportBuilder::default().piracy_notice(&a).is_none());
        a.piracy = Some(PiracyHit {
            phase_index: 1,
            phase_name: "system".to_string(),
            trigger: "cracktool".to_string(),
            context: "SYS: cracktool".to_string(),
        });
        let notice = ReportBuilder::default().piracy_notice(&a).unwrap();
        assert!(notice.contains("\"cracktool\""));
    }
}

// LogWarden - tests/e2e_pipeline.rs
//
// End-to-end tests for the analysis pipeline.
//
// These tests exercise the real filesystem, the built-in phase tables,
// real gzip and zip encoding, and the report builder. An attachment goes
// from a file on disk to rendered report text with no mocks in between.

use flate2::write::GzEncoder;
use flate2::Compression;
use logwarden::app::catalog::CatalogResolver;
use logwarden::app::context::AnalyzerContext;
use logwarden::app::pipeline::{self, AnalysisRun};
use logwarden::app::{discovery, phase_mgr};
use logwarden::core::model::{FailureReason, FeedStatus, StatusCode};
use logwarden::core::moderation::BannedPhrases;
use logwarden::core::report::ReportBuilder;
use logwarden::platform::source::{self, FileSource};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// Helpers
// =============================================================================

/// Absolute path to the on-disk fixture files.
fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn sample_log() -> Vec<u8> {
    fs::read(fixture("rpcs3_sample.log")).unwrap()
}

/// Context for a built-in table with default limits.
fn context(table_id: &str) -> AnalyzerContext {
    let (tables, errors) = phase_mgr::load_all_tables(None);
    assert!(errors.is_empty(), "Built-in tables should load cleanly: {errors:?}");
    AnalyzerContext::new(phase_mgr::select_table(tables, table_id).unwrap())
}

fn analyze_file(ctx: &AnalyzerContext, path: &Path) -> AnalysisRun {
    pipeline::analyze_attachment(ctx, &FileSource::new(), &source::attachment_for_path(path)).unwrap()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn report_text(run: &AnalysisRun) -> String {
    let builder = ReportBuilder::default();
    run.sections
        .iter()
        .flat_map(|a| builder.plain_text(a))
        .collect::<Vec<_>>()
        .join("\n")
}

// =============================================================================
// Plain logs
// =============================================================================

/// The settings table extracts the configuration dump and stops at `Log:`.
#[test]
fn e2e_plain_log_produces_settings_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("RPCS3.log");
    fs::write(&path, sample_log()).unwrap();

    let run = analyze_file(&context("rpcs3-settings"), &path);

    assert_eq!(run.status, FeedStatus::Stop);
    assert_eq!(run.sections.len(), 1);
    assert!(run.partial.is_none());

    let analysis = &run.sections[0];
    assert!(analysis.complete);
    assert_eq!(analysis.field("build"), Some("RPCS3 v0.0.5-6668-a31d9c5 Alpha | HEAD"));
    assert_eq!(analysis.field("ppu_decoder"), Some("Recompiler (LLVM)"));
    assert_eq!(analysis.field("spu_threads"), Some("0"));
    assert_eq!(analysis.field("renderer"), Some("Vulkan"));
    assert_eq!(analysis.field("gpu"), Some("GeForce GTX 1070"));
    assert_eq!(analysis.libraries, vec!["libfs", "libsysutil_np_trophy"]);
    assert_eq!(analysis.product.serial.as_deref(), Some("BLUS30443"));
    assert_eq!(analysis.product.title.as_deref(), Some("Demon's Souls"));

    let text = report_text(&run);
    assert!(text.contains("SPU Threads: Auto"), "Report was:\n{text}");
    assert!(text.contains("Lib Loader: Auto"));
    assert!(text.contains("Selected Libraries: libfs, libsysutil_np_trophy"));
    assert!(text.contains("Product code BLUS30443 was not found in compatibility database"));
    assert!(text.contains("Title: Demon's Souls"));
}

/// A log cut off before the settings block finishes has no section result.
#[test]
fn e2e_truncated_log_fails_with_best_effort_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("RPCS3.log");
    let text = String::from_utf8(sample_log()).unwrap();
    let head: Vec<&str> = text.lines().take(20).collect();
    fs::write(&path, head.join("\n")).unwrap();

    let run = analyze_file(&context("rpcs3-settings"), &path);

    match &run.status {
        FeedStatus::Fail(failure) => {
            assert_eq!(failure.reason, FailureReason::Truncated);
            assert_eq!(failure.phase_name, "core");
        }
        other => panic!("Expected Fail, got: {other:?}"),
    }
    assert!(run.sections.is_empty());

    let partial = run.partial.as_ref().unwrap();
    assert!(!partial.complete);
    let report = ReportBuilder::default().best_effort(partial, &run.status).join("\n");
    assert!(report.contains("analysis ended early"));
    assert!(report.contains("RPCS3 v0.0.5-6668-a31d9c5 Alpha | HEAD"));
}

// =============================================================================
// Compressed attachments
// =============================================================================

/// Gzip and zip attachments of the same log give the same analysis.
#[test]
fn e2e_compressed_attachments_match_plain() {
    let dir = tempfile::tempdir().unwrap();
    let data = sample_log();

    let plain = dir.path().join("RPCS3.log");
    let gz = dir.path().join("RPCS3.log.gz");
    let zip = dir.path().join("RPCS3.zip");
    fs::write(&plain, &data).unwrap();
    fs::write(&gz, gzip(&data)).unwrap();
    fs::write(
        &zip,
        zip_archive(&[("readme.txt", &b"not a log"[..]), ("RPCS3.log", data.as_slice())]),
    )
    .unwrap();

    let ctx = context("rpcs3-settings");
    let expected = analyze_file(&ctx, &plain);
    for path in [&gz, &zip] {
        let run = analyze_file(&ctx, path);
        assert_eq!(run.status, FeedStatus::Stop, "{}", path.display());
        assert_eq!(run.sections, expected.sections, "{}", path.display());
    }
}

/// A zip entry compressed with a method the adapter does not inflate is
/// reported as its own status.
#[test]
fn e2e_unsupported_zip_codec_is_reported() {
    let mut archive = zip_archive(&[("RPCS3.log", sample_log().as_slice())]);
    // Method 9 (Deflate64) in the local and central headers.
    let local = find(&archive, &[0x50, 0x4b, 0x03, 0x04]);
    archive[local + 8] = 9;
    archive[local + 9] = 0;
    let central = find(&archive, &[0x50, 0x4b, 0x01, 0x02]);
    archive[central + 10] = 9;
    archive[central + 11] = 0;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("RPCS3.zip");
    fs::write(&path, archive).unwrap();

    let run = analyze_file(&context("rpcs3-settings"), &path);
    assert_eq!(run.status.code(), StatusCode::UnsupportedCodec);
    assert_eq!(run.status.code().code(), -3);
    assert!(run.sections.is_empty());
}

fn find(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
        .unwrap()
}

/// Spooled archives and extracted entries leave nothing behind.
#[test]
fn e2e_scratch_directory_is_left_empty() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let path = dir.path().join("RPCS3.zip");
    fs::write(&path, zip_archive(&[("RPCS3.log", sample_log().as_slice())])).unwrap();

    let mut ctx = context("rpcs3-settings");
    ctx.stream.scratch_dir = Some(scratch.path().to_path_buf());

    let run = analyze_file(&ctx, &path);
    assert_eq!(run.status, FeedStatus::Stop);
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}

// =============================================================================
// Moderation, resolution and rearm
// =============================================================================

/// A banned phrase in the system block ends the analysis before any report.
#[test]
fn e2e_banned_phrase_reports_piracy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("RPCS3.log");
    fs::write(&path, sample_log()).unwrap();

    let ctx = context("rpcs3-settings")
        .with_banned(BannedPhrases::new(vec!["game/blus30443/usrdir".to_string()]));
    let run = analyze_file(&ctx, &path);

    match &run.status {
        FeedStatus::Piracy(hit) => {
            assert_eq!(hit.trigger, "game/blus30443/usrdir");
            assert_eq!(hit.phase_name, "system");
            assert!(hit.context.contains("EBOOT.BIN"));
        }
        other => panic!("Expected Piracy, got: {other:?}"),
    }
    assert!(run.sections.is_empty());

    let partial = run.partial.as_ref().unwrap();
    let notice = ReportBuilder::default().piracy_notice(partial).unwrap();
    assert!(notice.contains("game/blus30443/usrdir"));
}

/// A catalog export resolves the serial into a compatibility line.
#[test]
fn e2e_catalog_resolves_product() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("RPCS3.log");
    fs::write(&path, sample_log()).unwrap();

    let catalog = CatalogResolver::load(&fixture("compat_catalog.json")).unwrap();
    assert_eq!(catalog.len(), 2);
    let ctx = context("rpcs3-settings").with_resolver(Arc::new(catalog));
    let run = analyze_file(&ctx, &path);

    let product = &run.sections[0].product;
    assert!(product.is_known());
    assert_eq!(product.pull_request, Some(5977));

    let text = report_text(&run);
    assert!(text.contains("ID:BLUS30443 Title:Demon's Souls"), "Report was:\n{text}");
    assert!(text.contains("PR:5977"));
    assert!(text.contains("Status:Playable"));
    assert!(text.contains("https://forums.rpcs3.net/thread-2781.html"));
}

/// Concatenated sessions are analysed independently by the rearming table.
#[test]
fn e2e_concatenated_sessions_rearm() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("RPCS3.log");
    let mut data = sample_log();
    let second = String::from_utf8(sample_log())
        .unwrap()
        .replace("Renderer: Vulkan", "Renderer: OpenGL")
        .replace("SPU Threads: 0", "SPU Threads: 4");
    data.extend_from_slice(second.as_bytes());
    fs::write(&path, data).unwrap();

    let run = analyze_file(&context("rpcs3-session"), &path);

    assert_eq!(run.status, FeedStatus::Stop);
    assert_eq!(run.sections.len(), 2);

    let (first, second) = (&run.sections[0], &run.sections[1]);
    assert_eq!((first.section, second.section), (0, 1));
    assert_eq!(first.field("renderer"), Some("Vulkan"));
    assert_eq!(second.field("renderer"), Some("OpenGL"));
    assert_eq!(first.field("spu_threads"), Some("0"));
    assert_eq!(second.field("spu_threads"), Some("4"));
    assert_eq!(first.field("aspect_ratio"), Some("16:9"));
    for section in [first, second] {
        assert_eq!(section.field("vulkan_gpu"), Some("GeForce GTX 1070"));
        assert_eq!(section.field("vulkan_driver_version"), Some("442.19.0.0"));
    }

    let text = report_text(&run);
    assert!(text.contains("Vulkan GPU: GeForce GTX 1070 (driver 442.19.0.0)"));
}

// =============================================================================
// Discovery
// =============================================================================

/// Only log-shaped attachments are picked up from a directory.
#[test]
fn e2e_discovery_filters_attachments() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("RPCS3.log"), b"x").unwrap();
    fs::write(dir.path().join("RPCS3.log.gz"), b"x").unwrap();
    fs::write(dir.path().join("notes.txt"), b"x").unwrap();
    fs::create_dir(dir.path().join("old")).unwrap();
    fs::write(dir.path().join("old").join("previous.zip"), b"x").unwrap();

    let roots = vec![dir.path().to_path_buf()];
    let (flat, _) = discovery::collect_attachments(&roots, false, 10);
    assert_eq!(flat.len(), 2);

    let (deep, _) = discovery::collect_attachments(&roots, true, 10);
    assert_eq!(deep.len(), 3);
    assert!(deep.iter().all(|p| !p.ends_with("notes.txt")));
}

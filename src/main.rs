// LogWarden - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. Config loading and logging initialisation (debug mode support)
// 3. Phase table, banned phrase and catalog loading
// 4. Parallel analysis of the given attachments and report output

use clap::{Parser, ValueEnum};
use logwarden::app::catalog::{CatalogResolver, UnknownResolver};
use logwarden::app::context::AnalyzerContext;
use logwarden::app::pipeline::{self, AnalysisRun};
use logwarden::app::{discovery, phase_mgr};
use logwarden::core::model::{FeedStatus, ProductResolver, StatusCode};
use logwarden::core::report::{ReportBuilder, StructuredReport};
use logwarden::platform::config::{self, PlatformPaths};
use logwarden::platform::source::{self, FileSource};
use logwarden::util;
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Exit code when every attachment was analysed to a clean stop.
const EXIT_OK: i32 = 0;
/// Exit code when setup failed or an attachment could not be read.
const EXIT_ERROR: i32 = 1;
/// Exit code when at least one attachment ended on a fatal status.
const EXIT_REJECTED: i32 = 2;

/// LogWarden - streaming emulator log analyser.
///
/// Reads plain, gzip or zip log attachments, extracts emulator settings with
/// a phase table and screens the log for banned content.
#[derive(Parser, Debug)]
#[command(name = "LogWarden", version, about)]
struct Cli {
    /// Log files or directories to analyse.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Descend into subdirectories when a directory is given.
    #[arg(short = 'r', long = "recursive")]
    recursive: bool,

    /// Config file (defaults to the platform config directory).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Phase table id to analyse with.
    #[arg(short = 't', long = "table")]
    table: Option<String>,

    /// Additional directory containing user-defined phase tables.
    #[arg(short = 'p', long = "phase-dir")]
    phase_dir: Option<PathBuf>,

    /// File with one banned phrase per line.
    #[arg(short = 'b', long = "banned")]
    banned: Option<PathBuf>,

    /// JSON export of the compatibility database.
    #[arg(long = "catalog")]
    catalog: Option<PathBuf>,

    /// Output format.
    #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Plain)]
    format: OutputFormat,

    /// Print a partial report when an analysis ends early.
    #[arg(long = "best-effort")]
    best_effort: bool,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Fenced plain-text segments.
    Plain,
    /// Named report sections as text.
    Structured,
    /// Structured reports as JSON.
    Json,
}

/// One attachment in `--format json` output.
#[derive(Serialize)]
struct JsonResult {
    file: String,
    status: Option<FeedStatus>,
    code: Option<i32>,
    reports: Vec<StructuredReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    best_effort: Option<StructuredReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let platform_paths = PlatformPaths::resolve();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| platform_paths.config_file());
    let (mut app_config, config_warnings) = config::load_config_file(&config_path);

    util::logging::init(
        cli.debug,
        app_config.log_level.as_deref(),
        app_config.log_file.as_deref(),
    );
    for warning in &config_warnings {
        tracing::warn!(warning = %warning, "Config warning");
    }

    tracing::info!(
        version = util::constants::APP_VERSION,
        debug = cli.debug,
        "LogWarden starting"
    );

    // Phase tables: CLI override > config > platform default
    let user_table_dir = cli
        .phase_dir
        .clone()
        .or_else(|| app_config.user_table_dir.clone())
        .unwrap_or_else(|| platform_paths.user_phases_dir.clone());
    let (tables, _table_errors) = phase_mgr::load_all_tables(Some(&user_table_dir));
    let table_id = cli.table.as_deref().unwrap_or(&app_config.phase_table);
    let table = match phase_mgr::select_table(tables, table_id) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(error = %e, "No usable phase table");
            eprintln!("Error: {e}");
            std::process::exit(EXIT_ERROR);
        }
    };

    // Product resolver: a catalog that fails to load degrades to unknown.
    let catalog_path = cli.catalog.as_ref().or(app_config.catalog_file.as_ref());
    let resolver: Arc<dyn ProductResolver> = match catalog_path {
        Some(path) => match CatalogResolver::load(path) {
            Ok(catalog) => Arc::new(catalog),
            Err(e) => {
                tracing::warn!(error = %e, "Catalog unavailable; products will be unresolved");
                Arc::new(UnknownResolver)
            }
        },
        None => Arc::new(UnknownResolver),
    };

    if let Some(path) = &cli.banned {
        app_config.banned_phrases_file = Some(path.clone());
    }
    let ctx = AnalyzerContext::from_config(&app_config, table).with_resolver(resolver);
    match ctx.reload_banned(&app_config) {
        Ok(count) => tracing::debug!(count, "Banned phrases ready"),
        Err(e) => {
            tracing::error!(error = %e, "Could not load banned phrases");
            eprintln!("Error: {e}");
            std::process::exit(EXIT_ERROR);
        }
    }

    let (files, discovery_warnings) =
        discovery::collect_attachments(&cli.paths, cli.recursive, util::constants::DEFAULT_MAX_DEPTH);
    for warning in &discovery_warnings {
        tracing::warn!(warning = %warning, "Discovery warning");
    }
    if files.is_empty() {
        eprintln!("Error: no log attachments found");
        std::process::exit(EXIT_ERROR);
    }

    let file_source = FileSource::new();
    let results: Vec<(PathBuf, Result<AnalysisRun, String>)> = files
        .par_iter()
        .map(|path| {
            let attachment = source::attachment_for_path(path);
            let result = pipeline::analyze_attachment(&ctx, &file_source, &attachment)
                .map_err(|e| e.to_string());
            (path.clone(), result)
        })
        .collect();

    let builder = ReportBuilder::new(app_config.segment_chars);
    let exit_code = match cli.format {
        OutputFormat::Json => print_json(&builder, &results, cli.best_effort),
        format => print_text(&builder, &results, format, cli.best_effort),
    };
    std::process::exit(exit_code);
}

fn exit_code_for(results: &[(PathBuf, Result<AnalysisRun, String>)]) -> i32 {
    let mut code = EXIT_OK;
    for (_, result) in results {
        match result {
            Err(_) => return EXIT_ERROR,
            Ok(run) if run.status.is_fatal() => code = EXIT_REJECTED,
            Ok(_) => {}
        }
    }
    code
}

fn print_text(
    builder: &ReportBuilder,
    results: &[(PathBuf, Result<AnalysisRun, String>)],
    format: OutputFormat,
    best_effort: bool,
) -> i32 {
    for (path, result) in results {
        let run = match result {
            Ok(run) => run,
            Err(e) => {
                eprintln!("{}: error: {e}", path.display());
                continue;
            }
        };

        println!("== {} [{}]", path.display(), run.status.code());
        for analysis in &run.sections {
            match format {
                OutputFormat::Structured => print_structured(&builder.structured(analysis)),
                _ => builder.plain_text(analysis).iter().for_each(|s| println!("{s}")),
            }
        }

        if run.status.code() == StatusCode::Piracy {
            if let Some(notice) = run.partial.as_ref().and_then(|a| builder.piracy_notice(a)) {
                println!("{notice}");
            }
        } else if run.status.is_fatal() {
            println!("{}", run.status);
            if best_effort {
                if let Some(partial) = &run.partial {
                    match format {
                        OutputFormat::Structured => print_structured(&builder.structured(partial)),
                        _ => builder
                            .best_effort(partial, &run.status)
                            .iter()
                            .for_each(|s| println!("{s}")),
                    }
                }
            }
        }
        println!();
    }
    exit_code_for(results)
}

fn print_structured(report: &StructuredReport) {
    println!("# {}", report.title);
    for note in &report.notes {
        println!("({note})");
    }
    for section in &report.sections {
        println!("## {}", section.name);
        println!("{}", section.body);
    }
}

fn print_json(
    builder: &ReportBuilder,
    results: &[(PathBuf, Result<AnalysisRun, String>)],
    best_effort: bool,
) -> i32 {
    let output: Vec<JsonResult> = results
        .iter()
        .map(|(path, result)| match result {
            Ok(run) => JsonResult {
                file: path.display().to_string(),
                status: Some(run.status.clone()),
                code: Some(run.status.code().code()),
                reports: run.sections.iter().map(|a| builder.structured(a)).collect(),
                best_effort: run
                    .partial
                    .as_ref()
                    .filter(|_| best_effort && run.status.code() != StatusCode::Piracy)
                    .map(|a| builder.structured(a)),
                error: None,
            },
            Err(e) => JsonResult {
                file: path.display().to_string(),
                status: None,
                code: None,
                reports: Vec::new(),
                best_effort: None,
                error: Some(e.clone()),
            },
        })
        .collect();

    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialise results");
            eprintln!("Error: {e}");
            return EXIT_ERROR;
        }
    }
    exit_code_for(results)
}

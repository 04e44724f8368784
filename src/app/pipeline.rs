// LogWarden - app/pipeline.rs
//
// Drives one attachment through the whole chain:
// source -> stream adapter -> line assembler -> phase engine.
//
// Analysis outcomes (including decoding problems and unsupported codecs) are
// reported as statuses. Only I/O failures around the pipeline, such as a
// source that cannot be opened or a spool that cannot be written, are
// returned as errors.

use crate::app::context::AnalyzerContext;
use crate::core::engine::PhaseEngine;
use crate::core::lines::SafeLineAssembler;
use crate::core::model::{
    Analysis, Attachment, ExtractionFailure, FailureReason, FeedStatus, LogEncoding, OverflowSource,
};
use crate::platform::source::AttachmentSource;
use crate::platform::stream;
use crate::util::error::{LineError, LogWardenError, StreamError};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;

/// Outcome of analysing one attachment.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRun {
    pub file_name: String,
    /// Status that ended the analysis.
    pub status: FeedStatus,
    /// Completed sections, oldest first. A fatal status after a rearm still
    /// leaves the earlier sections here.
    pub sections: Vec<Analysis>,
    /// Snapshot of the unfinished section, kept when the run ended on a
    /// fatal status so a best-effort report can be produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<Analysis>,
    /// Lines fed to the engine.
    pub lines: u64,
}

impl AnalysisRun {
    fn unsupported_codec(file_name: &str, detail: String) -> Self {
        Self {
            file_name: file_name.to_string(),
            status: FeedStatus::UnsupportedCodec { detail },
            sections: Vec::new(),
            partial: None,
            lines: 0,
        }
    }
}

/// Open `attachment` through `source` and analyse it.
pub fn analyze_attachment(
    ctx: &AnalyzerContext,
    source: &dyn AttachmentSource,
    attachment: &Attachment,
) -> Result<AnalysisRun, LogWardenError> {
    let encoding = attachment
        .encoding()
        .ok_or_else(|| StreamError::UnrecognizedAttachment {
            file_name: attachment.file_name.clone(),
        })?;

    let reader = source
        .open(attachment)
        .map_err(|source| LogWardenError::Io {
            path: PathBuf::from(&attachment.locator),
            operation: "opening attachment",
            source,
        })?;

    tracing::debug!(
        file = %attachment.file_name,
        encoding = ?encoding,
        declared_size = ?attachment.declared_size,
        "Analysing attachment"
    );
    analyze_reader(ctx, reader, encoding, &attachment.file_name)
}

/// Analyse an already-open byte stream.
pub fn analyze_reader(
    ctx: &AnalyzerContext,
    reader: Box<dyn Read + Send>,
    encoding: LogEncoding,
    file_name: &str,
) -> Result<AnalysisRun, LogWardenError> {
    let chunks = match stream::open_chunks(reader, encoding, &ctx.stream) {
        Ok(chunks) => chunks,
        Err(e @ StreamError::UnsupportedCodec { .. }) => {
            tracing::info!(file = file_name, error = %e, "Attachment uses an unsupported codec");
            return Ok(AnalysisRun::unsupported_codec(file_name, e.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let lines = SafeLineAssembler::new(chunks, ctx.line_limits).counted();
    run_lines(ctx, lines, file_name)
}

/// Feed `(line, source_bytes)` pairs to a fresh engine until it halts or the
/// lines run out.
pub fn run_lines<I>(ctx: &AnalyzerContext, lines: I, file_name: &str) -> Result<AnalysisRun, LogWardenError>
where
    I: Iterator<Item = Result<(String, u64), LineError>>,
{
    let mut engine = ctx.engine();
    let mut count: u64 = 0;
    let mut ended = None;

    for line in lines {
        match line {
            Ok((line, raw_bytes)) => {
                count += 1;
                let status = engine.feed_counted(&line, raw_bytes);
                if engine.is_halted() {
                    ended = Some(status);
                    break;
                }
            }
            Err(e) => {
                ended = Some(line_error_status(&engine, e)?);
                break;
            }
        }
    }

    let status = match ended {
        Some(status) => status,
        None => engine.finish(),
    };
    let sections = engine.take_completed();
    let partial = status.is_fatal().then(|| engine.partial_analysis());

    tracing::info!(
        file = file_name,
        status = %status,
        sections = sections.len(),
        lines = count,
        "Attachment analysed"
    );

    Ok(AnalysisRun {
        file_name: file_name.to_string(),
        status,
        sections,
        partial,
        lines: count,
    })
}

/// Map a line-assembly error to the status it stands for. Source I/O errors
/// are not analysis outcomes and are returned as errors.
fn line_error_status(engine: &PhaseEngine, error: LineError) -> Result<FeedStatus, LogWardenError> {
    let state = engine.state();
    match error {
        LineError::Source(e @ StreamError::UnsupportedCodec { .. }) => Ok(FeedStatus::UnsupportedCodec {
            detail: e.to_string(),
        }),
        LineError::Source(StreamError::LogTooLarge { limit }) => {
            tracing::info!(limit, consumed = engine.consumed(), "Decoded log exceeds the byte cap");
            Ok(FeedStatus::Overflow {
                consumed: limit + 1,
                limit,
                source: OverflowSource::LogBytes,
            })
        }
        LineError::Source(e) => Err(e.into()),
        LineError::InvalidEncoding { offset, .. } => {
            tracing::info!(offset, "Attachment is not valid UTF-8");
            let phase = &engine.table().phases[state.phase_index()];
            Ok(FeedStatus::Fail(ExtractionFailure {
                phase_index: state.phase_index(),
                phase_name: phase.name.clone(),
                trigger: None,
                reason: FailureReason::InvalidEncoding,
            }))
        }
        LineError::PendingOverflow { pending, limit } => Ok(FeedStatus::Overflow {
            consumed: pending as u64,
            limit: limit as u64,
            source: OverflowSource::PendingBytes,
        }),
        LineError::LineTooLong { length, limit } => Ok(FeedStatus::Overflow {
            consumed: length as u64,
            limit: limit as u64,
            source: OverflowSource::LineLength,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::phase_mgr;
    use crate::core::model::StatusCode;
    use crate::platform::source::FileSource;
    use std::io::Cursor;

    fn context() -> AnalyzerContext {
        let (tables, _) = phase_mgr::load_all_tables(None);
        AnalyzerContext::new(phase_mgr::select_table(tables, "rpcs3-settings").unwrap())
    }

    fn run_bytes(ctx: &AnalyzerContext, bytes: &[u8]) -> AnalysisRun {
        analyze_reader(ctx, Box::new(Cursor::new(bytes.to_vec())), LogEncoding::Plain, "RPCS3.log").unwrap()
    }

    #[test]
    fn test_invalid_encoding_maps_to_fail() {
        let run = run_bytes(&context(), b"RPCS3 v0.0.5\n\xFF\xFE broken\n");
        match run.status {
            FeedStatus::Fail(failure) => {
                assert_eq!(failure.reason, FailureReason::InvalidEncoding);
                assert_eq!(failure.phase_index, 0);
            }
            other => panic!("Expected Fail, got: {other:?}"),
        }
        assert_eq!(run.lines, 1);
        assert!(run.partial.is_some());
    }

    #[test]
    fn test_unterminated_line_maps_to_overflow() {
        let mut ctx = context();
        ctx.line_limits.max_line_bytes = 1_024;
        let run = run_bytes(&ctx, &[b'x'; 4_096]);
        assert!(matches!(
            run.status,
            FeedStatus::Overflow {
                source: OverflowSource::LineLength,
                limit: 1_024,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_log_is_truncated() {
        let run = run_bytes(&context(), b"");
        assert_eq!(run.status.code(), StatusCode::Fail);
        assert!(run.sections.is_empty());
    }

    #[test]
    fn test_unrecognized_attachment_is_rejected_before_opening() {
        let err = analyze_attachment(
            &context(),
            &FileSource::new(),
            &Attachment::new("/nonexistent/notes.txt", "notes.txt"),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LogWardenError::Stream(StreamError::UnrecognizedAttachment { .. })
        ));
    }

    #[test]
    fn test_missing_source_is_an_error_not_a_status() {
        let err = analyze_attachment(
            &context(),
            &FileSource::new(),
            &Attachment::new("/nonexistent/RPCS3.log", "RPCS3.log"),
        )
        .unwrap_err();
        assert!(matches!(err, LogWardenError::Io { .. }));
    }

    fn crlf_filler(lines: usize) -> Vec<u8> {
        b"filler line\r\n".repeat(lines)
    }

    fn overflow_of(run: &AnalysisRun) -> (u64, u64) {
        match run.status {
            FeedStatus::Overflow {
                consumed,
                limit,
                source: OverflowSource::LogBytes,
            } => (consumed, limit),
            ref other => panic!("Expected log-size Overflow, got: {other:?}"),
        }
    }

    #[test]
    fn test_crlf_lines_are_charged_with_their_terminators() {
        let mut ctx = context();
        ctx.engine_limits.max_log_bytes = 4_096;
        // 330 lines: 3960 bytes once stripped, 4290 on disk.
        let run = run_bytes(&ctx, &crlf_filler(330));
        assert_eq!(overflow_of(&run), (316 * 13, 4_096));
        assert_eq!(run.lines, 316);
    }

    #[test]
    fn test_stream_cap_reports_overflow() {
        let mut ctx = context();
        ctx.engine_limits.max_log_bytes = 4_096;
        ctx.stream.max_log_bytes = 4_096;
        let run = run_bytes(&ctx, &crlf_filler(330));
        assert_eq!(overflow_of(&run), (4_097, 4_096));
        assert!(run.partial.is_some());
    }

    #[test]
    fn test_zip_entry_over_cap_reports_overflow() {
        use std::io::Write;

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        writer.start_file("RPCS3.log", options).unwrap();
        writer.write_all(&crlf_filler(330)).unwrap();
        let archive = writer.finish().unwrap().into_inner();

        let mut ctx = context();
        ctx.engine_limits.max_log_bytes = 4_096;
        ctx.stream.max_log_bytes = 4_096;
        let run = analyze_reader(&ctx, Box::new(Cursor::new(archive)), LogEncoding::Zip, "logs.zip").unwrap();
        assert_eq!(overflow_of(&run).1, 4_096);
    }
}

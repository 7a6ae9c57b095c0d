//! Built-in chunked CSV processor.

use std::fs;
use std::sync::Arc;

use async_trait::async_trait;

use super::clean::{clean_noise, normalize_text, scrub_cell};
use super::csv::{decode, parse_rows, sniff_separator, Table};
use super::export::export_table;
use super::{ProcessingError, ProcessingJob, Processor, ProgressSink};
use crate::models::{ProcessingStats, SessionResult};

/// Reads a CSV, normalises the text column chunk by chunk, optionally
/// cleans it and exports the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkedCsvProcessor;

impl ChunkedCsvProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Blocking body of a run.
    pub fn run(
        job: &ProcessingJob,
        progress: &dyn ProgressSink,
    ) -> Result<SessionResult, ProcessingError> {
        progress.report("Starting CSV processing...", Some(10));

        progress.report("Reading CSV file...", Some(20));
        let bytes = fs::read(&job.input_path).map_err(|source| ProcessingError::Io {
            path: job.input_path.clone(),
            source,
        })?;

        let mut warnings = Vec::new();
        let (text, latin1) = decode(&bytes);
        if latin1 {
            warnings.push("File is not valid UTF-8 and was read as Latin-1".to_string());
        }

        let mut table = Table::from_rows(parse_rows(&text, sniff_separator(&text)))
            .ok_or(ProcessingError::EmptyFile)?;
        if table.is_empty() {
            return Err(ProcessingError::NoRows);
        }

        let column = job.options.text_column.as_str();
        let col = table
            .column_index(column)
            .ok_or_else(|| ProcessingError::MissingColumn(column.to_string()))?;

        let mut stats = ProcessingStats {
            total_rows: table.len(),
            ..Default::default()
        };

        let chunk_size = job.options.chunk_size.max(1);
        let total_chunks = table.len().div_ceil(chunk_size);
        let mut cleaned = Vec::new();

        if table.len() > chunk_size {
            for (i, chunk) in table.rows.chunks_mut(chunk_size).enumerate() {
                let n = i + 1;
                let pct = 40 + n * 30 / total_chunks;
                progress.report(
                    &format!("Processing chunk {}/{}...", n, total_chunks),
                    Some(pct as u8),
                );
                process_chunk(chunk, col, job.options.enable_cleaning, &mut stats, &mut cleaned);
            }
            progress.report("Combining processed chunks...", Some(75));
        } else {
            progress.report("Processing data...", Some(50));
            process_chunk(
                &mut table.rows,
                col,
                job.options.enable_cleaning,
                &mut stats,
                &mut cleaned,
            );
        }
        stats.chunks = total_chunks;

        if job.options.enable_cleaning {
            table.push_column(format!("{}_cleaned", column), cleaned);
        }

        progress.report("Finalizing processing...", Some(80));
        finalize(&mut table, col);

        stats.processed_rows = table.len();
        stats.empty_text_rows = table.rows.iter().filter(|r| r[col].is_empty()).count();
        stats.columns = table.headers.clone();

        progress.report("Exporting files...", Some(90));
        let download_info =
            export_table(&table, job.options.export, &job.output_dir, &mut warnings)?;
        stats.warnings = warnings;

        tracing::info!(
            session_id = %job.session_id,
            rows = stats.processed_rows,
            chunks = stats.chunks,
            "Processing finished"
        );

        Ok(SessionResult {
            stats,
            download_info,
        })
    }
}

fn process_chunk(
    rows: &mut [Vec<String>],
    col: usize,
    enable_cleaning: bool,
    stats: &mut ProcessingStats,
    cleaned: &mut Vec<String>,
) {
    for row in rows.iter_mut() {
        let normalized = normalize_text(&row[col]);
        if normalized.truncated {
            stats.truncated_rows += 1;
        }
        row[col] = normalized.text;

        if enable_cleaning {
            let clean = clean_noise(&row[col]);
            if clean != row[col] {
                stats.cleaned_rows += 1;
            }
            cleaned.push(clean);
        }
    }
}

/// Drop rows with no content and scrub every other column.
fn finalize(table: &mut Table, text_col: usize) {
    for row in table.rows.iter_mut() {
        for (i, cell) in row.iter_mut().enumerate() {
            if i != text_col {
                scrub_cell(cell);
            }
        }
    }
    table
        .rows
        .retain(|row| row.iter().any(|cell| !cell.trim().is_empty()));
}

#[async_trait]
impl Processor for ChunkedCsvProcessor {
    async fn process(
        &self,
        job: ProcessingJob,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<SessionResult, ProcessingError> {
        tokio::task::spawn_blocking(move || Self::run(&job, progress.as_ref()))
            .await
            .map_err(|e| ProcessingError::Task(e.to_string()))?
    }
}

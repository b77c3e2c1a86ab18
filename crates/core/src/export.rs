//! Result export
//!
//! Writes what a run produced to an output directory:
//!
//! - `page_{index}.png`: annotated raster per page (zero-based index)
//! - `tendons.csv`: one row per tendon record, pages numbered from 1
//! - `results.json`: totals, the per-page record lists and any failed pages
//!
//! Unresolved measurements are written as the literal `unresolved`, never
//! as an empty cell or a zero.

use crate::measurement::MeasurementStatus;
use crate::pipeline::DocumentResult;
use crate::record::TendonMatch;
use crate::scale::ScaleReference;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tendon_scheduler::{ProgressSink, ProgressUpdate, Stage};

pub const CSV_FILE: &str = "tendons.csv";
pub const SUMMARY_FILE: &str = "results.json";

/// Error types for export
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

pub type ExportResult<T> = Result<T, ExportError>;

/// Configuration for CSV export
#[derive(Debug, Clone)]
pub struct CsvExportConfig {
    /// Include column headers in the output
    pub include_headers: bool,

    /// CSV delimiter character
    pub delimiter: u8,
}

impl Default for CsvExportConfig {
    fn default() -> Self {
        Self {
            include_headers: true,
            delimiter: b',',
        }
    }
}

/// Name of the annotated raster for a zero-based page index
pub fn annotated_filename(page_index: u32) -> String {
    format!("page_{page_index}.png")
}

fn optional(value: Option<f32>) -> String {
    value.map(|v| format!("{v:.1}")).unwrap_or_default()
}

/// Export tendon records to CSV
///
/// CSV columns:
/// - Page: Page number (1-based)
/// - Callout: Canonical callout label
/// - Measurement: Display string, or `unresolved`
/// - Status: `resolved`, `fallback_scale`, `no_scale` or `no_line`
/// - Raw Text: Callout text as recognized
/// - Confidence: Match confidence (0-1)
/// - Distance (px): Callout-to-line distance, empty when unmatched
/// - Line Length (px): Bound segment length, empty when unmatched
pub fn export_records_csv<'a, W, I>(writer: W, records: I, config: &CsvExportConfig) -> ExportResult<()>
where
    W: Write,
    I: IntoIterator<Item = &'a TendonMatch>,
{
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(config.include_headers)
        .from_writer(writer);

    if config.include_headers {
        csv_writer.write_record([
            "Page",
            "Callout",
            "Measurement",
            "Status",
            "Raw Text",
            "Confidence",
            "Distance (px)",
            "Line Length (px)",
        ])?;
    }

    for record in records {
        csv_writer.write_record(&[
            (record.page_index + 1).to_string(),
            record.label.clone(),
            record.measurement.text.clone(),
            record.measurement.status.as_str().to_string(),
            record.raw_text.clone(),
            format!("{:.2}", record.confidence),
            optional(record.distance),
            optional(record.line_length()),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// One record in the JSON summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementEntry {
    pub callout: String,
    pub measurement: String,
    pub value: Option<f64>,
    pub unit: String,
    pub status: MeasurementStatus,
    pub confidence: f32,
}

impl From<&TendonMatch> for MeasurementEntry {
    fn from(record: &TendonMatch) -> Self {
        Self {
            callout: record.label.clone(),
            measurement: record.measurement.text.clone(),
            value: record.measurement.value,
            unit: record.measurement.unit.suffix().to_string(),
            status: record.measurement.status,
            confidence: record.confidence,
        }
    }
}

/// Scale that governed a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleEntry {
    pub text: String,
    pub pixels_per_unit: f32,
    pub unit: String,
}

impl From<&ScaleReference> for ScaleEntry {
    fn from(scale: &ScaleReference) -> Self {
        Self {
            text: scale.source_text.clone(),
            pixels_per_unit: scale.pixels_per_unit,
            unit: scale.unit.suffix().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    /// 1-based page number
    pub page: u32,
    pub filename: String,
    pub scale: Option<ScaleEntry>,
    pub measurements: Vec<MeasurementEntry>,
}

/// A page that produced no result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedPage {
    /// 1-based page number
    pub page: u32,
    pub error: String,
}

/// Run summary as written to `results.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub total_pages: usize,
    pub total_tendons: usize,
    pub pages: Vec<PageSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_pages: Vec<FailedPage>,
}

impl ExportSummary {
    pub fn from_result(result: &DocumentResult) -> Self {
        Self {
            total_pages: result.total_pages(),
            total_tendons: result.total_tendons(),
            pages: result
                .pages
                .iter()
                .map(|page| PageSummary {
                    page: page.page_index + 1,
                    filename: annotated_filename(page.page_index),
                    scale: page.scale.as_ref().map(ScaleEntry::from),
                    measurements: page.matches.iter().map(MeasurementEntry::from).collect(),
                })
                .collect(),
            failed_pages: result
                .failures
                .iter()
                .map(|failure| FailedPage {
                    page: failure.page_index + 1,
                    error: failure.error.to_string(),
                })
                .collect(),
        }
    }
}

/// Paths written by [`write_outputs`]
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFiles {
    pub images: Vec<PathBuf>,
    pub csv: PathBuf,
    pub summary: PathBuf,
}

/// Write images, CSV and summary into `dir`, creating it if needed
///
/// Reports into the 90-100 % band of `progress`.
pub fn write_outputs(
    dir: &Path,
    result: &DocumentResult,
    config: &CsvExportConfig,
    progress: &dyn ProgressSink,
) -> ExportResult<OutputFiles> {
    std::fs::create_dir_all(dir)?;

    let mut images = Vec::with_capacity(result.pages.len());
    for page in &result.pages {
        let path = dir.join(annotated_filename(page.page_index));
        page.annotated.save(&path).map_err(|source| ExportError::Image {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "wrote annotated page");
        images.push(path);
    }

    progress.report(ProgressUpdate::new(Stage::Export, 0.92, "Generating CSV file..."));
    let csv = dir.join(CSV_FILE);
    let file = std::fs::File::create(&csv)?;
    export_records_csv(std::io::BufWriter::new(file), result.records(), config)?;

    progress.report(ProgressUpdate::new(Stage::Export, 0.95, "Saving summary..."));
    let summary = dir.join(SUMMARY_FILE);
    let json = serde_json::to_string_pretty(&ExportSummary::from_result(result))?;
    std::fs::write(&summary, json)?;

    tracing::info!(
        dir = %dir.display(),
        images = images.len(),
        tendons = result.total_tendons(),
        "results written"
    );
    progress.report(ProgressUpdate::new(
        Stage::Complete,
        1.0,
        format!("Complete! Detected {} tendons", result.total_tendons()),
    ));

    Ok(OutputFiles { images, csv, summary })
}

//! Page and document orchestration
//!
//! [`PagePipeline`] carries one page through tiling, text detection,
//! merging, line detection, matching, scale resolution, measurement and
//! annotation. Line detection only needs the raster, so it runs on a scoped
//! thread while text detection proceeds. All intermediate state is owned by
//! the call, which is what allows [`DocumentProcessor`] to run pages
//! concurrently without locks.

use crate::annotate::Annotator;
use crate::config::PipelineConfig;
use crate::geometry::LineSegment;
use crate::lines::detect_segments;
use crate::matcher::match_callouts;
use crate::merge::merge_tiles;
use crate::ocr::{detect_tiles, DetectionRunError, TextDetector};
use crate::page::{DocumentId, Page, PageError};
use crate::record::TendonMatch;
use crate::scale::{resolve_scale, ScaleReference};
use crate::tile::{tile_page, TileError};
use image::RgbaImage;
use tendon_scheduler::{
    dispatch, CancellationToken, Cancelled, DispatchMode, ProgressRange, ProgressSink, ProgressUpdate, Stage,
};

/// Page-local progress checkpoints, as fractions of the page's share
mod checkpoints {
    pub const OCR_END: f32 = 0.70;
    pub const MERGE: f32 = 0.72;
    pub const LINES: f32 = 0.75;
    pub const MATCHING: f32 = 0.80;
    pub const SCALE: f32 = 0.83;
    pub const MEASUREMENT: f32 = 0.85;
    pub const ANNOTATION: f32 = 0.95;
}

/// Document-wide progress bands
const PAGES_START: f32 = 0.05;
const PAGES_END: f32 = 0.90;

/// Errors that stop a page
///
/// Input errors and cancellation stop the whole document; see
/// [`PipelineError::is_page_local`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid page: {0}")]
    InvalidPage(#[from] PageError),

    #[error("cannot load page {page}: {reason}")]
    Load { page: u32, reason: String },

    #[error("cannot tile page {page}: {source}")]
    Tiling {
        page: u32,
        #[source]
        source: TileError,
    },

    #[error("page {page}: detector resources exhausted ({reason}); retry with a smaller batch size")]
    ResourceExhausted { page: u32, reason: String },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl PipelineError {
    /// Whether the failure is confined to its page, leaving the rest of the
    /// document to be processed
    pub fn is_page_local(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }
}

/// Everything produced for one page
#[derive(Debug, Clone)]
pub struct PageResult {
    pub document_id: DocumentId,
    pub page_index: u32,
    /// Scale read from this page, if any
    pub scale: Option<ScaleReference>,
    /// Tendon records in callout reading order
    pub matches: Vec<TendonMatch>,
    /// Deduplicated text spans found on the page
    pub text_count: usize,
    /// Candidate line segments found on the page
    pub line_count: usize,
    pub annotated: RgbaImage,
}

impl PageResult {
    /// File name of the annotated raster
    pub fn filename(&self) -> String {
        format!("page_{}.png", self.page_index)
    }
}

/// A page that produced no result
#[derive(Debug, Clone, PartialEq)]
pub struct PageFailure {
    pub page_index: u32,
    pub error: PipelineError,
}

/// Results for a whole drawing set, in page order
#[derive(Debug, Clone)]
pub struct DocumentResult {
    pub document_id: DocumentId,
    pub pages: Vec<PageResult>,
    /// Pages lost to page-local failures, in page order
    pub failures: Vec<PageFailure>,
}

impl DocumentResult {
    fn empty(document_id: DocumentId) -> Self {
        Self {
            document_id,
            pages: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Split page outcomes into results and page-local failures
    ///
    /// The first error (in page order) that is not page-local is returned
    /// instead.
    fn collect(
        document_id: DocumentId,
        outcomes: impl IntoIterator<Item = (u32, Result<PageResult, PipelineError>)>,
    ) -> Result<Self, PipelineError> {
        let mut result = Self::empty(document_id);
        for (page_index, outcome) in outcomes {
            result.push(page_index, outcome)?;
        }
        Ok(result)
    }

    fn push(&mut self, page_index: u32, outcome: Result<PageResult, PipelineError>) -> Result<(), PipelineError> {
        match outcome {
            Ok(page) => self.pages.push(page),
            Err(error) if error.is_page_local() => {
                tracing::error!(page_index, error = %error, "page failed, continuing with the rest of the document");
                self.failures.push(PageFailure { page_index, error });
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }

    /// Pages that produced a result
    pub fn total_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn total_tendons(&self) -> usize {
        self.pages.iter().map(|p| p.matches.len()).sum()
    }

    /// All records, grouped by page
    pub fn records(&self) -> impl Iterator<Item = &TendonMatch> {
        self.pages.iter().flat_map(|p| p.matches.iter())
    }
}

fn report(progress: &dyn ProgressSink, stage: Stage, fraction: f32, message: impl Into<String>) {
    progress.report(ProgressUpdate::new(stage, fraction, message));
}

/// Segments from the line-detection thread, or none if it panicked
fn segments_or_empty(joined: std::thread::Result<Vec<LineSegment>>) -> Vec<LineSegment> {
    joined.unwrap_or_else(|_| {
        tracing::warn!("line detection failed, continuing without lines");
        Vec::new()
    })
}

/// Single-page pipeline
///
/// The detector and annotator are borrowed, never reloaded or mutated.
pub struct PagePipeline<'a> {
    config: &'a PipelineConfig,
    detector: &'a dyn TextDetector,
    annotator: &'a Annotator,
}

impl<'a> PagePipeline<'a> {
    pub fn new(config: &'a PipelineConfig, detector: &'a dyn TextDetector, annotator: &'a Annotator) -> Self {
        Self {
            config,
            detector,
            annotator,
        }
    }

    /// Run every stage on `page`
    ///
    /// Progress fractions are page-local (`0.0..=1.0`). Cancellation is
    /// honoured between OCR batches and at stage boundaries.
    pub fn process_page(
        &self,
        page: &Page,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PageResult, PipelineError> {
        let span = tracing::info_span!(
            "page",
            document_id = %page.document_id(),
            page_index = page.index()
        );
        let _entered = span.enter();
        let config = self.config;

        report(progress, Stage::Tiling, 0.0, "Preparing image...");
        cancel.checkpoint("tiling")?;
        let tiles = tile_page(page, config.tiling.tile_size, config.tiling.overlap).map_err(|source| {
            PipelineError::Tiling {
                page: page.index(),
                source,
            }
        })?;

        cancel.checkpoint("line_detection")?;
        let (ocr, segments) = std::thread::scope(|scope| {
            let line_span = span.clone();
            tracing::debug!("line detection started");
            let lines = scope.spawn(move || {
                line_span.in_scope(|| detect_segments(&page.to_luma(), &config.lines))
            });

            let ocr = detect_tiles(
                self.detector,
                page,
                &tiles,
                config.ocr.batch_size,
                cancel,
                &mut |done, total| {
                    let fraction = checkpoints::OCR_END * done as f32 / total.max(1) as f32;
                    report(progress, Stage::Ocr, fraction, format!("OCR processing: {done}/{total} tiles"));
                },
            );

            let segments = segments_or_empty(lines.join());
            (ocr, segments)
        });

        let tile_detections = ocr.map_err(|e| match e {
            DetectionRunError::ResourceExhausted(reason) => PipelineError::ResourceExhausted {
                page: page.index(),
                reason,
            },
            DetectionRunError::Cancelled(c) => PipelineError::Cancelled(c),
        })?;

        report(progress, Stage::Merge, checkpoints::MERGE, "OCR complete, assembling results...");
        let detections = merge_tiles(page.index(), tile_detections, &config.dedup);

        report(
            progress,
            Stage::LineDetection,
            checkpoints::LINES,
            format!("Line detection complete: {} segments", segments.len()),
        );
        cancel.checkpoint("matching")?;
        let callouts = match_callouts(&detections, &segments, &config.matching);
        report(progress, Stage::Matching, checkpoints::MATCHING, format!("Matched {} callouts", callouts.len()));

        let scale = resolve_scale(&detections, page.dpi());
        match &scale {
            Some(s) => tracing::info!(
                pixels_per_unit = s.pixels_per_unit,
                unit = %s.unit,
                source = %s.source_text,
                "scale resolved"
            ),
            None if config.measurement.fallback_pixels_per_unit.is_some() => {
                tracing::warn!("no scale indicator found, using configured default scale")
            }
            None => tracing::warn!("no scale indicator found, measurements unresolved"),
        }
        report(progress, Stage::ScaleResolution, checkpoints::SCALE, "Resolving scale...");

        report(progress, Stage::Measurement, checkpoints::MEASUREMENT, "Calculating measurements...");
        let matches: Vec<TendonMatch> = callouts
            .into_iter()
            .map(|m| TendonMatch::from_callout(m, scale.as_ref(), &config.measurement))
            .collect();

        cancel.checkpoint("annotation")?;
        let annotated = self.annotator.annotate(page.image(), &matches);
        report(progress, Stage::Annotation, checkpoints::ANNOTATION, "Saving results...");

        tracing::info!(
            texts = detections.len(),
            lines = segments.len(),
            callouts = matches.len(),
            matched = matches.iter().filter(|m| m.is_matched()).count(),
            "page processed"
        );
        report(progress, Stage::Complete, 1.0, "Page complete");

        Ok(PageResult {
            document_id: page.document_id(),
            page_index: page.index(),
            scale,
            matches,
            text_count: detections.len(),
            line_count: segments.len(),
            annotated,
        })
    }
}

/// Runs a drawing set through the page pipeline
pub struct DocumentProcessor<'a> {
    pipeline: PagePipeline<'a>,
    mode: DispatchMode,
}

impl<'a> DocumentProcessor<'a> {
    pub fn new(config: &'a PipelineConfig, detector: &'a dyn TextDetector, annotator: &'a Annotator) -> Self {
        Self {
            pipeline: PagePipeline::new(config, detector, annotator),
            mode: DispatchMode::from_parallel_flag(config.pipeline.parallel_pages),
        }
    }

    /// Override the page dispatch mode
    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    fn announce(&self, document_id: DocumentId, total: usize, progress: &dyn ProgressSink) {
        tracing::info!(%document_id, pages = total, mode = ?self.mode, "processing document");
        report(
            progress,
            Stage::Rasterize,
            PAGES_START,
            format!("Converted to {total} pages, starting OCR..."),
        );
    }

    fn finish(result: &DocumentResult) {
        tracing::info!(
            document_id = %result.document_id,
            pages = result.total_pages(),
            failed = result.failures.len(),
            tendons = result.total_tendons(),
            "document processed"
        );
    }

    fn run_page(
        &self,
        band: &ProgressRange<'_>,
        i: usize,
        total: usize,
        page: &Page,
        cancel: &CancellationToken,
    ) -> Result<PageResult, PipelineError> {
        let slice = band.slice(i, total).with_prefix(format!("Page {}/{}: ", i + 1, total));
        self.pipeline.process_page(page, &slice, cancel)
    }

    /// Process `pages`, reporting into the 5-90 % band of `progress`
    ///
    /// Results come back in page order whatever the dispatch mode. A
    /// page-local failure is recorded in [`DocumentResult::failures`] and the
    /// other pages are kept; any other error (in page order) fails the
    /// document.
    pub fn process_document(
        &self,
        document_id: DocumentId,
        pages: Vec<Page>,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<DocumentResult, PipelineError> {
        for page in &pages {
            page.ensure_document(document_id)?;
        }

        let total = pages.len();
        self.announce(document_id, total, progress);

        let band = ProgressRange::new(progress, PAGES_START, PAGES_END);
        let outcomes = dispatch(pages, self.mode, |i, page| {
            (page.index(), self.run_page(&band, i, total, &page, cancel))
        });

        let result = DocumentResult::collect(document_id, outcomes)?;
        Self::finish(&result);
        Ok(result)
    }

    /// Process `total` pages one at a time, loading each just before use
    ///
    /// Only one page raster is held at once. Pages are always processed in
    /// order regardless of the dispatch mode. Failure handling matches
    /// [`DocumentProcessor::process_document`]; a page that cannot be loaded
    /// fails the document.
    pub fn process_lazily<F>(
        &self,
        document_id: DocumentId,
        total: usize,
        mut load: F,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<DocumentResult, PipelineError>
    where
        F: FnMut(usize) -> Result<Page, PipelineError>,
    {
        self.announce(document_id, total, progress);

        let band = ProgressRange::new(progress, PAGES_START, PAGES_END);
        let mut result = DocumentResult::empty(document_id);
        for i in 0..total {
            cancel.checkpoint("rasterize")?;
            let page = load(i)?;
            page.ensure_document(document_id)?;
            let outcome = self.run_page(&band, i, total, &page, cancel);
            result.push(page.index(), outcome)?;
        }

        Self::finish(&result);
        Ok(result)
    }
}

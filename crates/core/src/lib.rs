//! Tendon Extract Core Library
//!
//! Detection and measurement core for tendon callouts on structural drawing
//! sheets. A rasterized page is split into overlapping tiles, text is
//! recognized per tile and merged back into page space, line segments are
//! extracted from the raster, tendon callouts are bound to their lines, and
//! each line is measured against the scale read from the same page.
//!
//! The text recognizer is pluggable through [`TextDetector`]; the pipeline
//! never loads or reloads a model itself.

pub mod annotate;
pub mod config;
pub mod export;
pub mod geometry;
pub mod lines;
pub mod matcher;
pub mod measurement;
pub mod merge;
pub mod ocr;
pub mod page;
pub mod pipeline;
pub mod record;
pub mod scale;
pub mod tile;

pub use annotate::{AnnotateConfig, AnnotateError, Annotator};
pub use config::{ConfigError, OcrConfig, PipelineConfig, RasterConfig, RunConfig, TilingConfig};
pub use export::{
    annotated_filename, export_records_csv, write_outputs, CsvExportConfig, ExportError, ExportSummary,
    FailedPage, OutputFiles,
};
pub use geometry::{angle_difference, BoundingBox, LineSegment, Point, Polygon};
pub use lines::{detect_segments, LineConfig, MergeTolerance};
pub use matcher::{is_callout, match_callouts, CalloutMatch, MatchConfig};
pub use measurement::{
    canonical_label, format_length, measure, LengthUnit, Measurement, MeasurementConfig, MeasurementStatus,
    UnknownUnit, UNRESOLVED,
};
pub use merge::{deduplicate, merge_tiles, texts_match, DedupConfig};
pub use ocr::{
    detect_tiles, DetectionRunError, DetectorError, RawDetection, ReplayDetector, ReplayEntry, ReplayError,
    TextDetection, TextDetector, TileDetections,
};
#[cfg(feature = "tesseract")]
pub use ocr::{TesseractConfig, TesseractDetector};
pub use page::{DocumentId, Page, PageError};
pub use pipeline::{DocumentProcessor, DocumentResult, PageFailure, PagePipeline, PageResult, PipelineError};
pub use record::TendonMatch;
pub use scale::{parse_notation, resolve_scale, scale_candidates, ScaleCandidate, ScaleReference, ScaleSource};
pub use tile::{tile_grid, tile_page, Tile, TileError, TileId, TileView};

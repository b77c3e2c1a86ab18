//! Tendon Extract Render Library
//!
//! Turns input drawings into page rasters for the extraction pipeline. PDF
//! drawing sets go through PDFium; single raster files (PNG, JPEG, TIFF) are
//! loaded as a one-page document.

pub mod pdf;

pub use pdf::{points_to_pixels, PdfRasterizer};

use image::RgbaImage;
use std::path::{Path, PathBuf};
use tendon_core::{DocumentId, Page, PageError};
use tendon_scheduler::{ProgressSink, ProgressUpdate, Stage};

/// Share of overall progress spent rasterizing
const RASTER_PROGRESS_END: f32 = 0.05;

/// Errors that can occur while rasterizing input
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("input file not found: {0}")]
    NotFound(PathBuf),

    #[error("unsupported input format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("PDFium initialization error: {0}")]
    Initialization(String),

    #[error("failed to load {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("failed to read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid page index: {0}")]
    InvalidPageIndex(usize),

    #[error("render error on page {page}: {reason}")]
    Render { page: usize, reason: String },

    #[error(transparent)]
    Page(#[from] PageError),
}

pub type RasterResult<T> = Result<T, RasterError>;

/// A source of page rasters for one document
pub trait Rasterizer {
    /// Identifier stamped on every page produced
    fn document_id(&self) -> DocumentId;

    fn page_count(&self) -> usize;

    /// Pixel density pages are rendered at
    fn dpi(&self) -> u32;

    /// Render the zero-based page `index`
    fn render_page(&self, index: usize) -> RasterResult<Page>;

    /// Render every page, reporting into the 0-5 % band of `progress`
    fn render_all(&self, progress: &dyn ProgressSink) -> RasterResult<Vec<Page>> {
        let total = self.page_count();
        progress.report(ProgressUpdate::new(Stage::Rasterize, 0.0, "Converting PDF to images..."));

        let mut pages = Vec::with_capacity(total);
        for index in 0..total {
            pages.push(self.render_page(index)?);
            progress.report(ProgressUpdate::new(
                Stage::Rasterize,
                RASTER_PROGRESS_END * (index + 1) as f32 / total as f32,
                format!("Rendered page {}/{}", index + 1, total),
            ));
        }
        Ok(pages)
    }
}

/// Single raster file treated as a one-page document
pub struct ImageRasterizer {
    image: RgbaImage,
    dpi: u32,
    document_id: DocumentId,
}

impl ImageRasterizer {
    /// Load `path`; `dpi` is the density the raster was scanned or exported at
    pub fn open(path: &Path, dpi: u32) -> RasterResult<Self> {
        let image = image::open(path)
            .map_err(|source| RasterError::Image {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();
        tracing::info!(path = %path.display(), width = image.width(), height = image.height(), dpi, "opened raster");
        Ok(Self::from_image(image, dpi))
    }

    pub fn from_image(image: RgbaImage, dpi: u32) -> Self {
        Self {
            image,
            dpi,
            document_id: DocumentId::new(),
        }
    }
}

impl Rasterizer for ImageRasterizer {
    fn document_id(&self) -> DocumentId {
        self.document_id
    }

    fn page_count(&self) -> usize {
        1
    }

    fn dpi(&self) -> u32 {
        self.dpi
    }

    fn render_page(&self, index: usize) -> RasterResult<Page> {
        if index != 0 {
            return Err(RasterError::InvalidPageIndex(index));
        }
        Ok(Page::new(self.document_id, 0, self.dpi, self.image.clone())?)
    }
}

/// Input kinds recognised by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Raster,
}

impl InputKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(InputKind::Pdf),
            "png" | "jpg" | "jpeg" | "tif" | "tiff" => Some(InputKind::Raster),
            _ => None,
        }
    }
}

/// Open the right rasterizer for `path`
pub fn open_rasterizer(path: &Path, dpi: u32) -> RasterResult<Box<dyn Rasterizer>> {
    let kind = InputKind::from_path(path).ok_or_else(|| RasterError::UnsupportedFormat(path.to_path_buf()))?;
    if !path.is_file() {
        return Err(RasterError::NotFound(path.to_path_buf()));
    }

    Ok(match kind {
        InputKind::Pdf => Box::new(PdfRasterizer::open(path, dpi)?),
        InputKind::Raster => Box::new(ImageRasterizer::open(path, dpi)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::Mutex;

    #[test]
    fn test_input_kind_from_extension() {
        assert_eq!(InputKind::from_path(Path::new("set.PDF")), Some(InputKind::Pdf));
        assert_eq!(InputKind::from_path(Path::new("s1.tiff")), Some(InputKind::Raster));
        assert_eq!(InputKind::from_path(Path::new("s1.jpeg")), Some(InputKind::Raster));
        assert_eq!(InputKind::from_path(Path::new("notes.docx")), None);
        assert_eq!(InputKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_unsupported_format() {
        let result = open_rasterizer(Path::new("drawing.dwg"), 200);
        assert!(matches!(result, Err(RasterError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_rasterizer(&dir.path().join("missing.png"), 200);
        assert!(matches!(result, Err(RasterError::NotFound(_))));
    }

    #[test]
    fn test_corrupt_image_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();
        assert!(matches!(open_rasterizer(&path, 200), Err(RasterError::Image { .. })));
    }

    #[test]
    fn test_image_file_is_single_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.png");
        RgbaImage::from_pixel(30, 20, Rgba([255, 255, 255, 255])).save(&path).unwrap();

        let rasterizer = open_rasterizer(&path, 150).unwrap();
        assert_eq!(rasterizer.page_count(), 1);
        assert_eq!(rasterizer.dpi(), 150);

        let seen = Mutex::new(Vec::new());
        let sink = |u: ProgressUpdate| seen.lock().unwrap().push(u);
        let pages = rasterizer.render_all(&sink).unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].index(), 0);
        assert_eq!(pages[0].dpi(), 150);
        assert_eq!((pages[0].width(), pages[0].height()), (30, 20));
        assert_eq!(pages[0].document_id(), rasterizer.document_id());
        assert_eq!(seen.into_inner().unwrap().last().map(|u| u.percent()), Some(5));
        assert!(matches!(rasterizer.render_page(1), Err(RasterError::InvalidPageIndex(1))));
    }

    #[test]
    fn test_zero_dpi_is_page_error() {
        let rasterizer = ImageRasterizer::from_image(RgbaImage::new(4, 4), 0);
        assert!(matches!(rasterizer.render_page(0), Err(RasterError::Page(_))));
    }
}

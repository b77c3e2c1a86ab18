//! PDF rasterization through PDFium

use crate::{RasterError, RasterResult, Rasterizer};
use image::RgbaImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tendon_core::{DocumentId, Page};

/// PDF user-space units per inch
const POINTS_PER_INCH: f32 = 72.0;

/// Pixel size of a page `points` wide at `dpi`
pub fn points_to_pixels(points: f32, dpi: u32) -> u32 {
    (points / POINTS_PER_INCH * dpi as f32).round().max(1.0) as u32
}

/// Bind the PDFium library
///
/// Search order:
/// 1. Executable's directory
/// 2. Current working directory
/// 3. System library paths
fn init_pdfium() -> RasterResult<Pdfium> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()));

    if let Some(ref dir) = exe_dir {
        if let Ok(bindings) = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)) {
            tracing::debug!(dir = %dir.display(), "bound PDFium next to executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    Ok(Pdfium::new(
        Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| RasterError::Initialization(e.to_string()))?,
    ))
}

/// Renders every page of a PDF drawing set
pub struct PdfRasterizer {
    /// The loaded document (owns the Pdfium instance internally)
    document: pdfium_render::prelude::PdfDocument<'static>,
    path: PathBuf,
    dpi: u32,
    document_id: DocumentId,
}

impl PdfRasterizer {
    /// Open `path` for rendering at `dpi`
    pub fn open(path: &Path, dpi: u32) -> RasterResult<Self> {
        let pdfium = Box::leak(Box::new(init_pdfium()?));
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| RasterError::Load {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let rasterizer = Self {
            document,
            path: path.to_path_buf(),
            dpi,
            document_id: DocumentId::new(),
        };
        tracing::info!(
            path = %path.display(),
            pages = rasterizer.page_count(),
            dpi,
            "opened PDF"
        );
        Ok(rasterizer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Rasterizer for PdfRasterizer {
    fn document_id(&self) -> DocumentId {
        self.document_id
    }

    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn dpi(&self) -> u32 {
        self.dpi
    }

    fn render_page(&self, index: usize) -> RasterResult<Page> {
        let page_index = u16::try_from(index).map_err(|_| RasterError::InvalidPageIndex(index))?;
        let page = self
            .document
            .pages()
            .get(page_index)
            .map_err(|_| RasterError::InvalidPageIndex(index))?;

        let width = points_to_pixels(page.width().value, self.dpi);
        let height = points_to_pixels(page.height().value, self.dpi);
        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32);

        let bitmap = page.render_with_config(&config).map_err(|e| RasterError::Render {
            page: index,
            reason: e.to_string(),
        })?;
        let image = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes().to_vec()).ok_or_else(|| {
            RasterError::Render {
                page: index,
                reason: format!("bitmap does not match {width}x{height}"),
            }
        })?;

        tracing::debug!(page = index, width, height, "rendered PDF page");
        Ok(Page::new(self.document_id, index as u32, self.dpi, image)?)
    }
}

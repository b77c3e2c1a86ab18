//! Rasterized drawing pages
//!
//! A [`Page`] is produced once by the rasterizer and never modified afterward.
//! Every later stage borrows it.

use image::RgbaImage;
use uuid::Uuid;

/// Identifier of the drawing set a page was rasterized from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rejected page input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    #[error("page {index} has empty raster ({width}x{height})")]
    EmptyRaster { index: u32, width: u32, height: u32 },

    #[error("page {index} has invalid DPI {dpi}")]
    InvalidDpi { index: u32, dpi: u32 },

    #[error("page {index} belongs to document {found}, expected {expected}")]
    ForeignDocument {
        index: u32,
        expected: DocumentId,
        found: DocumentId,
    },
}

/// One rasterized drawing page
#[derive(Debug, Clone)]
pub struct Page {
    document_id: DocumentId,
    index: u32,
    dpi: u32,
    image: RgbaImage,
}

impl Page {
    /// Wrap a raster, rejecting zero-sized images and a zero DPI
    pub fn new(
        document_id: DocumentId,
        index: u32,
        dpi: u32,
        image: RgbaImage,
    ) -> Result<Self, PageError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(PageError::EmptyRaster {
                index,
                width,
                height,
            });
        }
        if dpi == 0 {
            return Err(PageError::InvalidDpi { index, dpi });
        }

        Ok(Self {
            document_id,
            index,
            dpi,
            image,
        })
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    /// Reject a page rasterized from another drawing set
    pub fn ensure_document(&self, expected: DocumentId) -> Result<(), PageError> {
        if self.document_id == expected {
            Ok(())
        } else {
            Err(PageError::ForeignDocument {
                index: self.index,
                expected,
                found: self.document_id,
            })
        }
    }

    /// Zero-based page index within the document
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Grayscale copy of the raster, used by line detection
    pub fn to_luma(&self) -> image::GrayImage {
        image::DynamicImage::ImageRgba8(self.image.clone()).into_luma8()
    }
}

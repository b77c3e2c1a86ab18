//! Overlapping tile grid over a page raster
//!
//! Drawing pages rasterized at 200 DPI are far larger than what a text
//! detector accepts, so the page is cut into fixed-size tiles with stride
//! `tile_size - overlap` on both axes. The last row and column are shifted
//! only as far as the page allows, so edge tiles may be narrower than the
//! nominal size. Tiles are never padded.

use crate::page::Page;
use image::RgbaImage;

/// Errors produced when laying out a tile grid
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileError {
    #[error("tile size {tile_size} must exceed overlap {overlap}")]
    NonAdvancingGrid { tile_size: u32, overlap: u32 },

    #[error("cannot tile an empty page ({width}x{height})")]
    EmptyPage { width: u32, height: u32 },
}

/// Position of a tile in the grid; (0, 0) is the top-left tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub row: u32,
    pub col: u32,
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}c{}", self.row, self.col)
    }
}

/// A rectangular region of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub id: TileId,
    /// Page-space origin of the tile's top-left pixel
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Overlap margin shared with neighbouring tiles
    pub overlap: u32,
}

impl Tile {
    /// Whether the page pixel `(px, py)` lies inside this tile
    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.x + self.width && py >= self.y && py < self.y + self.height
    }

    /// Copy this tile's pixels out of the page raster
    pub fn crop(&self, page: &Page) -> RgbaImage {
        image::imageops::crop_imm(page.image(), self.x, self.y, self.width, self.height).to_image()
    }
}

/// A tile together with its cropped pixels, as handed to a text detector
#[derive(Debug, Clone)]
pub struct TileView {
    pub page_index: u32,
    pub tile: Tile,
    pub image: RgbaImage,
}

impl TileView {
    pub fn from_page(tile: Tile, page: &Page) -> Self {
        Self {
            page_index: page.index(),
            image: tile.crop(page),
            tile,
        }
    }
}

/// Tile origins along one axis
///
/// Starts at 0 and advances by `stride` while the current tile still ends
/// before the page edge.
fn axis_origins(extent: u32, tile_size: u32, stride: u32) -> Vec<u32> {
    let mut origins = vec![0];
    let mut pos = 0u32;
    while pos.saturating_add(tile_size) < extent {
        pos += stride;
        origins.push(pos);
    }
    origins
}

/// Lay out the tile grid for a `width` x `height` page
///
/// Tiles are returned in row-major order. The layout depends only on the four
/// arguments.
pub fn tile_grid(width: u32, height: u32, tile_size: u32, overlap: u32) -> Result<Vec<Tile>, TileError> {
    if tile_size <= overlap {
        return Err(TileError::NonAdvancingGrid { tile_size, overlap });
    }
    if width == 0 || height == 0 {
        return Err(TileError::EmptyPage { width, height });
    }

    let stride = tile_size - overlap;
    let xs = axis_origins(width, tile_size, stride);
    let ys = axis_origins(height, tile_size, stride);

    let mut tiles = Vec::with_capacity(xs.len() * ys.len());
    for (row, &y) in ys.iter().enumerate() {
        for (col, &x) in xs.iter().enumerate() {
            tiles.push(Tile {
                id: TileId {
                    row: row as u32,
                    col: col as u32,
                },
                x,
                y,
                width: tile_size.min(width - x),
                height: tile_size.min(height - y),
                overlap,
            });
        }
    }

    tracing::debug!(
        width,
        height,
        tile_size,
        overlap,
        tiles = tiles.len(),
        "laid out tile grid"
    );
    Ok(tiles)
}

/// Convenience wrapper laying out the grid for a page
pub fn tile_page(page: &Page, tile_size: u32, overlap: u32) -> Result<Vec<Tile>, TileError> {
    tile_grid(page.width(), page.height(), tile_size, overlap)
}

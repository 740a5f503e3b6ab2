//! Partition of a mosaic into non-overlapping tiles for bounded-memory inference.

use std::ops::Range;

/// Tile stride used when a caller asks for tiling without naming a size.
pub const DEFAULT_TILE_SIZE: usize = 256;

/// Tile boundaries along one axis.
///
/// Starts are `0, stride, 2*stride, ...` below `extent`; the last start is
/// dropped and `extent` appended, so the final tile absorbs the remainder and
/// spans more than `stride` but at most `2*stride` pixels (or the whole axis
/// when `extent <= stride`). Consecutive boundaries never coincide.
pub fn tile_boundaries(extent: usize, stride: usize) -> Vec<usize> {
    if extent == 0 {
        return vec![0];
    }
    if stride == 0 || stride >= extent {
        return vec![0, extent];
    }
    let mut bounds: Vec<usize> = (0..extent).step_by(stride).collect();
    bounds.pop();
    bounds.push(extent);
    bounds
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub row_index: usize,
    pub col_index: usize,
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePlan {
    row_bounds: Vec<usize>,
    col_bounds: Vec<usize>,
}

impl TilePlan {
    /// `None` keeps the whole mosaic as a single tile.
    pub fn new(height: usize, width: usize, tile_size: Option<usize>) -> Self {
        match tile_size {
            Some(stride) => Self {
                row_bounds: tile_boundaries(height, stride),
                col_bounds: tile_boundaries(width, stride),
            },
            None => Self::whole(height, width),
        }
    }

    pub fn whole(height: usize, width: usize) -> Self {
        Self {
            row_bounds: vec![0, height],
            col_bounds: vec![0, width],
        }
    }

    pub fn row_bounds(&self) -> &[usize] {
        &self.row_bounds
    }

    pub fn col_bounds(&self) -> &[usize] {
        &self.col_bounds
    }

    pub fn len(&self) -> usize {
        self.row_bounds.len().saturating_sub(1) * self.col_bounds.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tiles in row-major order of the (row, col) cartesian product.
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        self.row_bounds.windows(2).enumerate().flat_map(move |(ri, r)| {
            self.col_bounds.windows(2).enumerate().map(move |(ci, c)| Tile {
                row_index: ri,
                col_index: ci,
                rows: r[0]..r[1],
                cols: c[0]..c[1],
            })
        })
    }
}

//! Occupancy grid: exclusive cell bookkeeping for widget footprints
//!
//! The grid is a fixed `rows x columns` boolean matrix. It answers "is this
//! region free" and marks or unmarks footprints. It knows nothing about
//! widgets themselves; the [`crate::Board`] replays widget footprints into
//! it and guards every `occupy` with an `is_area_free` check.

use crate::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};

/// Upper bound on `columns * rows`; the matrix holds one flag per cell
pub const MAX_GRID_CELLS: u32 = 65_536;

/// Grid geometry as persisted under the `gridConfig` key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridConfig {
    /// Width and height of a single cell in pixels
    pub cell_size: u32,
    /// Gap between cells in pixels
    pub margin: u32,
    /// Number of columns
    pub columns: u32,
    /// Number of rows
    pub rows: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_size: 100,
            margin: 10,
            columns: 12,
            rows: 6,
        }
    }
}

impl GridConfig {
    /// Reject geometries that cannot hold a single cell
    pub fn validate(&self) -> Result<()> {
        if self.columns == 0 || self.rows == 0 {
            return Err(Error::ValidationError(format!(
                "grid must have at least one column and one row (got {}x{})",
                self.columns, self.rows
            )));
        }
        match self.columns.checked_mul(self.rows) {
            Some(cells) if cells <= MAX_GRID_CELLS => {}
            _ => {
                return Err(Error::ValidationError(format!(
                    "grid of {}x{} exceeds {} cells",
                    self.columns, self.rows, MAX_GRID_CELLS
                )))
            }
        }
        if self.cell_size == 0 {
            return Err(Error::ValidationError("cell size must be positive".to_string()));
        }
        if self.cell_size.checked_add(self.margin).is_none() {
            return Err(Error::ValidationError(format!(
                "cell size {} plus margin {} is too large",
                self.cell_size, self.margin
            )));
        }
        Ok(())
    }

    /// Distance in pixels from one cell origin to the next
    pub fn pitch(&self) -> u64 {
        u64::from(self.cell_size) + u64::from(self.margin)
    }
}

/// Zero-based column/row index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: u32,
    pub y: u32,
}

impl GridPosition {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Footprint extent in cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSize {
    pub width: u32,
    pub height: u32,
}

impl GridSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both dimensions are at least one cell
    pub fn is_positive(&self) -> bool {
        self.width >= 1 && self.height >= 1
    }
}

/// Half-open cell ranges covered by a footprint, in `u64` so that anchors
/// near `u32::MAX` cannot wrap.
fn span(pos: GridPosition, size: GridSize) -> ((u64, u64), (u64, u64)) {
    let x0 = u64::from(pos.x);
    let y0 = u64::from(pos.y);
    ((x0, x0 + u64::from(size.width)), (y0, y0 + u64::from(size.height)))
}

/// Fixed-size occupancy matrix
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    config: GridConfig,
    cells: Vec<bool>,
}

impl OccupancyGrid {
    /// Create an empty grid with the given geometry
    pub fn new(config: GridConfig) -> Self {
        let cells = vec![false; Self::cell_count(&config)];
        Self { config, cells }
    }

    fn cell_count(config: &GridConfig) -> usize {
        config.columns as usize * config.rows as usize
    }

    fn index(&self, pos: GridPosition) -> usize {
        self.index_u64(u64::from(pos.x), u64::from(pos.y))
    }

    fn index_u64(&self, x: u64, y: u64) -> usize {
        (y * u64::from(self.config.columns) + x) as usize
    }

    /// Current geometry
    pub fn config(&self) -> GridConfig {
        self.config
    }

    /// True iff `pos` lies within `[0, columns) x [0, rows)`
    pub fn is_position_valid(&self, pos: GridPosition) -> bool {
        pos.x < self.config.columns && pos.y < self.config.rows
    }

    /// Whether a single valid cell is marked occupied
    pub fn is_occupied(&self, pos: GridPosition) -> bool {
        self.is_position_valid(pos) && self.cells[self.index(pos)]
    }

    /// False if any cell of the rectangle is off-grid or already occupied
    pub fn is_area_free(&self, pos: GridPosition, size: GridSize) -> bool {
        let ((x0, x1), (y0, y1)) = span(pos, size);
        if x0 == x1 || y0 == y1 {
            return true;
        }
        if x1 > u64::from(self.config.columns) || y1 > u64::from(self.config.rows) {
            return false;
        }
        (y0..y1).all(|y| (x0..x1).all(|x| !self.cells[self.index_u64(x, y)]))
    }

    /// Mark every on-grid cell of the rectangle; off-grid cells are skipped
    pub fn occupy(&mut self, pos: GridPosition, size: GridSize) {
        self.mark(pos, size, true);
    }

    /// Unmark every on-grid cell of the rectangle; off-grid cells are skipped
    pub fn free(&mut self, pos: GridPosition, size: GridSize) {
        self.mark(pos, size, false);
    }

    fn mark(&mut self, pos: GridPosition, size: GridSize, occupied: bool) {
        let ((x0, x1), (y0, y1)) = span(pos, size);
        let x1 = x1.min(u64::from(self.config.columns));
        let y1 = y1.min(u64::from(self.config.rows));
        for y in y0..y1 {
            for x in x0..x1 {
                let idx = self.index_u64(x, y);
                self.cells[idx] = occupied;
            }
        }
    }

    /// Replace the geometry and start over with an empty matrix.
    ///
    /// Existing occupancy is dropped; the caller must replay footprints.
    pub fn reconfigure(&mut self, config: GridConfig) {
        debug!(
            "reconfiguring grid {}x{} -> {}x{}",
            self.config.columns, self.config.rows, config.columns, config.rows
        );
        self.config = config;
        self.cells = vec![false; Self::cell_count(&config)];
    }

    /// Number of occupied cells
    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }

    /// First anchor (row-major, top-left first) where `size` fits
    pub fn find_free_position(&self, size: GridSize) -> Option<GridPosition> {
        (0..self.config.rows)
            .flat_map(|y| (0..self.config.columns).map(move |x| GridPosition { x, y }))
            .find(|pos| self.is_area_free(*pos, size))
    }

    /// Cell under a pixel offset relative to the grid origin
    pub fn position_at_pixel(&self, x_px: f64, y_px: f64) -> Option<GridPosition> {
        let pitch = self.config.pitch() as f64;
        if !x_px.is_finite() || !y_px.is_finite() {
            return None;
        }
        let gx = (x_px / pitch).floor();
        let gy = (y_px / pitch).floor();
        if gx < 0.0 || gy < 0.0 {
            return None;
        }
        let pos = GridPosition::new(gx as u32, gy as u32);
        self.is_position_valid(pos).then_some(pos)
    }

    /// Footprint closest to a pixel extent, never smaller than one cell
    pub fn size_from_pixels(&self, width_px: f64, height_px: f64) -> GridSize {
        let pitch = self.config.pitch() as f64;
        let cells = |px: f64| (px / pitch).round().max(1.0) as u32;
        GridSize::new(cells(width_px), cells(height_px))
    }

    /// Render the matrix as rows of `#` (occupied) and `.` (free)
    pub fn render_ascii(&self) -> String {
        let mut out = String::with_capacity(self.cells.len() + self.config.rows as usize);
        for row in self.cells.chunks(self.config.columns.max(1) as usize) {
            out.extend(row.iter().map(|c| if *c { '#' } else { '.' }));
            out.push('\n');
        }
        out
    }
}

impl Default for OccupancyGrid {
    fn default() -> Self {
        Self::new(GridConfig::default())
    }
}

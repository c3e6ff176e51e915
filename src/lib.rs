//! tabgrid: the layout core of a customizable new-tab page
//!
//! A page is a fixed grid of square cells holding widgets (icons, notes,
//! task lists, bookmarks) plus a background. This crate provides:
//!
//! - **Occupancy grid**: which cells are taken, placement checks and
//!   pixel-to-cell conversion ([`grid`])
//! - **Chunked store**: persistence of large JSON values over a key-value
//!   backend with a per-item size quota ([`storage`])
//! - **Board**: a session that keeps the grid, the widget list and storage
//!   consistent ([`Board`])
//!
//! # Example
//!
//! ```no_run
//! use tabgrid::{Board, GridPosition, MemoryBackend, NewTabStore, WidgetType};
//!
//! # async fn run() -> tabgrid::Result<()> {
//! let mut board = Board::open(NewTabStore::new(MemoryBackend::new())).await?;
//! let note = board.add_widget(WidgetType::Note).await?;
//! board.move_widget(&note.id, GridPosition::new(4, 2)).await?;
//! println!("{}", board.grid().render_ascii());
//! # Ok(())
//! # }
//! ```

pub mod background;
pub mod board;
pub mod error;
pub mod grid;
pub mod storage;
pub mod validate;
pub mod widget;

pub use background::{BackgroundConfig, BackgroundKind, SlideshowConfig};
pub use board::{Board, BoardEvent};
pub use error::{Error, Result};
pub use grid::{GridConfig, GridPosition, GridSize, OccupancyGrid};
pub use storage::{ChunkedStore, FileBackend, MemoryBackend, NewTabStore, Quota, StorageBackend};
pub use widget::{Widget, WidgetKind, WidgetType};

/// Chunk length used when none is configured, in characters
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Configuration for a [`ChunkedStore`]
///
/// # Examples
///
/// ```
/// let cfg = tabgrid::StoreConfig::default();
/// assert_eq!(cfg.chunk_size, 8192);
/// assert!(cfg.prune_stale_chunks);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Maximum characters of serialized JSON per chunk; must be positive
    pub chunk_size: usize,
    /// Remove chunks left over from a longer previous value after each save
    pub prune_stale_chunks: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            prune_stale_chunks: true,
        }
    }
}

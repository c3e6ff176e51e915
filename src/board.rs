//! The board: one session's grid, widgets and background, kept in step with
//! storage.
//!
//! Every mutation follows the same order: validate against the grid, update
//! occupancy and the in-memory widget list, then persist. When persisting
//! fails the in-memory state is rolled back, so the grid never claims cells
//! for a layout that storage does not have.

use crate::background::BackgroundConfig;
use crate::grid::{GridConfig, GridPosition, GridSize, OccupancyGrid};
use crate::storage::{NewTabStore, StorageBackend};
use crate::validate::MAX_WIDGETS;
use crate::widget::{now_millis, Widget, WidgetKind, WidgetType};
use crate::{Error, Result};
use log::{debug, warn};
use std::sync::Arc;

/// Change notifications, fired after the change has been persisted
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    WidgetAdded { id: String },
    WidgetUpdated { id: String },
    WidgetRemoved { id: String },
    GridUpdated(GridConfig),
    BackgroundChanged,
}

type OnChangeHandler = Arc<dyn Fn(&BoardEvent) + Send + Sync>;

pub struct Board<B> {
    store: NewTabStore<B>,
    grid: OccupancyGrid,
    widgets: Vec<Widget>,
    background: BackgroundConfig,
    on_change: Option<OnChangeHandler>,
}

/// Build a grid and replay footprints into it. Footprints that overlap or
/// leave the grid are still applied, but reported.
fn replay(config: GridConfig, widgets: &[Widget]) -> (OccupancyGrid, Vec<String>) {
    let mut grid = OccupancyGrid::new(config);
    let mut conflicts = Vec::new();
    for w in widgets {
        if !grid.is_area_free(w.position, w.size) {
            conflicts.push(w.id.clone());
        }
        grid.occupy(w.position, w.size);
    }
    (grid, conflicts)
}

impl<B: StorageBackend> Board<B> {
    /// Initialize storage defaults, load the stored layout and rebuild
    /// occupancy from it.
    pub async fn open(store: NewTabStore<B>) -> Result<Self> {
        store.initialize().await?;
        let mut board = Self {
            store,
            grid: OccupancyGrid::default(),
            widgets: Vec::new(),
            background: BackgroundConfig::default(),
            on_change: None,
        };
        board.reload().await?;
        Ok(board)
    }

    /// Re-read everything from storage, discarding in-memory state
    pub async fn reload(&mut self) -> Result<()> {
        let mut config = self.store.grid_config().await?;
        if let Err(e) = config.validate() {
            warn!("stored grid config unusable ({}), using defaults", e);
            config = GridConfig::default();
        }
        let widgets = self.store.widgets().await?;
        let background = self.store.background().await?;

        let (grid, conflicts) = replay(config, &widgets);
        for id in &conflicts {
            warn!("stored widget {} overlaps another widget or leaves the grid", id);
        }
        debug!(
            "board loaded: {} widgets on a {}x{} grid",
            widgets.len(),
            config.columns,
            config.rows
        );

        self.grid = grid;
        self.widgets = widgets;
        self.background = background;
        Ok(())
    }

    /// Register a callback for persisted changes
    pub fn on_change<F>(&mut self, cb: F)
    where
        F: Fn(&BoardEvent) + Send + Sync + 'static,
    {
        self.on_change = Some(Arc::new(cb));
    }

    pub fn clear_on_change(&mut self) {
        self.on_change = None;
    }

    fn emit(&self, event: BoardEvent) {
        if let Some(cb) = &self.on_change {
            cb(&event);
        }
    }

    pub fn store(&self) -> &NewTabStore<B> {
        &self.store
    }

    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    pub fn widgets(&self) -> &[Widget] {
        &self.widgets
    }

    pub fn widget(&self, id: &str) -> Option<&Widget> {
        self.widgets.iter().find(|w| w.id == id)
    }

    pub fn background(&self) -> &BackgroundConfig {
        &self.background
    }

    fn index_of(&self, id: &str) -> Result<usize> {
        self.widgets
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| Error::NotFound(format!("widget {}", id)))
    }

    fn next_widget_id(&self, now_ms: u64) -> String {
        let mut stamp = now_ms;
        loop {
            let id = format!("widget-{}", stamp);
            if self.widget(&id).is_none() {
                return id;
            }
            stamp += 1;
        }
    }

    async fn persist_widgets(&mut self, grid: OccupancyGrid, widgets: Vec<Widget>) -> Result<()> {
        if let Err(e) = self.store.set_widgets(&self.widgets).await {
            warn!("persisting widgets failed, rolling back: {}", e);
            self.grid = grid;
            self.widgets = widgets;
            return Err(e);
        }
        Ok(())
    }

    /// Add a blank widget of `widget_type` at the first free slot
    pub async fn add_widget(&mut self, widget_type: WidgetType) -> Result<Widget> {
        let size = widget_type.default_size();
        let position = self
            .grid
            .find_free_position(size)
            .ok_or_else(|| Error::ValidationError("no free space on the grid".to_string()))?;
        let mut widget = Widget::new(self.next_widget_id(now_millis()), WidgetKind::empty(widget_type), position);
        // icons and notes need a URL or text before they are useful
        widget.is_editing = matches!(widget_type, WidgetType::Icon | WidgetType::Note);
        self.place_widget(widget.clone()).await?;
        Ok(widget)
    }

    /// Put a fully specified widget on the board
    pub async fn place_widget(&mut self, widget: Widget) -> Result<()> {
        if self.widgets.len() >= MAX_WIDGETS {
            return Err(Error::ValidationError(format!("at most {} widgets allowed", MAX_WIDGETS)));
        }
        if self.widget(&widget.id).is_some() {
            return Err(Error::ValidationError(format!("duplicate widget id {}", widget.id)));
        }
        widget.validate()?;
        if !self.grid.is_position_valid(widget.position) {
            return Err(Error::ValidationError(format!(
                "position ({}, {}) is outside the grid",
                widget.position.x, widget.position.y
            )));
        }
        if !self.grid.is_area_free(widget.position, widget.size) {
            return Err(Error::ValidationError("position is occupied by another widget".to_string()));
        }

        let (grid, widgets) = (self.grid.clone(), self.widgets.clone());
        self.grid.occupy(widget.position, widget.size);
        let id = widget.id.clone();
        self.widgets.push(widget);
        self.persist_widgets(grid, widgets).await?;
        debug!("added widget {}", id);
        self.emit(BoardEvent::WidgetAdded { id });
        Ok(())
    }

    /// Move a widget so its top-left cell is `position`. The new footprint
    /// may overlap the widget's current one.
    pub async fn move_widget(&mut self, id: &str, position: GridPosition) -> Result<()> {
        let idx = self.index_of(id)?;
        if !self.grid.is_position_valid(position) {
            return Err(Error::ValidationError(format!(
                "position ({}, {}) is outside the grid",
                position.x, position.y
            )));
        }
        let size = self.widgets[idx].size;
        self.relocate(idx, position, size).await
    }

    /// Change a widget's footprint, keeping its anchor
    pub async fn resize_widget(&mut self, id: &str, size: GridSize) -> Result<()> {
        let idx = self.index_of(id)?;
        let widget_type = self.widgets[idx].widget_type();
        if !widget_type.accepts_size(size) {
            let min = widget_type.default_size();
            return Err(Error::ValidationError(format!(
                "{} widgets must be at least {}x{}",
                widget_type, min.width, min.height
            )));
        }
        let position = self.widgets[idx].position;
        self.relocate(idx, position, size).await
    }

    /// Resize from a rendered pixel extent, snapping to whole cells
    pub async fn resize_widget_pixels(&mut self, id: &str, width_px: f64, height_px: f64) -> Result<()> {
        let size = self.grid.size_from_pixels(width_px, height_px);
        self.resize_widget(id, size).await
    }

    async fn relocate(&mut self, idx: usize, position: GridPosition, size: GridSize) -> Result<()> {
        let (old_pos, old_size) = (self.widgets[idx].position, self.widgets[idx].size);
        if (old_pos, old_size) == (position, size) {
            return Ok(());
        }
        let (grid, widgets) = (self.grid.clone(), self.widgets.clone());

        self.grid.free(old_pos, old_size);
        if !self.grid.is_area_free(position, size) {
            self.grid.occupy(old_pos, old_size);
            return Err(Error::ValidationError("position is occupied by another widget".to_string()));
        }
        self.grid.occupy(position, size);
        self.widgets[idx].position = position;
        self.widgets[idx].size = size;

        self.persist_widgets(grid, widgets).await?;
        let id = self.widgets[idx].id.clone();
        self.emit(BoardEvent::WidgetUpdated { id });
        Ok(())
    }

    /// Take a widget off the board and free its cells
    pub async fn remove_widget(&mut self, id: &str) -> Result<Widget> {
        let idx = self.index_of(id)?;
        let (grid, widgets) = (self.grid.clone(), self.widgets.clone());
        let removed = self.widgets.remove(idx);
        self.grid.free(removed.position, removed.size);
        self.persist_widgets(grid, widgets).await?;
        self.emit(BoardEvent::WidgetRemoved { id: removed.id.clone() });
        Ok(removed)
    }

    /// Flip a widget's edit mode; returns the new state
    pub async fn toggle_edit(&mut self, id: &str) -> Result<bool> {
        self.update_widget(id, |w| {
            w.is_editing = !w.is_editing;
            Ok(w.is_editing)
        })
        .await
    }

    /// Edit a widget's title, edit flag or variant content. Placement is
    /// owned by the grid: changes to id, position or size are rejected, as is
    /// content that fails validation.
    pub async fn update_widget<T, F>(&mut self, id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Widget) -> Result<T>,
    {
        let idx = self.index_of(id)?;
        let mut edited = self.widgets[idx].clone();
        let out = f(&mut edited)?;

        let current = &self.widgets[idx];
        if edited.id != current.id || edited.position != current.position || edited.size != current.size {
            return Err(Error::ValidationError(
                "use move_widget/resize_widget to change placement".to_string(),
            ));
        }
        edited.validate()?;

        let (grid, widgets) = (self.grid.clone(), self.widgets.clone());
        self.widgets[idx] = edited;
        self.persist_widgets(grid, widgets).await?;
        self.emit(BoardEvent::WidgetUpdated { id: id.to_string() });
        Ok(out)
    }

    /// Switch to a new grid geometry.
    ///
    /// Occupancy is rebuilt from the current widgets. If any widget would
    /// fall off the new grid the change is rejected and nothing is modified.
    pub async fn reconfigure_grid(&mut self, config: GridConfig) -> Result<()> {
        config.validate()?;
        let mut next = OccupancyGrid::new(config);
        for w in &self.widgets {
            if !next.is_area_free(w.position, w.size) {
                return Err(Error::ValidationError(format!(
                    "widget {} does not fit a {}x{} grid",
                    w.id, config.columns, config.rows
                )));
            }
            next.occupy(w.position, w.size);
        }
        self.store.set_grid_config(&config).await?;
        self.grid = next;
        self.emit(BoardEvent::GridUpdated(config));
        Ok(())
    }

    /// Edit the background; the result is validated before it is stored
    pub async fn update_background<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut BackgroundConfig) -> Result<T>,
    {
        let mut edited = self.background.clone();
        let out = f(&mut edited)?;
        edited.validate()?;
        self.store.set_background(&edited).await?;
        self.background = edited;
        self.emit(BoardEvent::BackgroundChanged);
        Ok(out)
    }

    /// Show the next slideshow image; `None` when the rotation is empty
    pub async fn advance_slideshow(&mut self) -> Result<Option<String>> {
        self.update_background(|bg| Ok(bg.advance_slideshow().map(str::to_string)))
            .await
    }

    /// Wipe storage and start over from defaults
    pub async fn reset(&mut self) -> Result<()> {
        self.store.clear().await?;
        self.store.initialize().await?;
        self.reload().await?;
        self.emit(BoardEvent::GridUpdated(self.grid.config()));
        self.emit(BoardEvent::BackgroundChanged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use std::sync::Mutex;

    async fn board() -> Board<MemoryBackend> {
        Board::open(NewTabStore::new(MemoryBackend::new())).await.unwrap()
    }

    #[tokio::test]
    async fn add_fills_first_free_slots() {
        let mut b = board().await;
        let note = b.add_widget(WidgetType::Note).await.unwrap();
        assert_eq!(note.position, GridPosition::new(0, 0));
        assert!(note.is_editing);
        let list = b.add_widget(WidgetType::TaskList).await.unwrap();
        assert_eq!(list.position, GridPosition::new(2, 0));
        assert!(!list.is_editing);
        assert_eq!(b.grid().occupied_count(), 4 + 6);
        assert_ne!(note.id, list.id);
    }

    #[tokio::test]
    async fn move_onto_own_footprint() {
        let mut b = board().await;
        let note = b.add_widget(WidgetType::Note).await.unwrap();
        b.move_widget(&note.id, GridPosition::new(1, 0)).await.unwrap();
        assert!(!b.grid().is_occupied(GridPosition::new(0, 0)));
        assert!(b.grid().is_occupied(GridPosition::new(2, 1)));
        assert_eq!(b.grid().occupied_count(), 4);
    }

    #[tokio::test]
    async fn failed_move_keeps_occupancy() {
        let mut b = board().await;
        let a = b.add_widget(WidgetType::Note).await.unwrap();
        let c = b.add_widget(WidgetType::Note).await.unwrap();
        let before = b.grid().render_ascii();
        let err = b.move_widget(&c.id, GridPosition::new(1, 1)).await.unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
        assert_eq!(b.grid().render_ascii(), before);
        assert_eq!(b.widget(&c.id).unwrap().position, GridPosition::new(2, 0));

        let err = b.move_widget(&a.id, GridPosition::new(12, 0)).await.unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
        assert!(b.move_widget("missing", GridPosition::new(0, 0)).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn update_cannot_change_placement() {
        let mut b = board().await;
        let note = b.add_widget(WidgetType::Note).await.unwrap();
        let err = b
            .update_widget(&note.id, |w| {
                w.position = GridPosition::new(5, 5);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
        assert_eq!(b.widget(&note.id).unwrap().position, GridPosition::new(0, 0));
    }

    #[tokio::test]
    async fn events_follow_persisted_changes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut b = board().await;
        b.on_change(move |e| sink.lock().unwrap().push(e.clone()));

        let icon = b.add_widget(WidgetType::Icon).await.unwrap();
        assert!(!b.toggle_edit(&icon.id).await.unwrap());
        b.remove_widget(&icon.id).await.unwrap();

        let events = seen.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                BoardEvent::WidgetAdded { id: icon.id.clone() },
                BoardEvent::WidgetUpdated { id: icon.id.clone() },
                BoardEvent::WidgetRemoved { id: icon.id.clone() },
            ]
        );
    }
}

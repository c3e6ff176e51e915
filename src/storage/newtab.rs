//! Typed access to the three persisted entities of a new-tab page

use super::{ChunkedStore, StorageBackend};
use crate::background::BackgroundConfig;
use crate::grid::GridConfig;
use crate::widget::Widget;
use crate::{Result, StoreConfig};
use log::{debug, info};

/// Chunked list of widgets
pub const WIDGETS_KEY: &str = "widgets";
/// Unchunked [`BackgroundConfig`]
pub const BACKGROUND_KEY: &str = "background";
/// Unchunked [`GridConfig`]
pub const GRID_CONFIG_KEY: &str = "gridConfig";

/// Persistence facade used by the board and the settings surface.
///
/// Widgets go through the chunked path; the background and grid configs are
/// small and stored directly. Reads fall back to defaults when nothing is
/// stored.
pub struct NewTabStore<B> {
    store: ChunkedStore<B>,
}

impl<B: StorageBackend> NewTabStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, StoreConfig::default())
    }

    pub fn with_config(backend: B, config: StoreConfig) -> Self {
        Self {
            store: ChunkedStore::with_config(backend, config),
        }
    }

    /// The chunked store underneath
    pub fn chunked(&self) -> &ChunkedStore<B> {
        &self.store
    }

    /// Write defaults for every entity that has never been stored
    pub async fn initialize(&self) -> Result<()> {
        if self.store.get_raw::<serde_json::Value>(GRID_CONFIG_KEY).await?.is_none() {
            info!("no grid config stored, writing defaults");
            self.set_grid_config(&GridConfig::default()).await?;
        }
        if self.store.get_raw::<serde_json::Value>(BACKGROUND_KEY).await?.is_none() {
            info!("no background stored, writing defaults");
            self.set_background(&BackgroundConfig::default()).await?;
        }
        if self.store.read_manifest(WIDGETS_KEY).await?.is_none() {
            info!("no widgets stored, writing an empty list");
            self.set_widgets(&[]).await?;
        }
        Ok(())
    }

    /// Stored widgets, or an empty list when none were ever saved
    pub async fn widgets(&self) -> Result<Vec<Widget>> {
        let widgets: Option<Vec<Widget>> = self.store.load(WIDGETS_KEY).await?;
        let widgets = widgets.unwrap_or_default();
        debug!("loaded {} widgets", widgets.len());
        Ok(widgets)
    }

    pub async fn set_widgets(&self, widgets: &[Widget]) -> Result<()> {
        self.store.save(WIDGETS_KEY, widgets).await
    }

    pub async fn background(&self) -> Result<BackgroundConfig> {
        Ok(self.store.get_raw(BACKGROUND_KEY).await?.unwrap_or_default())
    }

    pub async fn set_background(&self, config: &BackgroundConfig) -> Result<()> {
        self.store.set_raw(BACKGROUND_KEY, config).await
    }

    pub async fn grid_config(&self) -> Result<GridConfig> {
        Ok(self.store.get_raw(GRID_CONFIG_KEY).await?.unwrap_or_default())
    }

    pub async fn set_grid_config(&self, config: &GridConfig) -> Result<()> {
        self.store.set_raw(GRID_CONFIG_KEY, config).await
    }

    /// Forget everything, including keys this facade did not write
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }
}

//! Page background: a solid color or an image, with an optional slideshow
//! rotating through a list of images.

use crate::validate::{self, MAX_IMAGES, MAX_SLIDESHOW_INTERVAL_MS, MIN_SLIDESHOW_INTERVAL_MS};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundKind {
    Color,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideshowConfig {
    pub enabled: bool,
    /// Milliseconds between images
    pub interval: u64,
    pub images: Vec<String>,
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: 300_000,
            images: Vec::new(),
        }
    }
}

/// Persisted under the `background` key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundConfig {
    #[serde(rename = "type")]
    pub kind: BackgroundKind,
    /// A color for `Color`, an image source for `Image`
    pub value: String,
    #[serde(default)]
    pub slideshow: SlideshowConfig,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            kind: BackgroundKind::Color,
            value: "#f0f0f0".to_string(),
            slideshow: SlideshowConfig::default(),
        }
    }
}

impl BackgroundConfig {
    pub fn set_color(&mut self, color: &str) -> Result<()> {
        if !validate::is_valid_color(color) {
            return Err(Error::ValidationError(format!("invalid color '{}'", color)));
        }
        self.kind = BackgroundKind::Color;
        self.value = color.to_string();
        Ok(())
    }

    pub fn set_image(&mut self, source: &str) -> Result<()> {
        if !validate::is_valid_image_source(source) {
            return Err(Error::ValidationError(format!("invalid image source '{}'", source)));
        }
        self.kind = BackgroundKind::Image;
        self.value = source.to_string();
        Ok(())
    }

    /// Add an image to the rotation. Adding one already present is a no-op.
    pub fn add_slideshow_image(&mut self, source: &str) -> Result<()> {
        if self.slideshow.images.iter().any(|i| i == source) {
            return Ok(());
        }
        if !validate::is_valid_image_source(source) {
            return Err(Error::ValidationError(format!("invalid image source '{}'", source)));
        }
        if self.slideshow.images.len() >= MAX_IMAGES {
            return Err(Error::ValidationError(format!("at most {} slideshow images", MAX_IMAGES)));
        }
        self.slideshow.images.push(source.to_string());
        Ok(())
    }

    /// Returns whether the image was in the rotation
    pub fn remove_slideshow_image(&mut self, source: &str) -> bool {
        let before = self.slideshow.images.len();
        self.slideshow.images.retain(|i| i != source);
        self.slideshow.images.len() != before
    }

    pub fn set_slideshow_interval(&mut self, interval_ms: u64) -> Result<()> {
        if !(MIN_SLIDESHOW_INTERVAL_MS..=MAX_SLIDESHOW_INTERVAL_MS).contains(&interval_ms) {
            return Err(Error::ValidationError(format!(
                "slideshow interval must be between {} and {} ms",
                MIN_SLIDESHOW_INTERVAL_MS, MAX_SLIDESHOW_INTERVAL_MS
            )));
        }
        self.slideshow.interval = interval_ms;
        Ok(())
    }

    pub fn set_slideshow_enabled(&mut self, enabled: bool) {
        self.slideshow.enabled = enabled;
    }

    /// Whether a timer should be rotating images right now
    pub fn slideshow_active(&self) -> bool {
        self.slideshow.enabled && !self.slideshow.images.is_empty()
    }

    /// Switch to the image after the current one, wrapping around. When the
    /// current value is not in the rotation the first image is used.
    pub fn advance_slideshow(&mut self) -> Option<&str> {
        let images = &self.slideshow.images;
        if images.is_empty() {
            return None;
        }
        let next = match images.iter().position(|i| *i == self.value) {
            Some(idx) => (idx + 1) % images.len(),
            None => 0,
        };
        self.kind = BackgroundKind::Image;
        self.value = images[next].clone();
        Some(&self.value)
    }

    /// Check a config read from storage or built by hand
    pub fn validate(&self) -> Result<()> {
        let ok = match self.kind {
            BackgroundKind::Color => validate::is_valid_color(&self.value),
            BackgroundKind::Image => validate::is_valid_image_source(&self.value),
        };
        if !ok {
            return Err(Error::ValidationError(format!("invalid background value '{}'", self.value)));
        }
        if self.slideshow.images.len() > MAX_IMAGES {
            return Err(Error::ValidationError(format!("at most {} slideshow images", MAX_IMAGES)));
        }
        Ok(())
    }
}

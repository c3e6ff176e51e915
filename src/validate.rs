//! Content limits and field validators shared by widgets and the background

use url::Url;

/// Maximum number of widgets on a board
pub const MAX_WIDGETS: usize = 50;
/// Maximum widget title length, in characters
pub const MAX_TITLE_LENGTH: usize = 50;
/// Maximum note content length, in characters
pub const MAX_NOTE_LENGTH: usize = 1000;
/// Maximum number of tasks in one task list
pub const MAX_TASKS: usize = 20;
/// Maximum number of slideshow images
pub const MAX_IMAGES: usize = 10;
/// Shortest slideshow interval (5 seconds)
pub const MIN_SLIDESHOW_INTERVAL_MS: u64 = 5_000;
/// Longest slideshow interval (1 hour)
pub const MAX_SLIDESHOW_INTERVAL_MS: u64 = 3_600_000;

/// `#rgb` or `#rrggbb`
pub fn is_valid_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// An http(s) URL with a dotted host. The scheme may be omitted.
pub fn is_valid_url(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return false;
    }
    let parsed = if value.contains("://") {
        Url::parse(value)
    } else {
        Url::parse(&format!("https://{}", value))
    };
    match parsed {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|h| h.contains('.') && !h.ends_with('.'))
        }
        Err(_) => false,
    }
}

/// An image source usable as a background: a web URL or an inline data URL
pub fn is_valid_image_source(value: &str) -> bool {
    value.starts_with("data:image/") || is_valid_url(value)
}

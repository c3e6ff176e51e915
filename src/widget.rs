//! Widget records: a closed set of tile kinds sharing grid placement fields.
//!
//! Widgets persist as flat JSON objects whose `type` field selects the
//! variant, e.g.
//!
//! ```json
//! {"id":"widget-1","type":"note","position":{"x":0,"y":0},
//!  "size":{"width":2,"height":2},"isEditing":false,
//!  "content":"","backgroundColor":"#ffffff"}
//! ```

use crate::grid::{GridPosition, GridSize};
use crate::validate::{self, MAX_NOTE_LENGTH, MAX_TASKS, MAX_TITLE_LENGTH};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Discriminant of [`WidgetKind`], as written in the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetType {
    Icon,
    Note,
    TaskList,
    Bookmark,
}

impl WidgetType {
    pub const ALL: [WidgetType; 4] = [WidgetType::Icon, WidgetType::Note, WidgetType::TaskList, WidgetType::Bookmark];

    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetType::Icon => "icon",
            WidgetType::Note => "note",
            WidgetType::TaskList => "tasklist",
            WidgetType::Bookmark => "bookmark",
        }
    }

    /// Footprint a new widget gets; also the smallest footprint allowed
    pub fn default_size(&self) -> GridSize {
        match self {
            WidgetType::Icon => GridSize::new(1, 1),
            WidgetType::Note => GridSize::new(2, 2),
            WidgetType::TaskList => GridSize::new(2, 3),
            WidgetType::Bookmark => GridSize::new(1, 1),
        }
    }

    /// Whether `size` is at least the default footprint in both dimensions
    pub fn accepts_size(&self, size: GridSize) -> bool {
        let min = self.default_size();
        size.width >= min.width && size.height >= min.height
    }
}

impl fmt::Display for WidgetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WidgetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "icon" => Ok(WidgetType::Icon),
            "note" => Ok(WidgetType::Note),
            "tasklist" | "task-list" | "tasks" => Ok(WidgetType::TaskList),
            "bookmark" => Ok(WidgetType::Bookmark),
            other => Err(Error::ValidationError(format!("unknown widget type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IconWidget {
    pub url: String,
    pub icon_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NoteWidget {
    pub content: String,
    pub background_color: String,
}

impl Default for NoteWidget {
    fn default() -> Self {
        Self {
            content: String::new(),
            background_color: "#ffffff".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskItem {
    pub id: String,
    pub text: String,
    pub completed: bool,
    pub created_at: u64,
}

/// Ordering applied by [`TaskListWidget::visible_tasks`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSort {
    /// Newest first
    #[default]
    Created,
    /// Open tasks before completed ones
    Completed,
    /// Alphabetical, case-insensitive
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskListWidget {
    pub tasks: Vec<TaskItem>,
    pub sort_by: TaskSort,
    pub show_completed: bool,
}

impl TaskListWidget {
    /// Append a task created at `now_ms`. Text is trimmed and must not be empty.
    pub fn add_task(&mut self, text: &str, now_ms: u64) -> Result<&TaskItem> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::ValidationError("task text is empty".to_string()));
        }
        if self.tasks.len() >= MAX_TASKS {
            return Err(Error::ValidationError(format!("a task list holds at most {} tasks", MAX_TASKS)));
        }
        let mut stamp = now_ms;
        while self.tasks.iter().any(|t| t.id == stamp.to_string()) {
            stamp += 1;
        }
        self.tasks.push(TaskItem {
            id: stamp.to_string(),
            text: text.to_string(),
            completed: false,
            created_at: now_ms,
        });
        Ok(&self.tasks[self.tasks.len() - 1])
    }

    /// Flip the completion flag; returns the new state
    pub fn toggle_task(&mut self, id: &str) -> Result<bool> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::NotFound(format!("task {}", id)))?;
        task.completed = !task.completed;
        Ok(task.completed)
    }

    pub fn remove_task(&mut self, id: &str) -> Result<()> {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        if self.tasks.len() == before {
            return Err(Error::NotFound(format!("task {}", id)));
        }
        Ok(())
    }

    /// Tasks as a list view shows them: completed ones hidden unless
    /// `show_completed`, ordered by `sort_by`
    pub fn visible_tasks(&self) -> Vec<&TaskItem> {
        let mut tasks: Vec<&TaskItem> = self
            .tasks
            .iter()
            .filter(|t| self.show_completed || !t.completed)
            .collect();
        tasks.sort_by(|a, b| match self.sort_by {
            TaskSort::Created => b.created_at.cmp(&a.created_at),
            TaskSort::Completed => a.completed.cmp(&b.completed),
            TaskSort::Text => compare_text(&a.text, &b.text),
        });
        tasks
    }
}

fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkData {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub favicon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub last_visited: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkFolder {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookmarkLayout {
    #[default]
    Compact,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookmarkWidget {
    pub bookmark_data: BookmarkData,
    pub show_description: bool,
    pub show_tags: bool,
    pub layout: BookmarkLayout,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folders: Option<Vec<BookmarkFolder>>,
}

/// Variant payload of a widget, tagged by `type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WidgetKind {
    Icon(IconWidget),
    Note(NoteWidget),
    TaskList(TaskListWidget),
    Bookmark(BookmarkWidget),
}

impl WidgetKind {
    /// Fresh payload for a newly added widget
    pub fn empty(widget_type: WidgetType) -> Self {
        match widget_type {
            WidgetType::Icon => WidgetKind::Icon(IconWidget::default()),
            WidgetType::Note => WidgetKind::Note(NoteWidget::default()),
            WidgetType::TaskList => WidgetKind::TaskList(TaskListWidget::default()),
            WidgetType::Bookmark => WidgetKind::Bookmark(BookmarkWidget::default()),
        }
    }

    pub fn widget_type(&self) -> WidgetType {
        match self {
            WidgetKind::Icon(_) => WidgetType::Icon,
            WidgetKind::Note(_) => WidgetType::Note,
            WidgetKind::TaskList(_) => WidgetType::TaskList,
            WidgetKind::Bookmark(_) => WidgetType::Bookmark,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            WidgetKind::Icon(icon) => {
                check_url("icon url", &icon.url)?;
                check_url("icon image url", &icon.icon_url)
            }
            WidgetKind::Note(note) => {
                if note.content.chars().count() > MAX_NOTE_LENGTH {
                    return Err(Error::ValidationError(format!(
                        "note content exceeds {} characters",
                        MAX_NOTE_LENGTH
                    )));
                }
                check_color(&note.background_color)
            }
            WidgetKind::TaskList(list) => {
                if list.tasks.len() > MAX_TASKS {
                    return Err(Error::ValidationError(format!("a task list holds at most {} tasks", MAX_TASKS)));
                }
                Ok(())
            }
            WidgetKind::Bookmark(bookmark) => {
                check_url("bookmark url", &bookmark.bookmark_data.url)?;
                match &bookmark.bookmark_data.color {
                    Some(color) => check_color(color),
                    None => Ok(()),
                }
            }
        }
    }
}

// Empty URLs are allowed: freshly added icons and bookmarks start blank.
fn check_url(what: &str, value: &str) -> Result<()> {
    if value.is_empty() || validate::is_valid_url(value) {
        Ok(())
    } else {
        Err(Error::ValidationError(format!("invalid {}: '{}'", what, value)))
    }
}

fn check_color(value: &str) -> Result<()> {
    if validate::is_valid_color(value) {
        Ok(())
    } else {
        Err(Error::ValidationError(format!("invalid color '{}'", value)))
    }
}

/// A tile on the grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub id: String,
    pub position: GridPosition,
    pub size: GridSize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub is_editing: bool,
    #[serde(flatten)]
    pub kind: WidgetKind,
}

impl Widget {
    /// New widget of the kind's type at `position`, with the default size
    pub fn new(id: impl Into<String>, kind: WidgetKind, position: GridPosition) -> Self {
        let size = kind.widget_type().default_size();
        Self {
            id: id.into(),
            position,
            size,
            title: None,
            is_editing: false,
            kind,
        }
    }

    pub fn widget_type(&self) -> WidgetType {
        self.kind.widget_type()
    }

    /// Check footprint minimums, title length and variant content
    pub fn validate(&self) -> Result<()> {
        if !self.widget_type().accepts_size(self.size) {
            let min = self.widget_type().default_size();
            return Err(Error::ValidationError(format!(
                "{} widgets must be at least {}x{} (got {}x{})",
                self.widget_type(),
                min.width,
                min.height,
                self.size.width,
                self.size.height
            )));
        }
        if let Some(title) = &self.title {
            if title.chars().count() > MAX_TITLE_LENGTH {
                return Err(Error::ValidationError(format!(
                    "title exceeds {} characters",
                    MAX_TITLE_LENGTH
                )));
            }
        }
        self.kind.validate()
    }

    pub fn as_task_list_mut(&mut self) -> Option<&mut TaskListWidget> {
        match &mut self.kind {
            WidgetKind::TaskList(list) => Some(list),
            _ => None,
        }
    }
}

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tabgrid::storage::FileBackend;
use tabgrid::widget::{now_millis, TaskListWidget, Widget, WidgetKind};
use tabgrid::{Board, GridConfig, GridPosition, GridSize, NewTabStore, StoreConfig, WidgetType, DEFAULT_CHUNK_SIZE};
use tracing_subscriber::EnvFilter;

/// Inspect and edit a new-tab layout stored in a JSON file
#[derive(Parser, Debug)]
#[command(name = "tabgrid", version)]
struct Cli {
    /// Storage file (created on first write)
    #[arg(long, default_value = "tabgrid.json")]
    store: PathBuf,

    /// Maximum characters per stored chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write defaults for anything not stored yet
    Init,
    /// Print the grid and the widget list
    Show,
    /// Add a widget at the first free slot
    Add { widget_type: WidgetType },
    /// Move a widget's top-left cell
    Move { id: String, x: u32, y: u32 },
    /// Resize a widget in cells
    Resize { id: String, width: u32, height: u32 },
    /// Remove a widget
    Remove { id: String },
    /// Edit a widget; with no options, toggles edit mode
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        /// Note text
        #[arg(long)]
        content: Option<String>,
        /// Icon or bookmark link
        #[arg(long)]
        url: Option<String>,
        /// Note background color
        #[arg(long)]
        color: Option<String>,
    },
    /// Manage the tasks of a task-list widget
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Change grid dimensions
    Grid {
        columns: u32,
        rows: u32,
        #[arg(long)]
        cell_size: Option<u32>,
        #[arg(long)]
        margin: Option<u32>,
    },
    /// Change the page background
    Background {
        #[command(subcommand)]
        action: BackgroundAction,
    },
    /// Print the reassembled value stored under a key
    Dump { key: String },
    /// Delete everything in the store
    Clear,
}

#[derive(Subcommand, Debug)]
enum TaskAction {
    Add { widget: String, text: String },
    Toggle { widget: String, task: String },
    Remove { widget: String, task: String },
}

#[derive(Subcommand, Debug)]
enum BackgroundAction {
    Color { color: String },
    Image { source: String },
    /// Add an image to the slideshow
    SlideshowAdd { source: String },
    /// Remove an image from the slideshow
    SlideshowRemove { source: String },
    /// Enable the slideshow, optionally setting the interval in ms
    SlideshowOn {
        #[arg(long)]
        interval: Option<u64>,
    },
    SlideshowOff,
    /// Switch to the next slideshow image
    Next,
}

fn task_list(w: &mut Widget) -> tabgrid::Result<&mut TaskListWidget> {
    let id = w.id.clone();
    w.as_task_list_mut()
        .ok_or_else(|| tabgrid::Error::ValidationError(format!("{} is not a task list", id)))
}

fn reject_unless(applies: bool, option: &str, widget_type: WidgetType) -> tabgrid::Result<()> {
    if applies {
        Ok(())
    } else {
        Err(tabgrid::Error::ValidationError(format!(
            "{} does not apply to {} widgets",
            option, widget_type
        )))
    }
}

fn print_board(board: &Board<FileBackend>) {
    println!("{}", board.grid().render_ascii());
    for w in board.widgets() {
        println!(
            "{:<20} {:<9} at ({}, {}) size {}x{}{}{}",
            w.id,
            w.widget_type().as_str(),
            w.position.x,
            w.position.y,
            w.size.width,
            w.size.height,
            w.title.as_deref().map(|t| format!(" \"{}\"", t)).unwrap_or_default(),
            if w.is_editing { " [editing]" } else { "" }
        );
    }
}

async fn run(cli: Cli, board: &mut Board<FileBackend>) -> Result<()> {
    match cli.command {
        Command::Init => println!("initialized {}", cli.store.display()),
        Command::Show => print_board(board),
        Command::Add { widget_type } => {
            let w = board.add_widget(widget_type).await.context("add failed")?;
            println!("added {} at ({}, {})", w.id, w.position.x, w.position.y);
        }
        Command::Move { id, x, y } => {
            board
                .move_widget(&id, GridPosition::new(x, y))
                .await
                .with_context(|| format!("could not move {}", id))?;
            print_board(board);
        }
        Command::Resize { id, width, height } => {
            board
                .resize_widget(&id, GridSize::new(width, height))
                .await
                .with_context(|| format!("could not resize {}", id))?;
            print_board(board);
        }
        Command::Remove { id } => {
            board.remove_widget(&id).await.with_context(|| format!("could not remove {}", id))?;
            println!("removed {}", id);
        }
        Command::Edit { id, title, content, url, color } => {
            if title.is_none() && content.is_none() && url.is_none() && color.is_none() {
                let editing = board.toggle_edit(&id).await?;
                println!("{} editing: {}", id, editing);
                return Ok(());
            }
            board
                .update_widget(&id, |w| {
                    let widget_type = w.widget_type();
                    let is_note = widget_type == WidgetType::Note;
                    let takes_url = matches!(widget_type, WidgetType::Icon | WidgetType::Bookmark);
                    reject_unless(content.is_none() || is_note, "--content", widget_type)?;
                    reject_unless(color.is_none() || is_note, "--color", widget_type)?;
                    reject_unless(url.is_none() || takes_url, "--url", widget_type)?;

                    if title.is_some() {
                        w.title = title;
                    }
                    match &mut w.kind {
                        WidgetKind::Note(note) => {
                            if let Some(content) = content {
                                note.content = content;
                            }
                            if let Some(color) = color {
                                note.background_color = color;
                            }
                        }
                        WidgetKind::Icon(icon) => {
                            if let Some(url) = url {
                                icon.url = url;
                            }
                        }
                        WidgetKind::Bookmark(bookmark) => {
                            if let Some(url) = url {
                                bookmark.bookmark_data.url = url;
                            }
                        }
                        WidgetKind::TaskList(_) => {}
                    }
                    Ok(())
                })
                .await
                .with_context(|| format!("could not edit {}", id))?;
            println!("edited {}", id);
        }
        Command::Task { action } => match action {
            TaskAction::Add { widget, text } => {
                let task_id = board
                    .update_widget(&widget, |w| task_list(w)?.add_task(&text, now_millis()).map(|t| t.id.clone()))
                    .await?;
                println!("added task {}", task_id);
            }
            TaskAction::Toggle { widget, task } => {
                let done = board
                    .update_widget(&widget, |w| task_list(w)?.toggle_task(&task))
                    .await?;
                println!("task {} completed: {}", task, done);
            }
            TaskAction::Remove { widget, task } => {
                board
                    .update_widget(&widget, |w| task_list(w)?.remove_task(&task))
                    .await?;
                println!("removed task {}", task);
            }
        },
        Command::Grid { columns, rows, cell_size, margin } => {
            let current = board.grid().config();
            let config = GridConfig {
                columns,
                rows,
                cell_size: cell_size.unwrap_or(current.cell_size),
                margin: margin.unwrap_or(current.margin),
            };
            board.reconfigure_grid(config).await.context("grid change rejected")?;
            print_board(board);
        }
        Command::Background { action } => {
            match action {
                BackgroundAction::Color { color } => board.update_background(|bg| bg.set_color(&color)).await?,
                BackgroundAction::Image { source } => board.update_background(|bg| bg.set_image(&source)).await?,
                BackgroundAction::SlideshowAdd { source } => {
                    board.update_background(|bg| bg.add_slideshow_image(&source)).await?
                }
                BackgroundAction::SlideshowRemove { source } => {
                    let removed = board.update_background(|bg| Ok(bg.remove_slideshow_image(&source))).await?;
                    if !removed {
                        bail!("{} is not in the slideshow", source);
                    }
                }
                BackgroundAction::SlideshowOn { interval } => {
                    board
                        .update_background(|bg| {
                            if let Some(ms) = interval {
                                bg.set_slideshow_interval(ms)?;
                            }
                            bg.set_slideshow_enabled(true);
                            Ok(())
                        })
                        .await?
                }
                BackgroundAction::SlideshowOff => {
                    board
                        .update_background(|bg| {
                            bg.set_slideshow_enabled(false);
                            Ok(())
                        })
                        .await?
                }
                BackgroundAction::Next => {
                    if board.advance_slideshow().await?.is_none() {
                        bail!("the slideshow has no images");
                    }
                }
            }
            println!("{}", serde_json::to_string_pretty(board.background())?);
        }
        Command::Dump { key } => {
            let chunked = board.store().chunked();
            let value = match chunked.load::<serde_json::Value>(&key).await? {
                Some(v) => v,
                None => chunked
                    .get_raw::<serde_json::Value>(&key)
                    .await?
                    .with_context(|| format!("nothing stored under {}", key))?,
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Clear => {
            board.reset().await.context("clear failed")?;
            println!("cleared {}", cli.store.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.chunk_size == 0 {
        bail!("--chunk-size must be positive");
    }

    let backend = FileBackend::open(&cli.store)
        .await
        .with_context(|| format!("could not open {}", cli.store.display()))?;
    let config = StoreConfig {
        chunk_size: cli.chunk_size,
        ..Default::default()
    };
    let mut board = Board::open(NewTabStore::with_config(backend, config))
        .await
        .context("could not load the board")?;

    run(cli, &mut board).await
}

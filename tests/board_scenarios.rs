//! End-to-end board scenarios over the memory and file backends

use serde_json::Value;
use std::sync::Arc;
use tabgrid::storage::{FileBackend, MemoryBackend, Quota, StorageBackend};
use tabgrid::widget::{Widget, WidgetKind};
use tabgrid::{Board, Error, GridConfig, GridPosition, GridSize, NewTabStore, StoreConfig, WidgetType};

async fn memory_board(config: StoreConfig, quota: Quota) -> (Arc<MemoryBackend>, Board<Arc<MemoryBackend>>) {
    let backend = Arc::new(MemoryBackend::with_quota(quota));
    let board = Board::open(NewTabStore::with_config(Arc::clone(&backend), config))
        .await
        .expect("board should open");
    (backend, board)
}

#[tokio::test]
async fn test_layout_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("newtab.json");

    let (note_id, list_id) = {
        let backend = FileBackend::open(&path).await.unwrap();
        let mut board = Board::open(NewTabStore::new(backend)).await.unwrap();
        let note = board.add_widget(WidgetType::Note).await.unwrap();
        let list = board.add_widget(WidgetType::TaskList).await.unwrap();
        board.move_widget(&list.id, GridPosition::new(6, 2)).await.unwrap();
        board
            .update_widget(&list.id, |w| {
                w.title = Some("Today".into());
                Ok(())
            })
            .await
            .unwrap();
        (note.id, list.id)
    };

    let backend = FileBackend::open(&path).await.unwrap();
    let board = Board::open(NewTabStore::new(backend)).await.unwrap();
    assert_eq!(board.widgets().len(), 2);
    assert_eq!(board.widget(&note_id).unwrap().position, GridPosition::new(0, 0));
    let list = board.widget(&list_id).unwrap();
    assert_eq!(list.position, GridPosition::new(6, 2));
    assert_eq!(list.title.as_deref(), Some("Today"));
    assert_eq!(board.grid().occupied_count(), 4 + 6);
    assert!(board.grid().is_occupied(GridPosition::new(7, 4)));
}

#[tokio::test]
async fn test_stored_widgets_use_chunked_layout() {
    let (backend, mut board) = memory_board(
        StoreConfig {
            chunk_size: 64,
            ..Default::default()
        },
        Quota::UNLIMITED,
    )
    .await;
    board.add_widget(WidgetType::Bookmark).await.unwrap();

    let all = backend.get_all().await.unwrap();
    let manifest: Vec<String> = serde_json::from_str(all["widgets_chunks"].as_str().unwrap()).unwrap();
    assert!(manifest.len() > 1);
    let joined: String = manifest.iter().map(|k| all[k].as_str().unwrap()).collect();
    let widgets: Vec<Value> = serde_json::from_str(&joined).unwrap();
    assert_eq!(widgets[0]["type"], "bookmark");
    assert!(all["gridConfig"].is_object());
    assert_eq!(all["background"]["type"], "color");
}

#[tokio::test]
async fn test_failed_persist_rolls_back() {
    // after initialization four items exist; a widget needs more chunks than the cap allows
    let quota = Quota {
        max_items: Some(6),
        ..Quota::UNLIMITED
    };
    let (backend, mut board) = memory_board(
        StoreConfig {
            chunk_size: 20,
            ..Default::default()
        },
        quota,
    )
    .await;
    assert_eq!(backend.len(), 4);

    let err = board.add_widget(WidgetType::Note).await.unwrap_err();
    assert!(matches!(err, Error::BackendError(_)), "got {:?}", err);
    assert!(board.widgets().is_empty());
    assert_eq!(board.grid().occupied_count(), 0);
    assert_eq!(backend.len(), 4);
}

#[tokio::test]
async fn test_reconfigure_keeps_or_rejects() {
    let (_, mut board) = memory_board(StoreConfig::default(), Quota::UNLIMITED).await;
    let note = board.add_widget(WidgetType::Note).await.unwrap();
    board.move_widget(&note.id, GridPosition::new(9, 3)).await.unwrap();

    let narrow = GridConfig {
        columns: 8,
        ..GridConfig::default()
    };
    let err = board.reconfigure_grid(narrow).await.unwrap_err();
    assert!(matches!(err, Error::ValidationError(_)));
    assert_eq!(board.grid().config(), GridConfig::default());
    assert_eq!(board.store().grid_config().await.unwrap(), GridConfig::default());

    let wide = GridConfig {
        columns: 16,
        rows: 8,
        ..GridConfig::default()
    };
    board.reconfigure_grid(wide).await.unwrap();
    assert_eq!(board.grid().config(), wide);
    assert_eq!(board.grid().occupied_count(), 4);
    assert!(board.grid().is_occupied(GridPosition::new(10, 4)));
    assert_eq!(board.store().grid_config().await.unwrap(), wide);

    let empty = GridConfig {
        columns: 0,
        ..GridConfig::default()
    };
    assert!(board.reconfigure_grid(empty).await.is_err());
}

#[tokio::test]
async fn test_resize_respects_minimums_and_neighbours() {
    let (_, mut board) = memory_board(StoreConfig::default(), Quota::UNLIMITED).await;
    let list = board.add_widget(WidgetType::TaskList).await.unwrap();
    let icon = board.add_widget(WidgetType::Icon).await.unwrap();
    assert_eq!(icon.position, GridPosition::new(2, 0));

    let err = board.resize_widget(&list.id, GridSize::new(2, 2)).await.unwrap_err();
    assert!(matches!(err, Error::ValidationError(_)));
    let err = board.resize_widget(&list.id, GridSize::new(3, 3)).await.unwrap_err();
    assert!(matches!(err, Error::ValidationError(_)));
    assert_eq!(board.widget(&list.id).unwrap().size, GridSize::new(2, 3));

    // 430px at a 110px pitch rounds to 4 cells
    board.resize_widget_pixels(&list.id, 210.0, 430.0).await.unwrap();
    assert_eq!(board.widget(&list.id).unwrap().size, GridSize::new(2, 4));
    assert_eq!(board.grid().occupied_count(), 8 + 1);
}

#[tokio::test]
async fn test_overlapping_stored_widgets_still_load() {
    let backend = Arc::new(MemoryBackend::new());
    let store = NewTabStore::new(Arc::clone(&backend));
    let a = Widget::new("a", WidgetKind::empty(WidgetType::Note), GridPosition::new(0, 0));
    let b = Widget::new("b", WidgetKind::empty(WidgetType::Note), GridPosition::new(1, 1));
    store.set_widgets(&[a, b]).await.unwrap();

    let board = Board::open(store).await.unwrap();
    assert_eq!(board.widgets().len(), 2);
    assert_eq!(board.grid().occupied_count(), 7);
}

#[tokio::test]
async fn test_background_edits_are_validated() {
    let (_, mut board) = memory_board(StoreConfig::default(), Quota::UNLIMITED).await;
    let err = board.update_background(|bg| bg.set_color("purple")).await.unwrap_err();
    assert!(matches!(err, Error::ValidationError(_)));
    assert_eq!(board.background().value, "#f0f0f0");

    board
        .update_background(|bg| {
            bg.add_slideshow_image("https://img.example.com/1.jpg")?;
            bg.add_slideshow_image("https://img.example.com/2.jpg")?;
            bg.set_slideshow_enabled(true);
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(
        board.advance_slideshow().await.unwrap().as_deref(),
        Some("https://img.example.com/1.jpg")
    );
    let stored = board.store().background().await.unwrap();
    assert_eq!(stored.value, "https://img.example.com/1.jpg");
    assert!(stored.slideshow_active());
}

#[tokio::test]
async fn test_task_edits_persist() {
    let (_, mut board) = memory_board(StoreConfig::default(), Quota::UNLIMITED).await;
    let list = board.add_widget(WidgetType::TaskList).await.unwrap();
    let task_id = board
        .update_widget(&list.id, |w| {
            let tasks = w.as_task_list_mut().ok_or_else(|| Error::Other("not a list".into()))?;
            Ok(tasks.add_task("water plants", 1)?.id.clone())
        })
        .await
        .unwrap();
    board
        .update_widget(&list.id, |w| match w.as_task_list_mut() {
            Some(tasks) => tasks.toggle_task(&task_id),
            None => Ok(false),
        })
        .await
        .unwrap();

    let stored = board.store().widgets().await.unwrap();
    match &stored[0].kind {
        WidgetKind::TaskList(tasks) => assert!(tasks.tasks[0].completed),
        other => panic!("unexpected kind {:?}", other),
    }
}

#[tokio::test]
async fn test_reset_restores_defaults() {
    let (backend, mut board) = memory_board(StoreConfig::default(), Quota::UNLIMITED).await;
    board.add_widget(WidgetType::Note).await.unwrap();
    board
        .reconfigure_grid(GridConfig {
            columns: 20,
            ..GridConfig::default()
        })
        .await
        .unwrap();

    board.reset().await.unwrap();
    assert!(board.widgets().is_empty());
    assert_eq!(board.grid().config(), GridConfig::default());
    assert_eq!(board.grid().occupied_count(), 0);
    assert_eq!(
        backend.keys(),
        vec!["background", "gridConfig", "widgets_chunk_0", "widgets_chunks"]
    );
}

#[tokio::test]
async fn test_board_fills_up() {
    let (_, mut board) = memory_board(StoreConfig::default(), Quota::UNLIMITED).await;
    for _ in 0..18 {
        board.add_widget(WidgetType::Note).await.unwrap();
    }
    assert_eq!(board.grid().occupied_count(), 72);
    let err = board.add_widget(WidgetType::Icon).await.unwrap_err();
    assert!(matches!(err, Error::ValidationError(_)));
}

#[tokio::test]
async fn test_oversized_grid_is_rejected() {
    let (_, mut board) = memory_board(StoreConfig::default(), Quota::UNLIMITED).await;
    let huge = GridConfig {
        columns: u32::MAX,
        rows: u32::MAX,
        ..GridConfig::default()
    };
    let err = board.reconfigure_grid(huge).await.unwrap_err();
    assert!(matches!(err, Error::ValidationError(_)), "got {:?}", err);
    assert_eq!(board.grid().config(), GridConfig::default());

    let wide_cells = GridConfig {
        cell_size: u32::MAX,
        margin: 1,
        ..GridConfig::default()
    };
    assert!(matches!(
        board.reconfigure_grid(wide_cells).await,
        Err(Error::ValidationError(_))
    ));
}

#[tokio::test]
async fn test_stored_oversized_grid_falls_back_to_defaults() {
    let backend = Arc::new(MemoryBackend::new());
    let store = NewTabStore::new(Arc::clone(&backend));
    store
        .set_grid_config(&GridConfig {
            columns: 100_000,
            rows: 100_000,
            ..GridConfig::default()
        })
        .await
        .unwrap();

    let board = Board::open(store).await.unwrap();
    assert_eq!(board.grid().config(), GridConfig::default());
}

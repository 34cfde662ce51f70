use super::*;
use dependinator_core::Point;

fn node(name: &str, parent_name: &str, kind: NodeKind) -> ModelItem {
    ModelItem::Node(NodeItem {
        name: name.to_string(),
        parent_name: parent_name.to_string(),
        kind,
        description: String::new(),
        boundary: Rect::new(10.0, 20.0, 200.0, 100.0),
        zoom: 1.0 / 7.0,
        color: None,
        background: None,
        is_modified: false,
        is_hidden: false,
    })
}

fn link(source: &str, target: &str) -> ModelItem {
    ModelItem::Link(LinkItem {
        source: source.to_string(),
        target: target.to_string(),
    })
}

fn line(source: &str, target: &str, points: Vec<Point>) -> ModelItem {
    ModelItem::Line(LineItem {
        source: source.to_string(),
        target: target.to_string(),
        points,
    })
}

fn sample_items() -> Vec<ModelItem> {
    let ModelItem::Node(mut hidden) = node("N.B", "N", NodeKind::Type) else {
        unreachable!()
    };
    hidden.description = "class B".to_string();
    hidden.color = Some("#336699".to_string());
    hidden.is_hidden = true;
    hidden.is_modified = true;

    vec![
        node("N", "", NodeKind::Namespace),
        node("N.A", "N", NodeKind::Type),
        ModelItem::Node(hidden),
        link("N.A", "N.B"),
        line("N.A", "N.B", vec![Point::new(1.5, 2.5), Point::new(3.0, 4.0)]),
    ]
}

#[test]
fn test_tables_are_created() -> Result<(), StorageError> {
    let storage = Storage::new_in_memory()?;
    let mut stmt = storage
        .conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    assert_eq!(tables, vec!["line_item", "link_item", "node_item", "snapshot_meta"]);
    Ok(())
}

#[test]
fn test_snapshot_round_trip() -> Result<(), StorageError> {
    let mut storage = Storage::new_in_memory()?;
    let items = sample_items();
    storage.save_snapshot(&items)?;
    assert_eq!(storage.load_snapshot()?, items);
    Ok(())
}

#[test]
fn test_save_replaces_previous_snapshot() -> Result<(), StorageError> {
    let mut storage = Storage::new_in_memory()?;
    storage.save_snapshot(&sample_items())?;

    let smaller = vec![node("M", "", NodeKind::Namespace)];
    let meta = storage.save_snapshot(&smaller)?;
    assert_eq!(meta.node_count, 1);
    assert_eq!(meta.link_count, 0);
    assert_eq!(storage.load_snapshot()?, smaller);
    Ok(())
}

#[test]
fn test_load_orders_items_by_kind() -> Result<(), StorageError> {
    let mut storage = Storage::new_in_memory()?;
    let items = vec![
        link("A", "B"),
        node("A", "", NodeKind::Type),
        line("A", "B", vec![]),
        node("B", "", NodeKind::Type),
    ];
    storage.save_snapshot(&items)?;

    let ranks: Vec<_> = storage
        .load_snapshot()?
        .iter()
        .map(ModelItem::load_rank)
        .collect();
    assert_eq!(ranks, vec![0, 0, 1, 2]);
    Ok(())
}

#[test]
fn test_snapshot_meta_is_recorded() -> Result<(), StorageError> {
    let mut storage = Storage::new_in_memory()?;
    assert!(storage.last_snapshot_meta()?.is_none());

    let before = Utc::now();
    let saved = storage.save_snapshot(&sample_items())?;
    let meta = storage.last_snapshot_meta()?.expect("meta after save");
    assert_eq!(meta, saved);
    assert_eq!(
        (meta.node_count, meta.link_count, meta.line_count),
        (3, 1, 1)
    );
    assert!(meta.saved_at >= before);
    Ok(())
}

#[test]
fn test_clear_removes_everything() -> Result<(), StorageError> {
    let mut storage = Storage::new_in_memory()?;
    storage.save_snapshot(&sample_items())?;
    storage.clear()?;
    assert!(storage.load_snapshot()?.is_empty());
    assert!(storage.last_snapshot_meta()?.is_none());
    Ok(())
}

#[test]
fn test_invalid_node_kind_is_reported() -> Result<(), StorageError> {
    let mut storage = Storage::new_in_memory()?;
    storage.save_snapshot(&[node("A", "", NodeKind::Type)])?;
    storage
        .conn
        .execute("UPDATE node_item SET kind = 'gadget' WHERE name = 'A'", [])?;

    match storage.load_snapshot() {
        Err(StorageError::EnumConversion(EnumConversionError::InvalidNodeKind(kind))) => {
            assert_eq!(kind, "gadget");
        }
        other => panic!("expected enum conversion error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_newer_schema_is_rejected() -> Result<(), StorageError> {
    let dir = tempfile::tempdir().map_err(|e| StorageError::Other(e.to_string()))?;
    let path = dir.path().join("model.db");
    {
        let storage = Storage::open(&path)?;
        storage.set_schema_version(SCHEMA_VERSION + 1)?;
    }
    match Storage::open(&path) {
        Err(StorageError::Other(message)) => {
            assert!(message.contains("Unsupported database schema version"))
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("newer schema should be rejected"),
    }
    Ok(())
}

#[test]
fn test_file_storage_survives_reopen() -> Result<(), StorageError> {
    let dir = tempfile::tempdir().map_err(|e| StorageError::Other(e.to_string()))?;
    let path = dir.path().join("model.db");
    let items = sample_items();
    {
        let mut storage = Storage::open(&path)?;
        storage.save_items(&items)?;
    }
    let storage = Storage::open(&path)?;
    assert_eq!(storage.load_items()?, items);
    Ok(())
}

use super::*;

const TABLE_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS node_item (
        name TEXT PRIMARY KEY,
        parent_name TEXT NOT NULL,
        kind TEXT NOT NULL,
        description TEXT NOT NULL,
        x REAL NOT NULL,
        y REAL NOT NULL,
        width REAL NOT NULL,
        height REAL NOT NULL,
        zoom REAL NOT NULL,
        color TEXT,
        background TEXT,
        is_modified INTEGER NOT NULL DEFAULT 0,
        is_hidden INTEGER NOT NULL DEFAULT 0,
        position INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS link_item (
        source TEXT NOT NULL,
        target TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY(source, target)
    )",
    "CREATE TABLE IF NOT EXISTS line_item (
        source TEXT NOT NULL,
        target TEXT NOT NULL,
        points TEXT NOT NULL DEFAULT '[]',
        position INTEGER NOT NULL,
        PRIMARY KEY(source, target)
    )",
    "CREATE TABLE IF NOT EXISTS snapshot_meta (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        saved_at TEXT NOT NULL,
        node_count INTEGER NOT NULL,
        link_count INTEGER NOT NULL,
        line_count INTEGER NOT NULL
    )",
];

const INDEX_STATEMENTS: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_node_item_position ON node_item(position)",
    "CREATE INDEX IF NOT EXISTS idx_node_item_parent ON node_item(parent_name)",
    "CREATE INDEX IF NOT EXISTS idx_link_item_position ON link_item(position)",
    "CREATE INDEX IF NOT EXISTS idx_line_item_position ON line_item(position)",
];

pub(super) fn create_tables(conn: &Connection) -> Result<(), StorageError> {
    for statement in TABLE_STATEMENTS {
        conn.execute(statement, [])?;
    }
    Ok(())
}

pub(super) fn create_indexes(conn: &Connection) -> Result<(), StorageError> {
    for statement in INDEX_STATEMENTS {
        conn.execute(statement, [])?;
    }
    Ok(())
}

pub(super) fn apply_schema_migrations(storage: &Storage) -> Result<(), StorageError> {
    let stored_version = storage.schema_version()?;

    if stored_version > SCHEMA_VERSION {
        return Err(StorageError::Other(format!(
            "Unsupported database schema version: {stored_version} (max supported: {SCHEMA_VERSION})"
        )));
    }

    if stored_version < SCHEMA_VERSION {
        storage.set_schema_version(SCHEMA_VERSION)?;
    }
    Ok(())
}

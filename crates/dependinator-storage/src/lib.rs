use chrono::{DateTime, Utc};
use dependinator_core::{
    EnumConversionError, ItemStore, LineItem, LinkItem, ModelItem, NodeItem, NodeKind, Rect,
};
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

mod row_mapping;
mod schema;

const SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid line points: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid enum value: {0}")]
    EnumConversion(#[from] EnumConversionError),
    #[error("Other error: {0}")]
    Other(String),
}

/// When the stored snapshot was written and what it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub saved_at: DateTime<Utc>,
    pub node_count: usize,
    pub link_count: usize,
    pub line_count: usize,
}

/// SQLite home of a saved model. A save replaces the previous snapshot.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let _ = conn.busy_timeout(Duration::from_millis(2_500));
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let storage = Self { conn };
        storage.init()?;
        Ok(storage)
    }

    pub fn new_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let storage = Self { conn };
        storage.init()?;
        Ok(storage)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM line_item", [])?;
        tx.execute("DELETE FROM link_item", [])?;
        tx.execute("DELETE FROM node_item", [])?;
        tx.execute("DELETE FROM snapshot_meta", [])?;
        tx.commit()?;
        Ok(())
    }

    fn init(&self) -> Result<(), StorageError> {
        schema::create_tables(&self.conn)?;
        schema::create_indexes(&self.conn)?;
        schema::apply_schema_migrations(self)
    }

    fn schema_version(&self) -> Result<u32, StorageError> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(version.max(0) as u32)
    }

    fn set_schema_version(&self, version: u32) -> Result<(), StorageError> {
        self.conn
            .pragma_update(None, "user_version", version.to_string())?;
        Ok(())
    }

    /// Replace the stored snapshot with `items` in one transaction.
    pub fn save_snapshot(&mut self, items: &[ModelItem]) -> Result<SnapshotMeta, StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM line_item", [])?;
        tx.execute("DELETE FROM link_item", [])?;
        tx.execute("DELETE FROM node_item", [])?;

        let (mut node_count, mut link_count, mut line_count) = (0, 0, 0);
        {
            let mut node_stmt = tx.prepare(
                "INSERT INTO node_item (name, parent_name, kind, description, x, y, width, height, zoom, color, background, is_modified, is_hidden, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(name) DO NOTHING",
            )?;
            let mut link_stmt = tx.prepare(
                "INSERT INTO link_item (source, target, position) VALUES (?1, ?2, ?3)
                 ON CONFLICT(source, target) DO NOTHING",
            )?;
            let mut line_stmt = tx.prepare(
                "INSERT INTO line_item (source, target, points, position) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(source, target) DO UPDATE SET points = excluded.points",
            )?;

            for (position, item) in items.iter().enumerate() {
                let position = row_mapping::count_db_value(position);
                match item {
                    ModelItem::Node(node) => {
                        node_count += node_stmt.execute(params![
                            node.name,
                            node.parent_name,
                            node.kind.as_str(),
                            node.description,
                            node.boundary.x,
                            node.boundary.y,
                            node.boundary.width,
                            node.boundary.height,
                            node.zoom,
                            node.color,
                            node.background,
                            node.is_modified,
                            node.is_hidden,
                            position
                        ])?;
                    }
                    ModelItem::Link(link) => {
                        link_count += link_stmt.execute(params![link.source, link.target, position])?;
                    }
                    ModelItem::Line(line) => {
                        let points = serde_json::to_string(&line.points)?;
                        line_count +=
                            line_stmt.execute(params![line.source, line.target, points, position])?;
                    }
                }
            }
        }

        let meta = SnapshotMeta {
            saved_at: Utc::now(),
            node_count,
            link_count,
            line_count,
        };
        tx.execute(
            "INSERT INTO snapshot_meta (id, saved_at, node_count, link_count, line_count)
             VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET saved_at = excluded.saved_at, node_count = excluded.node_count,
                 link_count = excluded.link_count, line_count = excluded.line_count",
            params![
                meta.saved_at.to_rfc3339(),
                row_mapping::count_db_value(meta.node_count),
                row_mapping::count_db_value(meta.link_count),
                row_mapping::count_db_value(meta.line_count)
            ],
        )?;
        tx.commit()?;

        debug!(
            nodes = meta.node_count,
            links = meta.link_count,
            lines = meta.line_count,
            "Saved model snapshot"
        );
        Ok(meta)
    }

    /// The stored snapshot: nodes, then links, then lines, each in saved order.
    pub fn load_snapshot(&self) -> Result<Vec<ModelItem>, StorageError> {
        let mut items = Vec::new();

        let mut stmt = self.conn.prepare(
            "SELECT name, parent_name, kind, description, x, y, width, height, zoom, color, background, is_modified, is_hidden
             FROM node_item ORDER BY position",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            items.push(ModelItem::Node(row_mapping::node_item_from_row(row)?));
        }

        let mut stmt = self
            .conn
            .prepare("SELECT source, target FROM link_item ORDER BY position")?;
        let links = stmt
            .query_map([], row_mapping::link_item_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        items.extend(links.into_iter().map(ModelItem::Link));

        let mut stmt = self
            .conn
            .prepare("SELECT source, target, points FROM line_item ORDER BY position")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            items.push(ModelItem::Line(row_mapping::line_item_from_row(row)?));
        }

        Ok(items)
    }

    /// Metadata of the last saved snapshot, if any.
    pub fn last_snapshot_meta(&self) -> Result<Option<SnapshotMeta>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT saved_at, node_count, link_count, line_count FROM snapshot_meta WHERE id = 1",
        )?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_mapping::snapshot_meta_from_row(row)?)),
            None => Ok(None),
        }
    }
}

impl ItemStore for Storage {
    type Error = StorageError;

    fn save_items(&mut self, items: &[ModelItem]) -> Result<(), StorageError> {
        self.save_snapshot(items).map(|_| ())
    }

    fn load_items(&self) -> Result<Vec<ModelItem>, StorageError> {
        self.load_snapshot()
    }
}

#[cfg(test)]
mod tests;

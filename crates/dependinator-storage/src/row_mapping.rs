use super::*;

pub(super) fn node_item_from_row(row: &Row) -> Result<NodeItem, StorageError> {
    let kind: String = row.get(2)?;
    Ok(NodeItem {
        name: row.get(0)?,
        parent_name: row.get(1)?,
        kind: kind.parse::<NodeKind>()?,
        description: row.get(3)?,
        boundary: Rect::new(row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?),
        zoom: row.get(8)?,
        color: row.get(9)?,
        background: row.get(10)?,
        is_modified: row.get(11)?,
        is_hidden: row.get(12)?,
    })
}

pub(super) fn link_item_from_row(row: &Row) -> rusqlite::Result<LinkItem> {
    Ok(LinkItem {
        source: row.get(0)?,
        target: row.get(1)?,
    })
}

pub(super) fn line_item_from_row(row: &Row) -> Result<LineItem, StorageError> {
    let points: String = row.get(2)?;
    Ok(LineItem {
        source: row.get(0)?,
        target: row.get(1)?,
        points: serde_json::from_str(&points)?,
    })
}

pub(super) fn snapshot_meta_from_row(row: &Row) -> Result<SnapshotMeta, StorageError> {
    let saved_at: String = row.get(0)?;
    let saved_at = DateTime::parse_from_rfc3339(&saved_at)
        .map_err(|e| StorageError::Other(format!("Invalid snapshot time {saved_at}: {e}")))?
        .with_timezone(&Utc);
    Ok(SnapshotMeta {
        saved_at,
        node_count: count_from_db(row.get(1)?),
        link_count: count_from_db(row.get(2)?),
        line_count: count_from_db(row.get(3)?),
    })
}

pub(super) fn count_db_value(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn count_from_db(value: i64) -> usize {
    usize::try_from(value).unwrap_or_default()
}

//! Per-column ordering of tasks.
//!
//! Positions are only meaningful relative to other tasks with the same
//! status. New arrivals go to the bottom of the column; nothing is ever
//! re-indexed, so gaps left by deletions and moves are expected.

use super::Database;
use crate::types::TaskStatus;
use anyhow::Result;
use rusqlite::{Connection, params};

/// ORDER BY for rendering a column. Equal positions (two racing appends)
/// fall back to creation order, then id, so the order is total and stable.
pub const COLUMN_ORDER: &str = "position ASC, created_at ASC, id ASC";

/// Next free slot at the bottom of `status`: max + 1, or 0 for an empty column.
///
/// Always read from current rows; columns change underneath us as tasks are
/// moved in from elsewhere.
pub(crate) fn next_position(conn: &Connection, status: TaskStatus) -> Result<i64> {
    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(position), -1) + 1 FROM tasks WHERE status = ?1",
        params![status.as_str()],
        |row| row.get(0),
    )?;
    Ok(next)
}

/// Resolve the position a task should land on in `status`.
pub(crate) fn resolve_position(
    conn: &Connection,
    status: TaskStatus,
    requested: Option<i64>,
) -> Result<i64> {
    match requested {
        Some(pos) => Ok(pos),
        None => next_position(conn, status),
    }
}

impl Database {
    /// Position a task appended to `status` right now would receive.
    pub fn next_position(&self, status: TaskStatus) -> Result<i64> {
        self.with_conn(|conn| next_position(conn, status))
    }

    /// Task ids of one column in display order.
    pub fn column_order(&self, status: TaskStatus) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id FROM tasks WHERE status = ?1 ORDER BY {}",
                COLUMN_ORDER
            );
            let mut stmt = conn.prepare(&sql)?;
            let ids = stmt
                .query_map(params![status.as_str()], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }
}

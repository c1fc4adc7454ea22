//! Append-only activity log.
//!
//! Rows are never updated or deleted. `task_id` is a weak reference: the
//! events of a deleted task stay queryable by its old id.

use super::{Database, format_ts, parse_ts};
use crate::types::{ActivityEvent, ActivityQuery};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

pub const DEFAULT_ACTIVITY_LIMIT: u32 = 50;
pub const MAX_ACTIVITY_LIMIT: u32 = 500;

fn parse_activity_row(row: &Row) -> rusqlite::Result<ActivityEvent> {
    let created_at: String = row.get("created_at")?;
    Ok(ActivityEvent {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        agent: row.get("agent")?,
        action: row.get("action")?,
        details: row.get("details")?,
        created_at: parse_ts("created_at", &created_at)?,
    })
}

/// Append an event using an existing connection, so callers can log inside
/// the same transaction as the change being recorded.
pub(crate) fn append_activity(
    conn: &Connection,
    task_id: Option<&str>,
    agent: &str,
    action: &str,
    details: Option<&str>,
    at: DateTime<Utc>,
) -> Result<ActivityEvent> {
    let id = Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO activity_log (id, task_id, agent, action, details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, task_id, agent, action, details, format_ts(at)],
    )?;

    Ok(ActivityEvent {
        id,
        task_id: task_id.map(str::to_string),
        agent: agent.to_string(),
        action: action.to_string(),
        details: details.map(str::to_string),
        created_at: at,
    })
}

impl Database {
    /// Record one event.
    pub fn append_activity(
        &self,
        task_id: Option<&str>,
        agent: &str,
        action: &str,
        details: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<ActivityEvent> {
        self.with_conn(|conn| append_activity(conn, task_id, agent, action, details, at))
    }

    /// Newest events first, optionally restricted to one task id.
    pub fn list_activity(&self, query: &ActivityQuery) -> Result<Vec<ActivityEvent>> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
            .clamp(1, MAX_ACTIVITY_LIMIT);

        self.with_conn(|conn| {
            let events = match &query.task_id {
                Some(task_id) => {
                    let mut stmt = conn.prepare(
                        "SELECT * FROM activity_log WHERE task_id = ?1
                         ORDER BY created_at DESC, id DESC LIMIT ?2",
                    )?;
                    stmt.query_map(params![task_id, limit], parse_activity_row)?
                        .collect::<Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT * FROM activity_log
                         ORDER BY created_at DESC, id DESC LIMIT ?1",
                    )?;
                    stmt.query_map(params![limit], parse_activity_row)?
                        .collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(events)
        })
    }
}

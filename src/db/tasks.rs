//! Task CRUD, column moves and the narrow writes used by reconciliation.
//!
//! Every mutation is a single statement or a single transaction keyed by
//! task id. Concurrent writers to different tasks never interfere; two
//! writers racing on the same task resolve as last-writer-wins.

use super::activity::append_activity;
use super::positions::{COLUMN_ORDER, next_position, resolve_position};
use super::{Database, format_ts, parse_opt_ts, parse_ts};
use crate::error::ApiError;
use crate::types::{NewTask, Priority, Task, TaskStatus, TaskUpdate, SYSTEM_ACTOR};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let status: String = row.get("status")?;
    let priority: String = row.get("priority")?;
    let tags_json: Option<String> = row.get("tags")?;
    let agent_done: i64 = row.get("agent_done")?;

    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;

    let status = TaskStatus::from_str(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown task status: {}", status).into(),
        )
    })?;

    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status,
        agent_done: agent_done != 0,
        priority: Priority::parse_lenient(&priority),
        assigned_agent: row.get("assigned_agent")?,
        position: row.get("position")?,
        session_key: row.get("session_key")?,
        run_id: row.get("run_id")?,
        output: row.get("output")?,
        tags: tags_json
            .map(|s| serde_json::from_str(&s).unwrap_or_default())
            .unwrap_or_default(),
        created_at: parse_ts("created_at", &created_at)?,
        updated_at: parse_ts("updated_at", &updated_at)?,
        completed_at: parse_opt_ts("completed_at", completed_at)?,
    })
}

/// Internal helper to get a task using an existing connection (avoids deadlock).
fn get_task_internal(conn: &Connection, task_id: &str) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            "SELECT * FROM tasks WHERE id = ?1",
            params![task_id],
            parse_task_row,
        )
        .optional()?;
    Ok(task)
}

/// Write every mutable column of `task` back to its row.
fn write_task(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET
            title = ?1, description = ?2, status = ?3, priority = ?4,
            assigned_agent = ?5, position = ?6, tags = ?7, output = ?8,
            agent_done = ?9, updated_at = ?10, completed_at = ?11
         WHERE id = ?12",
        params![
            task.title,
            task.description,
            task.status.as_str(),
            task.priority.as_str(),
            task.assigned_agent,
            task.position,
            serde_json::to_string(&task.tags)?,
            task.output,
            task.agent_done as i64,
            format_ts(task.updated_at),
            task.completed_at.map(format_ts),
            task.id,
        ],
    )?;
    Ok(())
}

/// Apply a column change to an in-memory task.
///
/// Handles the bookkeeping shared by moves and updates: position, the
/// `completed_at` stamp on entry into `done`, and clearing `agent_done` when
/// the task leaves its column. Returns the previous status if it changed.
fn apply_status(
    conn: &Connection,
    task: &mut Task,
    status: TaskStatus,
    requested_position: Option<i64>,
    now: DateTime<Utc>,
) -> Result<Option<TaskStatus>> {
    let old = task.status;
    task.position = resolve_position(conn, status, requested_position)?;
    task.updated_at = now;

    if old == status {
        return Ok(None);
    }

    if status == TaskStatus::Done {
        task.completed_at = Some(now);
    }
    task.status = status;
    task.agent_done = false;
    Ok(Some(old))
}

fn log_move(conn: &Connection, task: &Task, from: TaskStatus, now: DateTime<Utc>) -> Result<()> {
    let details = format!("Moved from {} to {}", from, task.status);
    append_activity(conn, Some(&task.id), task.actor(), "moved", Some(&details), now)?;
    Ok(())
}

impl Database {
    /// Create a task at the bottom of its column and log `created`.
    pub fn create_task(&self, input: NewTask) -> Result<Task> {
        let now = super::now();
        let id = Uuid::now_v7().to_string();
        let tags_json = serde_json::to_string(&input.tags)?;
        let completed_at = (input.status == TaskStatus::Done).then_some(now);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let position = next_position(&tx, input.status)?;

            tx.execute(
                "INSERT INTO tasks (
                    id, title, description, status, priority, assigned_agent,
                    created_at, updated_at, completed_at, position, tags, output
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    id,
                    input.title,
                    input.description,
                    input.status.as_str(),
                    input.priority.as_str(),
                    input.assigned_agent,
                    format_ts(now),
                    format_ts(now),
                    completed_at.map(format_ts),
                    position,
                    tags_json,
                    input.output,
                ],
            )?;

            let details = format!("Created task: {}", input.title);
            append_activity(
                &tx,
                Some(&id),
                input.assigned_agent.as_deref().unwrap_or(SYSTEM_ACTOR),
                "created",
                Some(&details),
                now,
            )?;

            let task = get_task_internal(&tx, &id)?
                .ok_or_else(|| anyhow!("task {} vanished after insert", id))?;
            tx.commit()?;
            Ok(task)
        })
    }

    pub fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        self.with_conn(|conn| get_task_internal(conn, task_id))
    }

    /// List tasks in column order, optionally for a single column.
    pub fn list_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let tasks = match status {
                Some(status) => {
                    let sql = format!(
                        "SELECT * FROM tasks WHERE status = ?1 ORDER BY {}",
                        COLUMN_ORDER
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(params![status.as_str()], parse_task_row)?
                        .collect::<Result<Vec<_>, _>>()?
                }
                None => {
                    let sql = format!("SELECT * FROM tasks ORDER BY {}", COLUMN_ORDER);
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map([], parse_task_row)?
                        .collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(tasks)
        })
    }

    /// Move a task to `status`, at `position` or the bottom of the column.
    ///
    /// Logs `moved` only when the status actually changes; repositioning
    /// inside a column is silent. Returns `None` if the task does not exist.
    pub fn move_task(
        &self,
        task_id: &str,
        status: TaskStatus,
        position: Option<i64>,
    ) -> Result<Option<Task>> {
        let now = super::now();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(mut task) = get_task_internal(&tx, task_id)? else {
                return Ok(None);
            };

            let changed_from = apply_status(&tx, &mut task, status, position, now)?;
            write_task(&tx, &task)?;
            if let Some(from) = changed_from {
                log_move(&tx, &task, from, now)?;
            }

            tx.commit()?;
            Ok(Some(task))
        })
    }

    /// Merge the given fields into a task.
    ///
    /// A status change behaves like a move to the bottom of the new column.
    pub fn update_task(&self, task_id: &str, update: TaskUpdate) -> Result<Option<Task>> {
        let now = super::now();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(mut task) = get_task_internal(&tx, task_id)? else {
                return Ok(None);
            };

            if let Some(title) = update.title {
                task.title = title;
            }
            if let Some(description) = update.description {
                task.description = Some(description);
            }
            if let Some(priority) = update.priority {
                task.priority = priority;
            }
            if let Some(agent) = update.assigned_agent {
                task.assigned_agent = Some(agent);
            }
            if let Some(tags) = update.tags {
                task.tags = tags;
            }
            if let Some(output) = update.output {
                task.output = Some(output);
            }
            task.updated_at = now;

            let changed_from = match update.status {
                Some(status) if status != task.status => {
                    apply_status(&tx, &mut task, status, None, now)?
                }
                _ => None,
            };

            write_task(&tx, &task)?;
            if let Some(from) = changed_from {
                log_move(&tx, &task, from, now)?;
            }

            tx.commit()?;
            Ok(Some(task))
        })
    }

    /// Delete a task and log `deleted` against its (now dangling) id.
    pub fn delete_task(&self, task_id: &str) -> Result<Option<Task>> {
        let now = super::now();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(task) = get_task_internal(&tx, task_id)? else {
                return Ok(None);
            };

            tx.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
            let details = format!("Deleted task: {}", task.title);
            append_activity(&tx, Some(task_id), SYSTEM_ACTOR, "deleted", Some(&details), now)?;

            tx.commit()?;
            Ok(Some(task))
        })
    }

    /// Record a successful spawn: the task joins `in-progress` with its session handles.
    ///
    /// The backlog check is repeated under the transaction: if another
    /// dispatch or a move got there while the spawn was in flight, this
    /// fails with `InvalidState` and the row is left alone.
    pub fn record_dispatch(
        &self,
        task_id: &str,
        agent_id: &str,
        session_key: &str,
        run_id: &str,
    ) -> Result<Option<Task>> {
        let now = super::now();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(mut task) = get_task_internal(&tx, task_id)? else {
                return Ok(None);
            };
            if !task.status.allows_dispatch() {
                return Err(ApiError::invalid_state(format!(
                    "Task {} is {}; only backlog tasks can be dispatched",
                    task_id, task.status
                ))
                .into());
            }

            apply_status(&tx, &mut task, TaskStatus::InProgress, None, now)?;
            task.agent_done = false;
            task.assigned_agent = Some(agent_id.to_string());
            write_task(&tx, &task)?;
            tx.execute(
                "UPDATE tasks SET session_key = ?1, run_id = ?2 WHERE id = ?3",
                params![session_key, run_id, task_id],
            )?;
            task.session_key = Some(session_key.to_string());
            task.run_id = Some(run_id.to_string());

            let details = format!("Dispatched to {} agent (session: {})", agent_id, session_key);
            append_activity(&tx, Some(task_id), agent_id, "dispatched", Some(&details), now)?;

            tx.commit()?;
            Ok(Some(task))
        })
    }

    /// Bump `updated_at`, e.g. after a chat message reached the session.
    pub fn touch_task(&self, task_id: &str, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE tasks SET updated_at = ?1 WHERE id = ?2",
                params![format_ts(at), task_id],
            )?;
            Ok(n > 0)
        })
    }

    /// Reconciliation candidates: in progress, dispatched, not yet flagged.
    ///
    /// This predicate is also the idempotency guard, so it is evaluated
    /// fresh on every run.
    pub fn list_in_progress_with_session(&self) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT * FROM tasks
                 WHERE status = 'in-progress' AND session_key IS NOT NULL AND agent_done = 0
                 ORDER BY {}",
                COLUMN_ORDER
            );
            let mut stmt = conn.prepare(&sql)?;
            let tasks = stmt
                .query_map([], parse_task_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
    }

    /// Close out a finished task: `done`, output captured, `completed_at` stamped.
    ///
    /// Only applies while the task is still an unflagged candidate; returns
    /// false if someone else got there first.
    pub fn update_task_completion(
        &self,
        task_id: &str,
        output: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let position = next_position(conn, TaskStatus::Done)?;
            let n = conn.execute(
                "UPDATE tasks SET
                    status = 'done', output = ?1, completed_at = ?2, updated_at = ?2,
                    position = ?3, agent_done = 0
                 WHERE id = ?4 AND status = 'in-progress' AND agent_done = 0",
                params![output, format_ts(at), position, task_id],
            )?;
            Ok(n > 0)
        })
    }

    /// Mark a task's session as finished without moving the card.
    ///
    /// Same guard as [`Database::update_task_completion`].
    pub fn flag_agent_done(&self, task_id: &str, output: &str, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE tasks SET agent_done = 1, output = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = 'in-progress' AND agent_done = 0",
                params![output, format_ts(at), task_id],
            )?;
            Ok(n > 0)
        })
    }
}

//! Human-in-the-loop approval queue.

use super::activity::append_activity;
use super::{Database, format_ts, parse_opt_ts, parse_ts};
use crate::error::ApiError;
use crate::types::{HitlRequest, HitlResponse, HitlStatus, NewHitlRequest, Priority, HUMAN_ACTOR};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

/// Urgent first, then high, medium, low; newest first within a priority.
const QUEUE_ORDER: &str = "CASE priority
        WHEN 'urgent' THEN 0
        WHEN 'high' THEN 1
        WHEN 'medium' THEN 2
        WHEN 'low' THEN 3
        ELSE 2
    END ASC, created_at DESC, id DESC";

fn parse_hitl_row(row: &Row) -> rusqlite::Result<HitlRequest> {
    let status: String = row.get("status")?;
    let priority: String = row.get("priority")?;
    let created_at: String = row.get("created_at")?;
    let resolved_at: Option<String> = row.get("resolved_at")?;

    Ok(HitlRequest {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        agent: row.get("agent")?,
        request_type: row.get("request_type")?,
        context: row.get("context")?,
        status: HitlStatus::from_str(&status).unwrap_or_default(),
        response: row.get("response")?,
        priority: Priority::parse_lenient(&priority),
        created_at: parse_ts("created_at", &created_at)?,
        resolved_at: parse_opt_ts("resolved_at", resolved_at)?,
    })
}

fn get_hitl_internal(conn: &Connection, request_id: &str) -> Result<Option<HitlRequest>> {
    let request = conn
        .query_row(
            "SELECT * FROM hitl_requests WHERE id = ?1",
            params![request_id],
            parse_hitl_row,
        )
        .optional()?;
    Ok(request)
}

impl Database {
    /// Queue a new pending request.
    pub fn create_hitl_request(&self, input: NewHitlRequest) -> Result<HitlRequest> {
        let id = Uuid::now_v7().to_string();
        let now = super::now();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO hitl_requests
                    (id, task_id, agent, request_type, context, status, priority, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7)",
                params![
                    id,
                    input.task_id,
                    input.agent,
                    input.request_type,
                    input.context,
                    input.priority.as_str(),
                    format_ts(now),
                ],
            )?;
            get_hitl_internal(conn, &id)?.ok_or_else(|| anyhow!("HITL request {} vanished", id))
        })
    }

    pub fn get_hitl_request(&self, request_id: &str) -> Result<Option<HitlRequest>> {
        self.with_conn(|conn| get_hitl_internal(conn, request_id))
    }

    /// The queue in review order, optionally restricted to one status.
    pub fn list_hitl_requests(&self, status: Option<HitlStatus>) -> Result<Vec<HitlRequest>> {
        self.with_conn(|conn| {
            let requests = match status {
                Some(status) => {
                    let sql = format!(
                        "SELECT * FROM hitl_requests WHERE status = ?1 ORDER BY {}",
                        QUEUE_ORDER
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(params![status.as_str()], parse_hitl_row)?
                        .collect::<Result<Vec<_>, _>>()?
                }
                None => {
                    let sql = format!("SELECT * FROM hitl_requests ORDER BY {}", QUEUE_ORDER);
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map([], parse_hitl_row)?
                        .collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(requests)
        })
    }

    /// Resolve a pending request. One-shot: a resolved request cannot be
    /// answered again, so `resolved_at` is written exactly once.
    pub fn respond_hitl_request(
        &self,
        request_id: &str,
        answer: HitlResponse,
    ) -> Result<HitlRequest> {
        if answer.status == HitlStatus::Pending {
            return Err(ApiError::invalid_value("status", "response status cannot be pending").into());
        }

        let now = super::now();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let existing = get_hitl_internal(&tx, request_id)?
                .ok_or_else(|| ApiError::hitl_not_found(request_id))?;

            if existing.status != HitlStatus::Pending {
                return Err(ApiError::invalid_state(format!(
                    "HITL request {} already {}",
                    request_id,
                    existing.status.as_str()
                ))
                .into());
            }

            tx.execute(
                "UPDATE hitl_requests SET status = ?1, response = ?2, resolved_at = ?3
                 WHERE id = ?4 AND status = 'pending'",
                params![answer.status.as_str(), answer.response, format_ts(now), request_id],
            )?;

            let details = format!(
                "HITL request {}: {}",
                answer.status.as_str(),
                existing.request_type
            );
            append_activity(
                &tx,
                existing.task_id.as_deref(),
                HUMAN_ACTOR,
                answer.status.as_str(),
                Some(&details),
                now,
            )?;

            let updated = get_hitl_internal(&tx, request_id)?
                .ok_or_else(|| ApiError::hitl_not_found(request_id))?;
            tx.commit()?;
            Ok(updated)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: &str, priority: Priority) -> NewHitlRequest {
        NewHitlRequest {
            task_id: None,
            agent: Some("coder".into()),
            request_type: kind.into(),
            context: None,
            priority,
        }
    }

    #[test]
    fn queue_orders_by_priority_then_recency() {
        let db = Database::open_in_memory().unwrap();
        let low = db.create_hitl_request(request("low", Priority::Low)).unwrap();
        let urgent = db.create_hitl_request(request("urgent", Priority::Urgent)).unwrap();
        let high_old = db.create_hitl_request(request("high-old", Priority::High)).unwrap();
        let high_new = db.create_hitl_request(request("high-new", Priority::High)).unwrap();

        let ids: Vec<_> = db
            .list_hitl_requests(None)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![urgent.id, high_new.id, high_old.id, low.id]);
    }

    #[test]
    fn new_requests_start_pending() {
        let db = Database::open_in_memory().unwrap();
        let req = db.create_hitl_request(request("deploy", Priority::Medium)).unwrap();
        assert_eq!(req.status, HitlStatus::Pending);
        assert!(req.resolved_at.is_none());
        assert!(req.response.is_none());
    }
}

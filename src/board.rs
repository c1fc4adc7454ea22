//! Board operations: the task lifecycle plus the gateway-backed actions
//! (dispatch, chat, session view, agent roster).
//!
//! Everything here returns [`ApiResult`] so the REST layer can hand errors
//! straight to the client.

use crate::config::GatewayConfig;
use crate::db::Database;
use crate::error::{ApiError, ApiResult};
use crate::gateway::{Gateway, HistoryMessage, SpawnRequest, SpawnResult};
use crate::reconcile::SessionState;
use crate::types::{
    ActivityEvent, ActivityQuery, HitlRequest, HitlResponse, HitlStatus, MoveRequest, NewActivity,
    NewHitlRequest, NewTask, Task, TaskStatus, TaskUpdate,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Messages returned by the session view.
pub const SESSION_VIEW_LIMIT: usize = 50;

/// Messages returned by the chat view.
pub const CHAT_HISTORY_LIMIT: usize = 100;

/// Result of a successful dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub task: Task,
    pub session: SpawnResult,
}

/// Transcript of a task's session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_key: String,
    pub messages: Vec<HistoryMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Executing,
    Idle,
}

/// An agent joined with its live sessions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub id: String,
    pub name: String,
    pub model: String,
    pub status: AgentStatus,
    pub session_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
}

/// Task brief handed to a freshly spawned agent.
pub fn build_brief(task: &Task) -> String {
    let details = task
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or("No additional details.");

    format!(
        "You are working on a task for the Mission Control board.\n\n\
         Task: {}\n\n\
         Details:\n{}\n\n\
         The user will chat with you to provide more details and iterate. \
         Ask clarifying questions if needed. When you make changes to code, \
         tell the user what you did.",
        task.title, details
    )
}

#[derive(Clone)]
pub struct Board {
    db: Database,
    gateway: Arc<dyn Gateway>,
    gateway_config: GatewayConfig,
}

impl Board {
    pub fn new(db: Database, gateway: Arc<dyn Gateway>, gateway_config: GatewayConfig) -> Self {
        Self {
            db,
            gateway,
            gateway_config,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    fn require_task(&self, task_id: &str) -> ApiResult<Task> {
        self.db
            .get_task(task_id)?
            .ok_or_else(|| ApiError::task_not_found(task_id))
    }

    pub fn create_task(&self, input: NewTask) -> ApiResult<Task> {
        if input.title.trim().is_empty() {
            return Err(ApiError::missing_field("title"));
        }
        let task = self.db.create_task(input)?;
        info!(task_id = %task.id, status = %task.status, "Task created");
        Ok(task)
    }

    pub fn get_task(&self, task_id: &str) -> ApiResult<Task> {
        self.require_task(task_id)
    }

    pub fn list_tasks(&self, status: Option<TaskStatus>) -> ApiResult<Vec<Task>> {
        Ok(self.db.list_tasks(status)?)
    }

    pub fn update_task(&self, task_id: &str, update: TaskUpdate) -> ApiResult<Task> {
        if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ApiError::invalid_value("title", "title must not be empty"));
        }
        self.db
            .update_task(task_id, update)?
            .ok_or_else(|| ApiError::task_not_found(task_id))
    }

    pub fn move_task(&self, task_id: &str, request: MoveRequest) -> ApiResult<Task> {
        self.db
            .move_task(task_id, request.status, request.position)?
            .ok_or_else(|| ApiError::task_not_found(task_id))
    }

    pub fn delete_task(&self, task_id: &str) -> ApiResult<Task> {
        let task = self
            .db
            .delete_task(task_id)?
            .ok_or_else(|| ApiError::task_not_found(task_id))?;
        info!(task_id, "Task deleted");
        Ok(task)
    }

    /// Spawn a gateway session for a backlog task and move it to in-progress.
    ///
    /// On gateway failure the task is left exactly as it was.
    pub async fn dispatch(&self, task_id: &str, agent_id: Option<String>) -> ApiResult<DispatchOutcome> {
        let task = self.require_task(task_id)?;
        if !task.status.allows_dispatch() {
            return Err(ApiError::invalid_state(format!(
                "Task {} is {}; only backlog tasks can be dispatched",
                task_id, task.status
            )));
        }

        let agent_id = agent_id
            .filter(|a| !a.trim().is_empty())
            .or_else(|| task.assigned_agent.clone())
            .unwrap_or_else(|| self.gateway_config.default_agent.clone());

        let request = SpawnRequest {
            task: build_brief(&task),
            agent_id: agent_id.clone(),
            label: format!("MC: {}", task.title),
            model: self.gateway_config.model.clone(),
            thinking: self.gateway_config.thinking.clone(),
        };

        let session = self
            .gateway
            .spawn_session(request)
            .await
            .map_err(|e| ApiError::gateway("Failed to dispatch", &e))?;

        let recorded = self
            .db
            .record_dispatch(task_id, &agent_id, &session.child_session_key, &session.run_id)
            .map_err(ApiError::from)
            .and_then(|task| task.ok_or_else(|| ApiError::task_not_found(task_id)));
        let task = match recorded {
            Ok(task) => task,
            Err(e) => {
                warn!(
                    task_id,
                    session_key = %session.child_session_key,
                    error = %e,
                    "Spawned session not recorded; it is not tracked by the board"
                );
                return Err(e);
            }
        };

        info!(task_id, agent_id = %agent_id, session_key = %session.child_session_key, "Task dispatched");
        Ok(DispatchOutcome { task, session })
    }

    /// Forward a user message to the task's session and return the reply.
    pub async fn chat(&self, task_id: &str, message: &str) -> ApiResult<String> {
        let task = self.require_task(task_id)?;
        let session_key = task
            .session_key
            .as_deref()
            .ok_or_else(|| ApiError::no_session(task_id))?;
        if message.trim().is_empty() {
            return Err(ApiError::missing_field("message"));
        }

        let reply = self
            .gateway
            .send_message(session_key, message)
            .await
            .map_err(|e| ApiError::gateway("Failed to send message", &e))?;

        self.db.touch_task(task_id, crate::db::now())?;
        Ok(reply)
    }

    /// Chat transcript; a task that was never dispatched has an empty one.
    pub async fn chat_history(&self, task_id: &str) -> ApiResult<Vec<HistoryMessage>> {
        let task = self.require_task(task_id)?;
        let Some(session_key) = task.session_key.as_deref() else {
            return Ok(Vec::new());
        };
        self.gateway
            .get_history(session_key, CHAT_HISTORY_LIMIT)
            .await
            .map_err(|e| ApiError::gateway("Failed to fetch chat", &e))
    }

    pub async fn session_view(&self, task_id: &str) -> ApiResult<SessionView> {
        let task = self.require_task(task_id)?;
        let session_key = task
            .session_key
            .ok_or_else(|| ApiError::no_session(task_id))?;
        let messages = self
            .gateway
            .get_history(&session_key, SESSION_VIEW_LIMIT)
            .await
            .map_err(|e| ApiError::gateway("Failed to fetch session", &e))?;
        Ok(SessionView {
            session_key,
            messages,
        })
    }

    /// Known agents with their live session counts.
    pub async fn agents(&self) -> ApiResult<Vec<AgentSummary>> {
        let (agents, sessions) = tokio::try_join!(
            self.gateway.list_agents(),
            self.gateway.list_sessions()
        )
        .map_err(|e| ApiError::gateway("Failed to list agents", &e))?;

        let mut live: HashMap<&str, (usize, Option<&str>)> = HashMap::new();
        for session in &sessions {
            if SessionState::classify(Some(session)) == SessionState::Ended {
                continue;
            }
            let Some(agent_id) = session.agent_id.as_deref() else {
                continue;
            };
            let entry = live.entry(agent_id).or_default();
            entry.0 += 1;
            if let Some(label) = session.label.as_deref() {
                entry.1 = Some(label);
            }
        }

        let roster = agents
            .into_iter()
            .map(|agent| {
                let (session_count, current_task) =
                    live.get(agent.id.as_str()).copied().unwrap_or_default();
                AgentSummary {
                    name: agent.name.unwrap_or_else(|| agent.id.clone()),
                    model: agent
                        .model
                        .unwrap_or_else(|| self.gateway_config.model.clone()),
                    status: if session_count > 0 {
                        AgentStatus::Executing
                    } else {
                        AgentStatus::Idle
                    },
                    session_count,
                    current_task: current_task.map(str::to_string),
                    id: agent.id,
                }
            })
            .collect();
        Ok(roster)
    }

    pub fn record_activity(&self, input: NewActivity) -> ApiResult<ActivityEvent> {
        if input.action.trim().is_empty() {
            return Err(ApiError::missing_field("action"));
        }
        Ok(self.db.append_activity(
            input.task_id.as_deref(),
            &input.agent,
            &input.action,
            input.details.as_deref(),
            crate::db::now(),
        )?)
    }

    pub fn list_activity(&self, query: &ActivityQuery) -> ApiResult<Vec<ActivityEvent>> {
        Ok(self.db.list_activity(query)?)
    }

    pub fn create_hitl(&self, input: NewHitlRequest) -> ApiResult<HitlRequest> {
        if input.request_type.trim().is_empty() {
            return Err(ApiError::missing_field("request_type"));
        }
        Ok(self.db.create_hitl_request(input)?)
    }

    pub fn list_hitl(&self, status: Option<HitlStatus>) -> ApiResult<Vec<HitlRequest>> {
        Ok(self.db.list_hitl_requests(status)?)
    }

    pub fn get_hitl(&self, request_id: &str) -> ApiResult<HitlRequest> {
        self.db
            .get_hitl_request(request_id)?
            .ok_or_else(|| ApiError::hitl_not_found(request_id))
    }

    pub fn respond_hitl(&self, request_id: &str, answer: HitlResponse) -> ApiResult<HitlRequest> {
        let request = self.db.respond_hitl_request(request_id, answer)?;
        info!(request_id, status = request.status.as_str(), "HITL request resolved");
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewTask;

    #[test]
    fn brief_includes_title_and_details() {
        let db = Database::open_in_memory().unwrap();
        let mut input = NewTask::titled("Fix login");
        input.description = Some("Users get a 500 on submit".into());
        let task = db.create_task(input).unwrap();

        let brief = build_brief(&task);
        assert!(brief.contains("Task: Fix login"));
        assert!(brief.contains("Users get a 500 on submit"));
    }

    #[test]
    fn brief_without_description_says_so() {
        let db = Database::open_in_memory().unwrap();
        let task = db.create_task(NewTask::titled("Tidy up")).unwrap();
        assert!(build_brief(&task).contains("No additional details."));
    }
}

//! Core types for the mission-control board.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kanban column a task lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Backlog,
    InProgress,
    PendingApproval,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Backlog,
        TaskStatus::InProgress,
        TaskStatus::PendingApproval,
        TaskStatus::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::PendingApproval => "pending-approval",
            TaskStatus::Done => "done",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "backlog" => Some(TaskStatus::Backlog),
            "in-progress" => Some(TaskStatus::InProgress),
            "pending-approval" => Some(TaskStatus::PendingApproval),
            "done" => Some(TaskStatus::Done),
            _ => None,
        }
    }

    /// Whether a task in this column may be handed to an agent.
    pub fn allows_dispatch(&self) -> bool {
        matches!(self, TaskStatus::Backlog)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority shared by tasks and HITL requests.
///
/// Variant order is significant: `Ord` ranks `Urgent` highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    /// Parse a stored priority, falling back to medium for unknown values.
    pub fn parse_lenient(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "low" => Priority::Low,
            "high" => Priority::High,
            "urgent" => Priority::Urgent,
            _ => Priority::Medium,
        }
    }
}

/// A card on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    /// The gateway session looks finished; a human still has to move the card.
    pub agent_done: bool,
    pub priority: Priority,
    pub assigned_agent: Option<String>,
    pub position: i64,
    pub session_key: Option<String>,
    pub run_id: Option<String>,
    pub output: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Actor label used when this task's agent writes to the activity log.
    pub fn actor(&self) -> &str {
        self.assigned_agent.as_deref().unwrap_or(SYSTEM_ACTOR)
    }
}

/// Actor recorded for engine- and server-originated activity.
pub const SYSTEM_ACTOR: &str = "system";

/// Actor recorded for HITL decisions.
pub const HUMAN_ACTOR: &str = "human";

/// Input for creating a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub assigned_agent: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub output: Option<String>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Partial update of a task; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub assigned_agent: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub output: Option<String>,
}

/// Drag-and-drop move. Without a position the task goes to the bottom of `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRequest {
    pub status: TaskStatus,
    #[serde(default)]
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchRequest {
    #[serde(default, alias = "agentId")]
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

/// Immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: String,
    /// Weak back-reference; the task may no longer exist.
    pub task_id: Option<String>,
    pub agent: String,
    pub action: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Externally submitted activity entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewActivity {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default = "default_actor")]
    pub agent: String,
    pub action: String,
    #[serde(default)]
    pub details: Option<String>,
}

fn default_actor() -> String {
    SYSTEM_ACTOR.to_string()
}

/// Filter for reading the activity log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityQuery {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Review state of a HITL request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitlStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Modified,
}

impl HitlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HitlStatus::Pending => "pending",
            HitlStatus::Approved => "approved",
            HitlStatus::Rejected => "rejected",
            HitlStatus::Modified => "modified",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(HitlStatus::Pending),
            "approved" => Some(HitlStatus::Approved),
            "rejected" => Some(HitlStatus::Rejected),
            "modified" => Some(HitlStatus::Modified),
            _ => None,
        }
    }
}

/// A decision point waiting for a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitlRequest {
    pub id: String,
    pub task_id: Option<String>,
    pub agent: Option<String>,
    pub request_type: String,
    pub context: Option<String>,
    pub status: HitlStatus,
    pub response: Option<String>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHitlRequest {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
    pub request_type: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

/// Human verdict on a pending request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlResponse {
    pub status: HitlStatus,
    #[serde(default)]
    pub response: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_wire_names() {
        for status in TaskStatus::ALL {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert_eq!(TaskStatus::from_str("working"), None);
    }

    #[test]
    fn only_backlog_allows_dispatch() {
        assert!(TaskStatus::Backlog.allows_dispatch());
        assert!(!TaskStatus::InProgress.allows_dispatch());
        assert!(!TaskStatus::PendingApproval.allows_dispatch());
        assert!(!TaskStatus::Done.allows_dispatch());
    }

    #[test]
    fn priority_orders_urgent_highest() {
        let mut ps = vec![Priority::Medium, Priority::Urgent, Priority::Low, Priority::High];
        ps.sort();
        assert_eq!(
            ps,
            vec![Priority::Low, Priority::Medium, Priority::High, Priority::Urgent]
        );
        assert_eq!(Priority::parse_lenient("URGENT"), Priority::Urgent);
        assert_eq!(Priority::parse_lenient("whatever"), Priority::Medium);
    }

    #[test]
    fn new_task_body_applies_defaults() {
        let task: NewTask = serde_json::from_str(r#"{"title": "Write docs"}"#).unwrap();
        assert_eq!(task.status, TaskStatus::Backlog);
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.tags.is_empty());
    }

    #[test]
    fn dispatch_body_accepts_camel_case_agent() {
        let req: DispatchRequest = serde_json::from_str(r#"{"agentId": "reviewer"}"#).unwrap();
        assert_eq!(req.agent_id.as_deref(), Some("reviewer"));
    }
}

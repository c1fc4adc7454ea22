//! Boundary to the external agent-orchestration gateway.
//!
//! The gateway owns session lifecycle. We only ever spawn sessions, list
//! them, read their history, send them messages, and list agents; every
//! answer is best-effort and may lag reality.

mod client;
mod error;

pub use client::HttpGateway;
pub use error::GatewayError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Parameters for starting a sub-agent session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnRequest {
    /// Full brief handed to the agent.
    pub task: String,
    pub agent_id: String,
    pub label: String,
    pub model: String,
    pub thinking: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnResult {
    #[serde(default)]
    pub status: String,
    pub child_session_key: String,
    #[serde(default)]
    pub run_id: String,
}

/// One entry of the gateway's session listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_key: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl SessionInfo {
    pub fn new(session_key: impl Into<String>) -> Self {
        Self {
            session_key: session_key.into(),
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }
}

/// A message in a session transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    #[serde(default, deserialize_with = "content_text")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Message content arrives either as a string or as a list of
/// `{"type": "text", "text": ...}` blocks; blocks are joined with newlines.
fn content_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let text = match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    };
    Ok(text)
}

impl HistoryMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: None,
        }
    }
}

/// An agent type the gateway can run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Operations the board needs from the gateway.
///
/// Implementations must bound every call with a timeout; a timed-out call
/// is reported as an error, never as an empty answer.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn spawn_session(&self, request: SpawnRequest) -> Result<SpawnResult, GatewayError>;

    /// Best-effort listing; may omit sessions that are still registering.
    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, GatewayError>;

    /// Last `limit` messages of a session, oldest first.
    async fn get_history(
        &self,
        session_key: &str,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, GatewayError>;

    async fn send_message(&self, session_key: &str, message: &str) -> Result<String, GatewayError>;

    async fn list_agents(&self) -> Result<Vec<AgentInfo>, GatewayError>;
}

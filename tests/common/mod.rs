//! Shared fixtures: an in-memory database and a scripted gateway.

#![allow(dead_code)]

use async_trait::async_trait;
use mission_control::board::Board;
use mission_control::config::{CompletionPolicy, GatewayConfig, ReconcileConfig};
use mission_control::db::Database;
use mission_control::gateway::{
    AgentInfo, Gateway, GatewayError, HistoryMessage, SessionInfo, SpawnRequest, SpawnResult,
};
use mission_control::reconcile::ReconciliationEngine;
use mission_control::types::{NewTask, Task};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

#[derive(Default)]
struct FakeState {
    sessions: Vec<SessionInfo>,
    histories: HashMap<String, Vec<HistoryMessage>>,
    agents: Vec<AgentInfo>,
    fail_listing: bool,
    fail_spawn: bool,
    yield_on_spawn: bool,
    fail_history: HashSet<String>,
    spawned: Vec<SpawnRequest>,
    sent: Vec<(String, String)>,
    list_calls: usize,
    history_calls: usize,
}

/// Gateway whose answers are set by the test.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake gateway lock poisoned")
    }

    pub fn set_sessions(&self, sessions: Vec<SessionInfo>) {
        self.state().sessions = sessions;
    }

    pub fn set_history(&self, session_key: &str, messages: Vec<HistoryMessage>) {
        self.state()
            .histories
            .insert(session_key.to_string(), messages);
    }

    pub fn set_agents(&self, agents: Vec<AgentInfo>) {
        self.state().agents = agents;
    }

    pub fn fail_listing(&self, fail: bool) {
        self.state().fail_listing = fail;
    }

    pub fn fail_spawn(&self, fail: bool) {
        self.state().fail_spawn = fail;
    }

    /// Make `spawn_session` suspend once before answering, so concurrent
    /// dispatches interleave at the await point.
    pub fn yield_on_spawn(&self, enabled: bool) {
        self.state().yield_on_spawn = enabled;
    }

    pub fn fail_history_for(&self, session_key: &str) {
        self.state().fail_history.insert(session_key.to_string());
    }

    pub fn spawned(&self) -> Vec<SpawnRequest> {
        self.state().spawned.clone()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.state().sent.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    pub fn history_calls(&self) -> usize {
        self.state().history_calls
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn spawn_session(&self, request: SpawnRequest) -> Result<SpawnResult, GatewayError> {
        let suspend = self.state().yield_on_spawn;
        if suspend {
            tokio::task::yield_now().await;
        }
        let mut state = self.state();
        if state.fail_spawn {
            return Err(GatewayError::Api {
                status: 503,
                message: "no capacity".into(),
            });
        }
        let n = state.spawned.len() + 1;
        let result = SpawnResult {
            status: "accepted".into(),
            child_session_key: format!("agent:{}:subagent:{}", request.agent_id, n),
            run_id: format!("run-{}", n),
        };
        state.spawned.push(request);
        Ok(result)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, GatewayError> {
        let mut state = self.state();
        state.list_calls += 1;
        if state.fail_listing {
            return Err(GatewayError::Timeout);
        }
        Ok(state.sessions.clone())
    }

    async fn get_history(
        &self,
        session_key: &str,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, GatewayError> {
        let mut state = self.state();
        state.history_calls += 1;
        if state.fail_history.contains(session_key) {
            return Err(GatewayError::Remote("session not found".into()));
        }
        let history = state.histories.get(session_key).cloned().unwrap_or_default();
        let skip = history.len().saturating_sub(limit);
        Ok(history.into_iter().skip(skip).collect())
    }

    async fn send_message(&self, session_key: &str, message: &str) -> Result<String, GatewayError> {
        self.state()
            .sent
            .push((session_key.to_string(), message.to_string()));
        Ok(format!("ack: {}", message))
    }

    async fn list_agents(&self) -> Result<Vec<AgentInfo>, GatewayError> {
        Ok(self.state().agents.clone())
    }
}

pub fn reconcile_config(
    policy: CompletionPolicy,
    grace_secs: u64,
    confirm_secs: u64,
) -> ReconcileConfig {
    ReconcileConfig {
        grace_window_secs: grace_secs,
        vanish_confirm_secs: confirm_secs,
        completion_policy: policy,
        ..ReconcileConfig::default()
    }
}

pub fn engine(db: &Database, gateway: &Arc<FakeGateway>, config: ReconcileConfig) -> ReconciliationEngine {
    let gateway: Arc<dyn Gateway> = gateway.clone();
    ReconciliationEngine::new(db.clone(), gateway, config)
}

pub fn board(db: &Database, gateway: &Arc<FakeGateway>) -> Board {
    let gateway: Arc<dyn Gateway> = gateway.clone();
    Board::new(db.clone(), gateway, GatewayConfig::default())
}

/// A task already in progress on `session_key`, dispatched just now.
pub fn dispatched_task(db: &Database, title: &str, session_key: &str) -> Task {
    let task = db
        .create_task(NewTask::titled(title))
        .expect("Failed to create task");
    db.record_dispatch(&task.id, "coder", session_key, "run-1")
        .expect("Failed to record dispatch")
        .expect("task exists")
}

pub fn actions_for(db: &Database, task_id: &str) -> Vec<String> {
    use mission_control::types::ActivityQuery;
    db.list_activity(&ActivityQuery {
        task_id: Some(task_id.to_string()),
        limit: None,
    })
    .expect("Failed to list activity")
    .into_iter()
    .map(|e| e.action)
    .collect()
}

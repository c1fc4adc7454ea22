//! Reconciliation of in-progress tasks against gateway sessions.
//!
//! The gateway's session listing is best-effort: a freshly spawned session
//! may not appear yet, and an ended one may linger. A run therefore treats
//! "missing" as weak evidence, acted on only after the task has been idle
//! past the grace window, while an explicit terminal state is acted on
//! immediately.
//!
//! Every run re-reads its candidates from the database, and the final write
//! is guarded in SQL, so overlapping runs never finalize a task twice.

use crate::config::{CompletionPolicy, ReconcileConfig};
use crate::db::Database;
use crate::gateway::{Gateway, HistoryMessage, SessionInfo};
use crate::types::Task;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Stored as output when the session left no assistant message.
pub const NO_OUTPUT_PLACEHOLDER: &str = "(no output captured)";

/// Session states the gateway uses for a session that will not continue.
const TERMINAL_STATES: [&str; 3] = ["ended", "completed", "archived"];

/// What the session listing says about a task's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Listed with a terminal `state` or `status`.
    Ended,
    /// Not in the listing at all.
    Missing,
    /// Listed and not terminal.
    Active,
}

impl SessionState {
    pub fn classify(session: Option<&SessionInfo>) -> Self {
        let Some(session) = session else {
            return SessionState::Missing;
        };
        let terminal = |value: &Option<String>| {
            value
                .as_deref()
                .is_some_and(|v| TERMINAL_STATES.iter().any(|t| v.eq_ignore_ascii_case(t)))
        };
        if terminal(&session.state) || terminal(&session.status) {
            SessionState::Ended
        } else {
            SessionState::Active
        }
    }
}

/// Outcome of the decision table for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Fetch history and finalize.
    Eligible,
    /// Session is still listed as running.
    SkipActive,
    /// Session is missing but may still be registering.
    SkipWithinGrace,
}

/// Decide whether a task's session should be treated as finished.
pub fn decide(state: SessionState, elapsed: Duration, grace: Duration) -> Decision {
    match state {
        SessionState::Ended => Decision::Eligible,
        SessionState::Missing if elapsed > grace => Decision::Eligible,
        SessionState::Missing => Decision::SkipWithinGrace,
        SessionState::Active => Decision::SkipActive,
    }
}

/// A missing session with too little history is held back until the
/// longer confirm window passes.
pub fn awaiting_vanish_confirm(
    state: SessionState,
    history_len: usize,
    elapsed: Duration,
    config: &ReconcileConfig,
) -> bool {
    state == SessionState::Missing
        && history_len < config.min_history_messages
        && elapsed < secs(config.vanish_confirm_secs)
}

/// Newest non-empty assistant message, cut to `max_chars` characters.
pub fn extract_output(history: &[HistoryMessage], max_chars: usize) -> String {
    history
        .iter()
        .rev()
        .find(|m| m.role == "assistant" && !m.content.trim().is_empty())
        .map(|m| m.content.chars().take(max_chars).collect())
        .unwrap_or_else(|| NO_OUTPUT_PLACEHOLDER.to_string())
}

fn secs(n: u64) -> Duration {
    // chrono durations are bounded by i64 milliseconds
    const MAX_SECS: u64 = i64::MAX as u64 / 1000;
    Duration::seconds(n.min(MAX_SECS) as i64)
}

/// Result of one run: how many candidates were examined and which tasks
/// were finalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub synced: usize,
    pub updated: Vec<String>,
}

/// Detects finished agent sessions and finalizes their tasks.
#[derive(Clone)]
pub struct ReconciliationEngine {
    db: Database,
    gateway: Arc<dyn Gateway>,
    config: ReconcileConfig,
}

impl ReconciliationEngine {
    pub fn new(db: Database, gateway: Arc<dyn Gateway>, config: ReconcileConfig) -> Self {
        Self {
            db,
            gateway,
            config,
        }
    }

    pub async fn run(&self) -> Result<ReconcileReport> {
        self.run_at(crate::db::now()).await
    }

    /// One reconciliation pass with `now` as the reference time.
    ///
    /// Gateway failures never escape: a failed listing yields an empty
    /// report and a failed history fetch skips that task until next run.
    /// Only database errors are returned.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<ReconcileReport> {
        let candidates = self.db.list_in_progress_with_session()?;
        if candidates.is_empty() {
            debug!("No in-progress tasks with sessions");
            return Ok(ReconcileReport::default());
        }

        let sessions = match self.gateway.list_sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(error = %e, candidates = candidates.len(), "Session listing failed, skipping run");
                return Ok(ReconcileReport::default());
            }
        };
        let by_key: HashMap<&str, &SessionInfo> = sessions
            .iter()
            .map(|s| (s.session_key.as_str(), s))
            .collect();

        let mut report = ReconcileReport {
            synced: candidates.len(),
            updated: Vec::new(),
        };

        for task in &candidates {
            let Some(session_key) = task.session_key.as_deref() else {
                continue;
            };
            let state = SessionState::classify(by_key.get(session_key).copied());
            match self.reconcile_task(task, session_key, state, now).await {
                Ok(true) => report.updated.push(task.id.clone()),
                Ok(false) => {}
                Err(e) => warn!(task_id = %task.id, error = %e, "Failed to finalize task"),
            }
        }

        if !report.updated.is_empty() {
            info!(synced = report.synced, updated = report.updated.len(), "Reconciliation finalized tasks");
        }
        Ok(report)
    }

    /// Returns true when this call finalized the task.
    async fn reconcile_task(
        &self,
        task: &Task,
        session_key: &str,
        state: SessionState,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let elapsed = now - task.updated_at;

        match decide(state, elapsed, secs(self.config.grace_window_secs)) {
            Decision::Eligible => {}
            Decision::SkipActive | Decision::SkipWithinGrace => {
                debug!(task_id = %task.id, ?state, elapsed_secs = elapsed.num_seconds(), "Not finalizing");
                return Ok(false);
            }
        }

        let history = match self
            .gateway
            .get_history(session_key, self.config.history_limit)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                debug!(task_id = %task.id, session_key, error = %e, "History unavailable, retrying next run");
                return Ok(false);
            }
        };

        if awaiting_vanish_confirm(state, history.len(), elapsed, &self.config) {
            debug!(task_id = %task.id, messages = history.len(), "Vanished session with thin history, waiting");
            return Ok(false);
        }

        let output = extract_output(&history, self.config.output_max_chars);
        self.finalize(task, &output, now)
    }

    fn finalize(&self, task: &Task, output: &str, now: DateTime<Utc>) -> Result<bool> {
        let (applied, action, details) = match self.config.completion_policy {
            CompletionPolicy::AutoClose => (
                self.db.update_task_completion(&task.id, output, now)?,
                "completed",
                "Agent session completed. Task moved to done.",
            ),
            CompletionPolicy::FlagOnly => (
                self.db.flag_agent_done(&task.id, output, now)?,
                "agent_done",
                "Agent session completed. Awaiting user review.",
            ),
        };

        if !applied {
            debug!(task_id = %task.id, "Task changed under us, leaving it");
            return Ok(false);
        }

        self.db
            .append_activity(Some(&task.id), task.actor(), action, Some(details), now)?;
        info!(task_id = %task.id, action, "Task finalized");
        Ok(true)
    }
}

/// Run the engine every `interval_secs` until `shutdown` flips to true.
///
/// Each tick spawns its own run, so a slow gateway never delays the next
/// tick; overlapping runs are safe.
pub fn spawn_scheduler(
    engine: ReconciliationEngine,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(engine.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = engine.config.interval_secs, "Reconciliation scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        if let Err(e) = engine.run().await {
                            warn!(error = %e, "Reconciliation run failed");
                        }
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reconciliation scheduler stopped");
    })
}

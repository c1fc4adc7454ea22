//! HTTP client for the OpenClaw tool-invocation endpoint.
//!
//! Every operation is a `POST {url}/tools/invoke` carrying
//! `{"tool", "args", "sessionKey": "main"}`. Responses wrap the payload in a
//! few different envelopes depending on the tool; [`unwrap_envelope`]
//! normalizes them.

use super::{AgentInfo, Gateway, GatewayError, HistoryMessage, SessionInfo, SpawnRequest, SpawnResult};
use crate::config::GatewayConfig;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Gateway reached over HTTP with a bearer token.
pub struct HttpGateway {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpGateway {
    /// Build a client whose every request is bounded by `config.timeout_secs`.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("mission-control/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    async fn invoke(&self, tool: &str, args: Value) -> Result<Value, GatewayError> {
        debug!(tool, "Invoking gateway tool");
        let resp = self
            .http
            .post(format!("{}/tools/invoke", self.base_url))
            .bearer_auth(&self.token)
            .json(&json!({ "tool": tool, "args": args, "sessionKey": "main" }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(GatewayError::Api {
                status: resp.status().as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }

        let body: Value = resp.json().await?;
        unwrap_envelope(body)
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn spawn_session(&self, request: SpawnRequest) -> Result<SpawnResult, GatewayError> {
        let args = serde_json::to_value(&request)?;
        let result = self.invoke("sessions_spawn", args).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, GatewayError> {
        let result = self
            .invoke(
                "sessions_list",
                json!({ "kinds": ["subagent"], "messageLimit": 1 }),
            )
            .await?;
        extract_list(result, "sessions")
    }

    async fn get_history(
        &self,
        session_key: &str,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, GatewayError> {
        let result = self
            .invoke(
                "sessions_history",
                json!({ "sessionKey": session_key, "limit": limit }),
            )
            .await?;
        extract_list(result, "messages")
    }

    async fn send_message(&self, session_key: &str, message: &str) -> Result<String, GatewayError> {
        let result = self
            .invoke(
                "sessions_send",
                json!({ "sessionKey": session_key, "message": message }),
            )
            .await?;
        Ok(extract_reply(result))
    }

    async fn list_agents(&self) -> Result<Vec<AgentInfo>, GatewayError> {
        let result = self.invoke("agents_list", json!({})).await?;
        extract_list(result, "agents")
    }
}

/// Peel the tool-invocation envelope down to the tool's own payload.
///
/// A truthy `error` is a failure even on 2xx; `null`, `false`, `0` and `""`
/// are ignored. Otherwise the payload is `result` (or the whole body),
/// preferring `result.details` when present, and decoding
/// `result.content[0].text` when it holds JSON.
pub(crate) fn unwrap_envelope(body: Value) -> Result<Value, GatewayError> {
    match body.get("error") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => {}
        Some(Value::String(msg)) if msg.is_empty() => {}
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => {}
        Some(Value::String(msg)) => return Err(GatewayError::Remote(msg.clone())),
        Some(other) => return Err(GatewayError::Remote(other.to_string())),
    }

    let result = match body {
        Value::Object(mut map) => match map.remove("result") {
            Some(result) if !result.is_null() => result,
            _ => Value::Object(map),
        },
        other => other,
    };

    if let Some(details) = result.get("details") {
        return Ok(details.clone());
    }

    let text = result
        .get("content")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|first| first.get("text"))
        .and_then(Value::as_str);
    if let Some(text) = text
        && let Ok(parsed) = serde_json::from_str::<Value>(text)
    {
        return Ok(parsed);
    }

    Ok(result)
}

/// Accept either a bare array or `{ <key>: [...] }`.
///
/// Anything else is a decode error rather than an empty list: an empty
/// session list would read as "every session is gone".
pub(crate) fn extract_list<T: DeserializeOwned>(value: Value, key: &str) -> Result<Vec<T>, GatewayError> {
    let items = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => match map.remove(key) {
            Some(items @ Value::Array(_)) => items,
            _ => {
                return Err(GatewayError::Decode(format!(
                    "expected an array or an object with '{}'",
                    key
                )));
            }
        },
        other => {
            return Err(GatewayError::Decode(format!(
                "expected an array, got {}",
                other
            )));
        }
    };
    Ok(serde_json::from_value(items)?)
}

/// Pull reply text out of a `sessions_send` result.
pub(crate) fn extract_reply(value: Value) -> String {
    if let Value::String(s) = value {
        return s;
    }
    for key in ["reply", "text"] {
        if let Some(s) = value.get(key).and_then(Value::as_str) {
            return s.to_string();
        }
    }
    if let Some(items) = value.get("content").and_then(Value::as_array) {
        let texts: Vec<&str> = items
            .iter()
            .filter_map(|c| c.get("text").and_then(Value::as_str))
            .filter(|t| !t.is_empty())
            .collect();
        if !texts.is_empty() {
            return texts.join("\n");
        }
    }
    value.to_string()
}

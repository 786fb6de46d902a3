//! HTTP client for the hosted completion service.
//!
//! The wire protocol is the assistants-style API: a conversation lives in a
//! thread, each exchange is a run, and a run that needs tool results parks in
//! `requires_action` until outputs are submitted. Everything the rest of the
//! crate needs is behind [`AssistantClient`] so orchestration can be tested
//! against a scripted implementation.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("completion service transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("could not decode completion service response: {0}")]
    Decode(String),
}

/// Run lifecycle as reported by the service. Statuses the service grows
/// later land in `Other` so polling keeps working instead of failing to
/// decode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Completed,
    Failed,
    Cancelled,
    Expired,
    Other(String),
}

impl RunStatus {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            "requires_action" => Self::RequiresAction,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            "expired" => Self::Expired,
            other => Self::Other(other.to_string()),
        }
    }

    /// Terminal states that will never produce a reply.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled | Self::Expired)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let wire = match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Other(other) => other,
        };
        f.write_str(wire)
    }
}

/// One tool call the service is waiting on. `arguments` is the raw JSON
/// string exactly as the model produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSnapshot {
    pub status: RunStatus,
    pub tool_calls: Vec<ToolCallRequest>,
}

/// Newest assistant turn of a thread, one item per content block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssistantReply {
    pub content: Vec<ContentItem>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentItem {
    Text { value: String },
    Other { kind: String, text: Option<String> },
}

#[async_trait]
pub trait AssistantClient: Send + Sync {
    async fn create_thread(&self) -> Result<String, AssistantError>;

    async fn append_user_message(&self, thread_id: &str, text: &str)
        -> Result<(), AssistantError>;

    /// Starts a run over the thread with the given tool schema and returns
    /// the run id.
    async fn start_run(&self, thread_id: &str, tools: &Value) -> Result<String, AssistantError>;

    async fn run_snapshot(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<RunSnapshot, AssistantError>;

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<(), AssistantError>;

    async fn latest_reply(&self, thread_id: &str) -> Result<AssistantReply, AssistantError>;

    /// Raw bytes of an uploaded file, used to proxy generated images.
    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>, AssistantError>;
}

pub struct HttpAssistantClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    assistant_id: String,
}

impl HttpAssistantClient {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        assistant_id: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, AssistantError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            assistant_id: assistant_id.into(),
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.decorate(self.client.get(format!("{}{path}", self.base_url)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.decorate(self.client.post(format!("{}{path}", self.base_url)))
    }

    fn decorate(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(self.api_key.expose_secret())
            .header("OpenAI-Beta", "assistants=v2")
    }
}

#[async_trait]
impl AssistantClient for HttpAssistantClient {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        let response = self.post("/threads").json(&json!({})).send().await?;
        let response = ensure_success(response).await?;
        let created: CreatedObject = decode(response).await?;
        debug!(event_name = "assistant.thread_created", thread_id = %created.id);
        Ok(created.id)
    }

    async fn append_user_message(
        &self,
        thread_id: &str,
        text: &str,
    ) -> Result<(), AssistantError> {
        let response = self
            .post(&format!("/threads/{thread_id}/messages"))
            .json(&json!({ "role": "user", "content": text }))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn start_run(&self, thread_id: &str, tools: &Value) -> Result<String, AssistantError> {
        let response = self
            .post(&format!("/threads/{thread_id}/runs"))
            .json(&json!({ "assistant_id": self.assistant_id, "tools": tools }))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let created: CreatedObject = decode(response).await?;
        debug!(event_name = "assistant.run_started", thread_id, run_id = %created.id);
        Ok(created.id)
    }

    async fn run_snapshot(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<RunSnapshot, AssistantError> {
        let response = self
            .get(&format!("/threads/{thread_id}/runs/{run_id}"))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let wire: RunWire = decode(response).await?;
        Ok(snapshot_from_wire(wire))
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<(), AssistantError> {
        let response = self
            .post(&format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"))
            .json(&json!({ "tool_outputs": outputs }))
            .send()
            .await?;
        ensure_success(response).await?;
        debug!(
            event_name = "assistant.tool_outputs_submitted",
            thread_id,
            run_id,
            outputs = outputs.len()
        );
        Ok(())
    }

    async fn latest_reply(&self, thread_id: &str) -> Result<AssistantReply, AssistantError> {
        let response = self
            .get(&format!("/threads/{thread_id}/messages"))
            .query(&[("limit", "1"), ("order", "desc")])
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let wire: MessageListWire = decode(response).await?;
        reply_from_wire(wire)
    }

    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>, AssistantError> {
        let response = self.get(&format!("/files/{file_id}/content")).send().await?;
        let response = ensure_success(response).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, AssistantError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AssistantError::Api { status: status.as_u16(), message: api_message(&body) })
}

async fn decode<T>(response: reqwest::Response) -> Result<T, AssistantError>
where
    T: serde::de::DeserializeOwned,
{
    response
        .json::<T>()
        .await
        .map_err(|error| AssistantError::Decode(error.to_string()))
}

/// Pulls `error.message` out of an API error body, falling back to the raw
/// text when the body is not the documented shape.
fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[derive(Deserialize)]
struct CreatedObject {
    id: String,
}

#[derive(Deserialize)]
struct RunWire {
    status: String,
    required_action: Option<RequiredActionWire>,
}

#[derive(Deserialize)]
struct RequiredActionWire {
    submit_tool_outputs: Option<SubmitToolOutputsWire>,
}

#[derive(Deserialize)]
struct SubmitToolOutputsWire {
    tool_calls: Vec<ToolCallWire>,
}

#[derive(Deserialize)]
struct ToolCallWire {
    id: String,
    function: FunctionWire,
}

#[derive(Deserialize)]
struct FunctionWire {
    name: String,
    arguments: String,
}

fn snapshot_from_wire(wire: RunWire) -> RunSnapshot {
    let tool_calls = wire
        .required_action
        .and_then(|action| action.submit_tool_outputs)
        .map(|submit| {
            submit
                .tool_calls
                .into_iter()
                .map(|call| ToolCallRequest {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect()
        })
        .unwrap_or_default();

    RunSnapshot { status: RunStatus::from_wire(&wire.status), tool_calls }
}

#[derive(Deserialize)]
struct MessageListWire {
    data: Vec<MessageWire>,
}

#[derive(Deserialize)]
struct MessageWire {
    content: Vec<ContentWire>,
}

#[derive(Deserialize)]
struct ContentWire {
    #[serde(rename = "type")]
    kind: String,
    text: Option<TextWire>,
}

#[derive(Deserialize)]
struct TextWire {
    value: String,
}

fn reply_from_wire(wire: MessageListWire) -> Result<AssistantReply, AssistantError> {
    let newest = wire
        .data
        .into_iter()
        .next()
        .ok_or_else(|| AssistantError::Decode("thread has no messages".to_string()))?;

    let content = newest
        .content
        .into_iter()
        .map(|item| {
            if item.kind == "text" {
                ContentItem::Text { value: item.text.map(|text| text.value).unwrap_or_default() }
            } else {
                ContentItem::Other { kind: item.kind, text: item.text.map(|text| text.value) }
            }
        })
        .collect();

    Ok(AssistantReply { content })
}

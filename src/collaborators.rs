//! External Collaborators
//!
//! Interface boundaries for the content-calendar store, the knowledge/vector
//! store, and the checkpoint notification channel, plus HTTP-backed
//! implementations. All three are best-effort from the executor's point of
//! view: a persistence or notification failure is logged and surfaced in the
//! item result, never fatal to the item or the batch.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::context::Trend;
use crate::error::OrchestratorError;
use crate::plan::RecordRef;

/// Draft record for the content calendar.
#[derive(Debug, Clone, Serialize)]
pub struct CalendarDraft {
    pub content: String,
    pub platform: String,
    /// First line of the content, used as the calendar preview
    pub hook_preview: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_notes: Option<String>,
}

/// Periodic progress/quality summary emitted during batch execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub plan_id: String,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub avg_score: f64,
    pub trend: Trend,
}

#[async_trait]
pub trait ContentCalendar: Send + Sync {
    async fn create_record(&self, draft: &CalendarDraft) -> Result<RecordRef, OrchestratorError>;
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn save_with_embedding(
        &self,
        content: &str,
        metadata: &serde_json::Value,
    ) -> Result<String, OrchestratorError>;
}

#[async_trait]
pub trait CheckpointNotifier: Send + Sync {
    async fn notify(&self, checkpoint: &Checkpoint) -> Result<(), OrchestratorError>;
}

const COLLABORATOR_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const COLLABORATOR_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_collaborator_client() -> Result<Client, OrchestratorError> {
    Client::builder()
        .connect_timeout(COLLABORATOR_CONNECT_TIMEOUT)
        .timeout(COLLABORATOR_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| {
            OrchestratorError::ConfigError(format!("Failed to create HTTP client: {}", e))
        })
}

pub(crate) fn map_http_error(error: reqwest::Error) -> OrchestratorError {
    if error.is_status() {
        let status = error.status().map(|s| s.as_u16()).unwrap_or(0);
        match status {
            401 => OrchestratorError::ProviderAuthFailed(format!("Authentication failed: {}", error)),
            429 => OrchestratorError::ProviderRateLimit(format!("Rate limit exceeded: {}", error)),
            _ => OrchestratorError::ProviderRequestFailed(format!(
                "Request failed with status {}: {}",
                status, error
            )),
        }
    } else if error.is_timeout() {
        OrchestratorError::ProviderRequestFailed(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        OrchestratorError::ProviderRequestFailed(format!("Connection error: {}", error))
    } else {
        OrchestratorError::ProviderError(format!("HTTP error: {}", error))
    }
}

/// Content calendar over HTTP.
pub struct HttpContentCalendar {
    client: Client,
    base_url: String,
}

impl HttpContentCalendar {
    pub fn new(base_url: String) -> Result<Self, OrchestratorError> {
        Ok(Self {
            client: build_collaborator_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ContentCalendar for HttpContentCalendar {
    async fn create_record(&self, draft: &CalendarDraft) -> Result<RecordRef, OrchestratorError> {
        let response = self
            .client
            .post(format!("{}/records", self.base_url))
            .json(draft)
            .send()
            .await
            .map_err(map_http_error)?
            .error_for_status()
            .map_err(map_http_error)?;

        #[derive(Deserialize)]
        struct RecordResponse {
            record_id: String,
            #[serde(default)]
            url: Option<String>,
        }

        let body: RecordResponse = response.json().await.map_err(map_http_error)?;
        Ok(RecordRef {
            record_id: body.record_id,
            url: body.url,
        })
    }
}

/// Knowledge/vector store over HTTP.
pub struct HttpKnowledgeStore {
    client: Client,
    base_url: String,
}

impl HttpKnowledgeStore {
    pub fn new(base_url: String) -> Result<Self, OrchestratorError> {
        Ok(Self {
            client: build_collaborator_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl KnowledgeStore for HttpKnowledgeStore {
    async fn save_with_embedding(
        &self,
        content: &str,
        metadata: &serde_json::Value,
    ) -> Result<String, OrchestratorError> {
        let response = self
            .client
            .post(format!("{}/documents", self.base_url))
            .json(&json!({ "content": content, "metadata": metadata }))
            .send()
            .await
            .map_err(map_http_error)?
            .error_for_status()
            .map_err(map_http_error)?;

        #[derive(Deserialize)]
        struct SaveResponse {
            record_id: String,
        }

        let body: SaveResponse = response.json().await.map_err(map_http_error)?;
        Ok(body.record_id)
    }
}

/// Checkpoint webhook. The payload is plain structured text; chat-specific
/// markup is the receiver's concern.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self, OrchestratorError> {
        Ok(Self {
            client: build_collaborator_client()?,
            url,
        })
    }
}

#[async_trait]
impl CheckpointNotifier for WebhookNotifier {
    async fn notify(&self, checkpoint: &Checkpoint) -> Result<(), OrchestratorError> {
        let text = format!(
            "Batch {}: {} completed ({} succeeded, {} failed), avg score {:.1}, trend {}",
            checkpoint.plan_id,
            checkpoint.completed,
            checkpoint.succeeded,
            checkpoint.failed,
            checkpoint.avg_score,
            checkpoint.trend.as_str()
        );
        self.client
            .post(&self.url)
            .json(&json!({ "text": text, "checkpoint": checkpoint }))
            .send()
            .await
            .map_err(map_http_error)?
            .error_for_status()
            .map_err(map_http_error)?;
        Ok(())
    }
}

//! Generative Model Provider
//!
//! HTTP-backed implementations of the generative model, the model connector,
//! and the quality rubric service. The model speaks a line-delimited JSON
//! event protocol (optionally SSE-framed with a `data:` prefix); the core
//! only detects stream completion and extracts the final payload.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde_json::json;

use crate::collaborators::map_http_error;
use crate::error::OrchestratorError;
use crate::quality::{ContentFixer, ContentValidator, FixOutcome, QualityIssue, Validation};
use crate::session::ModelConnector;
use crate::stream::{EventStream, GenerationRequest, GenerativeModel, StreamEvent};
use crate::types::Platform;

const MODEL_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn build_model_client() -> Result<Client, OrchestratorError> {
    // No overall request timeout: the streaming call driver owns idle and
    // deadline handling.
    Client::builder()
        .connect_timeout(MODEL_CONNECT_TIMEOUT)
        .build()
        .map_err(|e| {
            OrchestratorError::ConfigError(format!("Failed to create HTTP client: {}", e))
        })
}

/// Generative model over HTTP with a streaming line protocol.
pub struct HttpGenerativeModel {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    platform: Platform,
}

impl HttpGenerativeModel {
    pub fn new(
        client: Client,
        base_url: String,
        api_key: Option<String>,
        platform: Platform,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            platform,
        }
    }
}

#[async_trait]
impl GenerativeModel for HttpGenerativeModel {
    async fn start(
        &self,
        request: &GenerationRequest,
        resume_chars: usize,
    ) -> Result<EventStream, OrchestratorError> {
        let body = json!({
            "platform": request.platform.as_str(),
            "topic": request.topic,
            "background": request.background,
            "learnings": request.learnings,
            "target_score": request.target_score,
            "overrides": request.overrides,
            "resume_chars": resume_chars,
        });
        let mut builder = self
            .client
            .post(format!("{}/generate", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(map_http_error)?
            .error_for_status()
            .map_err(map_http_error)?;

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(map_http_error));
        Ok(Box::pin(parse_event_lines(bytes)))
    }

    fn model_name(&self) -> &str {
        self.platform.as_str()
    }
}

/// Decode a byte stream into model events, one JSON document per line.
/// Lines may carry an SSE `data:` prefix; blank lines are keep-alives.
fn parse_event_lines<S>(bytes: S) -> impl Stream<Item = Result<StreamEvent, OrchestratorError>> + Send
where
    S: Stream<Item = Result<Vec<u8>, OrchestratorError>> + Send + 'static,
{
    // Pinned so the byte source does not need to be Unpin (reqwest's
    // bytes_stream is not).
    let state = (
        Box::pin(bytes.fuse()),
        String::new(),
        std::collections::VecDeque::new(),
    );
    futures::stream::unfold(state, |(mut bytes, mut buffer, mut pending)| async move {
        loop {
            if let Some(event) = pending.pop_front() {
                return Some((event, (bytes, buffer, pending)));
            }
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    match std::str::from_utf8(&chunk) {
                        Ok(text) => buffer.push_str(text),
                        Err(_) => {
                            let err = OrchestratorError::StreamProtocol(
                                "invalid utf-8 in stream".to_string(),
                            );
                            return Some((Err(err), (bytes, buffer, pending)));
                        }
                    }
                    while let Some(pos) = buffer.find('\n') {
                        let line: String = buffer.drain(..=pos).collect();
                        if let Some(event) = parse_event_line(&line) {
                            pending.push_back(event);
                        }
                    }
                }
                Some(Err(err)) => return Some((Err(err), (bytes, buffer, pending))),
                None => {
                    let rest = std::mem::take(&mut buffer);
                    return parse_event_line(&rest).map(|event| (event, (bytes, buffer, pending)));
                }
            }
        }
    })
}

fn parse_event_line(line: &str) -> Option<Result<StreamEvent, OrchestratorError>> {
    let line = line.trim();
    let line = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str::<StreamEvent>(line).map_err(|e| {
        OrchestratorError::StreamProtocol(format!("malformed stream message: {e}"))
    }))
}

/// Connects pooled sessions to the HTTP model endpoint.
pub struct HttpModelConnector {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpModelConnector {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, OrchestratorError> {
        Ok(Self {
            client: build_model_client()?,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl ModelConnector for HttpModelConnector {
    async fn connect(
        &self,
        platform: Platform,
    ) -> Result<Arc<dyn GenerativeModel>, OrchestratorError> {
        Ok(Arc::new(HttpGenerativeModel::new(
            self.client.clone(),
            self.base_url.clone(),
            self.api_key.clone(),
            platform,
        )))
    }
}

/// Quality rubric service: validation scoring and the single fix pass.
pub struct RubricClient {
    client: Client,
    base_url: String,
}

impl RubricClient {
    pub fn new(base_url: String) -> Result<Self, OrchestratorError> {
        Ok(Self {
            client: crate::collaborators::build_collaborator_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ContentValidator for RubricClient {
    async fn validate(
        &self,
        content: &str,
        platform: Platform,
    ) -> Result<Validation, OrchestratorError> {
        let response = self
            .client
            .post(format!("{}/validate", self.base_url))
            .json(&json!({ "content": content, "platform": platform.as_str() }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OrchestratorError::ValidationUnavailable(e.to_string()))?;
        response
            .json::<Validation>()
            .await
            .map_err(|e| OrchestratorError::ValidationUnavailable(e.to_string()))
    }
}

#[async_trait]
impl ContentFixer for RubricClient {
    async fn fix(
        &self,
        content: &str,
        platform: Platform,
        issues: &[QualityIssue],
    ) -> Result<FixOutcome, OrchestratorError> {
        let response = self
            .client
            .post(format!("{}/fix", self.base_url))
            .json(&json!({
                "content": content,
                "platform": platform.as_str(),
                "issues": issues,
            }))
            .send()
            .await
            .map_err(map_http_error)?
            .error_for_status()
            .map_err(map_http_error)?;
        response.json::<FixOutcome>().await.map_err(map_http_error)
    }
}

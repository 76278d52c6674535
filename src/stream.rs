//! Streaming Call Driver
//!
//! Wraps one generative call with idle-timeout, overall-deadline, and bounded
//! reconnect-and-resume. The driver is an explicit state machine over a
//! message stream, so timeout behavior is testable without a real network.

use std::collections::HashMap;
use std::pin::Pin;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::StreamConfig;
use crate::error::OrchestratorError;
use crate::types::Platform;

/// One incremental message from the generative model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental text chunk
    Delta { text: String },
    /// Terminal message carrying the final payload
    Completed { payload: GenerationPayload },
}

/// Final payload of a completed generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationPayload {
    pub content: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Everything a generation call needs, assembled by the executor.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub platform: Platform,
    pub topic: String,
    pub background: String,
    pub learnings: String,
    pub target_score: u8,
    pub overrides: HashMap<String, String>,
}

/// Streaming event source type
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, OrchestratorError>> + Send>>;

/// Generative model connection.
///
/// `resume_chars` tells the transport how much content was already received,
/// so a reconnect can resume instead of restarting from scratch.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn start(
        &self,
        request: &GenerationRequest,
        resume_chars: usize,
    ) -> Result<EventStream, OrchestratorError>;

    /// Release the underlying connection. Called on pool eviction.
    async fn close(&self) -> Result<(), OrchestratorError> {
        Ok(())
    }

    fn model_name(&self) -> &str;
}

enum Interruption {
    Idle,
    Disconnected(OrchestratorError),
}

/// Drives one generative call to completion through an unreliable stream.
#[derive(Debug, Clone)]
pub struct StreamCallDriver {
    cfg: StreamConfig,
}

impl StreamCallDriver {
    pub fn new(cfg: StreamConfig) -> Self {
        Self { cfg }
    }

    /// Execute one call. Idle silence triggers up to `max_reconnects`
    /// reconnect-and-resume cycles; the overall deadline aborts regardless.
    pub async fn call(
        &self,
        model: &dyn GenerativeModel,
        request: &GenerationRequest,
    ) -> Result<GenerationPayload, OrchestratorError> {
        let started = Instant::now();
        let deadline = self.cfg.overall_deadline();
        let mut attempts = 0usize;
        let mut received = String::new();

        loop {
            let remaining = self.remaining(started, deadline)?;
            let mut stream = tokio::time::timeout(
                remaining,
                model.start(request, received.chars().count()),
            )
            .await
            .map_err(|_| self.deadline_error())??;

            let interruption = loop {
                let remaining = self.remaining(started, deadline)?;
                let wait = self.cfg.idle_timeout().min(remaining);
                match tokio::time::timeout(wait, stream.next()).await {
                    Ok(Some(Ok(StreamEvent::Delta { text }))) => {
                        received.push_str(&text);
                    }
                    Ok(Some(Ok(StreamEvent::Completed { payload }))) => {
                        debug!(
                            model = model.model_name(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            attempts,
                            "generation stream completed"
                        );
                        return Ok(payload);
                    }
                    Ok(Some(Err(err))) => break Interruption::Disconnected(err),
                    Ok(None) => {
                        break Interruption::Disconnected(OrchestratorError::StreamProtocol(
                            "stream ended before completion".to_string(),
                        ))
                    }
                    Err(_) => {
                        if started.elapsed() >= deadline {
                            return Err(self.deadline_error());
                        }
                        break Interruption::Idle;
                    }
                }
            };

            if attempts >= self.cfg.max_reconnects {
                return Err(match interruption {
                    Interruption::Idle => OrchestratorError::IdleTimeout { attempts },
                    Interruption::Disconnected(err) => err,
                });
            }
            attempts += 1;
            match &interruption {
                Interruption::Idle => warn!(
                    attempt = attempts,
                    max = self.cfg.max_reconnects,
                    idle_ms = self.cfg.idle_timeout_ms,
                    "stream idle, reconnecting"
                ),
                Interruption::Disconnected(err) => warn!(
                    attempt = attempts,
                    max = self.cfg.max_reconnects,
                    error = %err,
                    "stream disconnected, reconnecting"
                ),
            }
        }
    }

    fn remaining(&self, started: Instant, deadline: Duration) -> Result<Duration, OrchestratorError> {
        match deadline.checked_sub(started.elapsed()) {
            Some(left) if !left.is_zero() => Ok(left),
            _ => Err(self.deadline_error()),
        }
    }

    fn deadline_error(&self) -> OrchestratorError {
        OrchestratorError::DeadlineExceeded {
            deadline_ms: self.cfg.overall_deadline_ms,
        }
    }
}

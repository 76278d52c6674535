//! Batch Plan Store
//!
//! Holds the ordered list of items for a batch, their states, and result
//! metadata. The store is an explicit object owning its own synchronization,
//! injected into the executor rather than reached as ambient global state.
//! Item order is fixed at creation; items only transition through states.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ContextConfig;
use crate::context::Trend;
use crate::error::{OrchestratorError, PlanError};
use crate::types::new_plan_id;

/// Item lifecycle state. Exactly one transition path:
/// `pending -> running -> {succeeded|failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl ItemState {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemState::Pending => "pending",
            ItemState::Running => "running",
            ItemState::Succeeded => "succeeded",
            ItemState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ItemState::Succeeded | ItemState::Failed)
    }

    fn can_transition_to(self, next: ItemState) -> bool {
        matches!(
            (self, next),
            (ItemState::Pending, ItemState::Running)
                | (ItemState::Running, ItemState::Succeeded)
                | (ItemState::Running, ItemState::Failed)
        )
    }
}

/// Classification of the background material supplied with the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextQuality {
    Sparse,
    Rich,
}

/// Failure classification for pattern-matching callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownPlatform,
    Timeout,
    DeadlineExceeded,
    CircuitOpen,
    Provider,
    Cancelled,
    Other,
}

impl From<&OrchestratorError> for FailureKind {
    fn from(err: &OrchestratorError) -> Self {
        match err {
            OrchestratorError::UnknownPlatform(_) => FailureKind::UnknownPlatform,
            OrchestratorError::IdleTimeout { .. } => FailureKind::Timeout,
            OrchestratorError::DeadlineExceeded { .. } => FailureKind::DeadlineExceeded,
            OrchestratorError::CircuitOpen(_) => FailureKind::CircuitOpen,
            OrchestratorError::Cancelled => FailureKind::Cancelled,
            OrchestratorError::ProviderError(_)
            | OrchestratorError::ProviderRequestFailed(_)
            | OrchestratorError::ProviderAuthFailed(_)
            | OrchestratorError::ProviderRateLimit(_)
            | OrchestratorError::StreamProtocol(_) => FailureKind::Provider,
            _ => FailureKind::Other,
        }
    }
}

/// External record reference returned by a persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRef {
    pub record_id: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Successful item result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSuccess {
    pub content: String,
    pub score: f64,
    pub needs_review: bool,
    #[serde(default)]
    pub calendar_ref: Option<RecordRef>,
    #[serde(default)]
    pub knowledge_ref: Option<String>,
    /// Best-effort persistence failures, surfaced without failing the item
    #[serde(default)]
    pub persistence_notes: Vec<String>,
    #[serde(default)]
    pub scoring_note: Option<String>,
}

/// Failed item result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Tagged item outcome; callers pattern-match instead of probing optional
/// fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ItemOutcome {
    Success(ItemSuccess),
    Failure(ItemFailure),
}

/// Specification of one item in a batch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSpec {
    /// Raw platform name; parsed at execution so an unknown platform fails
    /// only this item
    pub platform: String,
    pub topic: String,
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

/// One item of a batch plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanItem {
    pub platform: String,
    pub topic: String,
    #[serde(default)]
    pub overrides: HashMap<String, String>,
    pub state: ItemState,
    #[serde(default)]
    pub outcome: Option<ItemOutcome>,
}

/// An ordered batch of content-generation items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPlan {
    pub plan_id: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    /// Background material fed to every generation call
    pub background: String,
    pub context_quality: ContextQuality,
    pub items: Vec<PlanItem>,
    /// Originating-request metadata, passed through untouched
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl BatchPlan {
    pub fn is_terminal(&self) -> bool {
        self.items.iter().all(|item| item.state.is_terminal())
    }
}

/// Aggregate status of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatus {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub avg_score: f64,
    pub trend: Trend,
}

struct PlanRecord {
    plan: BatchPlan,
    terminal_since: Option<Instant>,
}

/// In-memory plan registry.
pub struct PlanStore {
    inner: RwLock<HashMap<String, PlanRecord>>,
    rich_background_chars: usize,
}

impl PlanStore {
    pub fn new(context_cfg: &ContextConfig) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            rich_background_chars: context_cfg.rich_background_chars,
        }
    }

    /// Create a plan from a batch request. Validates the item list up front;
    /// a malformed request is rejected whole, never partially applied.
    pub fn create_plan(
        &self,
        description: String,
        background: String,
        items: Vec<ItemSpec>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<String, PlanError> {
        if items.is_empty() {
            return Err(PlanError::EmptyPlan);
        }
        for (index, item) in items.iter().enumerate() {
            if item.platform.trim().is_empty() {
                return Err(PlanError::InvalidItem {
                    index,
                    reason: "platform cannot be empty".to_string(),
                });
            }
            if item.topic.trim().is_empty() {
                return Err(PlanError::InvalidItem {
                    index,
                    reason: "topic cannot be empty".to_string(),
                });
            }
        }

        let context_quality = if background.chars().count() >= self.rich_background_chars {
            ContextQuality::Rich
        } else {
            ContextQuality::Sparse
        };

        let plan_id = new_plan_id();
        let plan = BatchPlan {
            plan_id: plan_id.clone(),
            description,
            created_at: Utc::now(),
            background,
            context_quality,
            items: items
                .into_iter()
                .map(|spec| PlanItem {
                    platform: spec.platform,
                    topic: spec.topic,
                    overrides: spec.overrides,
                    state: ItemState::Pending,
                    outcome: None,
                })
                .collect(),
            metadata,
        };

        info!(
            plan_id = %plan_id,
            items = plan.items.len(),
            context_quality = ?plan.context_quality,
            "created batch plan"
        );
        self.inner.write().insert(
            plan_id.clone(),
            PlanRecord {
                plan,
                terminal_since: None,
            },
        );
        Ok(plan_id)
    }

    pub fn get_plan(&self, plan_id: &str) -> Result<BatchPlan, PlanError> {
        self.inner
            .read()
            .get(plan_id)
            .map(|record| record.plan.clone())
            .ok_or_else(|| PlanError::PlanNotFound(plan_id.to_string()))
    }

    /// Transition one item, attaching its outcome when terminal. Enforces the
    /// single allowed transition path.
    pub fn update_item(
        &self,
        plan_id: &str,
        index: usize,
        new_state: ItemState,
        outcome: Option<ItemOutcome>,
    ) -> Result<(), PlanError> {
        let mut inner = self.inner.write();
        let record = inner
            .get_mut(plan_id)
            .ok_or_else(|| PlanError::PlanNotFound(plan_id.to_string()))?;
        let item = record
            .plan
            .items
            .get_mut(index)
            .ok_or_else(|| PlanError::ItemOutOfRange {
                plan_id: plan_id.to_string(),
                index,
            })?;

        if !item.state.can_transition_to(new_state) {
            return Err(PlanError::InvalidTransition {
                from: item.state.as_str(),
                to: new_state.as_str(),
            });
        }

        debug!(plan_id = %plan_id, index, state = new_state.as_str(), "item transition");
        item.state = new_state;
        if new_state.is_terminal() {
            item.outcome = outcome;
            if record.plan.is_terminal() && record.terminal_since.is_none() {
                record.terminal_since = Some(Instant::now());
            }
        }
        Ok(())
    }

    /// Aggregate counts, average score over succeeded items, and trend.
    /// Idempotent: repeated calls after completion return identical numbers.
    pub fn status(&self, plan_id: &str) -> Result<BatchStatus, PlanError> {
        let inner = self.inner.read();
        let record = inner
            .get(plan_id)
            .ok_or_else(|| PlanError::PlanNotFound(plan_id.to_string()))?;

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut scores = Vec::new();
        for item in &record.plan.items {
            match item.state {
                ItemState::Succeeded => {
                    succeeded += 1;
                    if let Some(ItemOutcome::Success(success)) = &item.outcome {
                        scores.push(success.score);
                    }
                }
                ItemState::Failed => failed += 1,
                _ => {}
            }
        }
        let avg_score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        Ok(BatchStatus {
            total: record.plan.items.len(),
            succeeded,
            failed,
            avg_score,
            trend: Trend::from_scores(&scores),
        })
    }

    /// Drop plans whose items are all terminal and whose retention window has
    /// elapsed. Returns the number of plans removed.
    pub fn prune_terminal(&self, retention: Duration) -> usize {
        let mut inner = self.inner.write();
        let before = inner.len();
        inner.retain(|_, record| match record.terminal_since {
            Some(since) => since.elapsed() < retention,
            None => true,
        });
        before - inner.len()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

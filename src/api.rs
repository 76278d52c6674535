//! Batch Request Surface
//!
//! Thin, serde-facing surface over the plan store and executor. Every error
//! path exposes a `success: false` field so callers can branch without
//! probing for optional fields.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::Trend;
use crate::error::PlanError;
use crate::executor::{BatchReport, SequentialExecutor};
use crate::plan::{ContextQuality, ItemOutcome, ItemSpec, ItemState, PlanStore};

/// Structured error envelope. `success` is always false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub kind: String,
    pub error: String,
}

impl From<PlanError> for ApiErrorBody {
    fn from(err: PlanError) -> Self {
        let kind = match &err {
            PlanError::PlanNotFound(_) => "not_found",
            PlanError::EmptyPlan | PlanError::InvalidItem { .. } => "invalid_request",
            PlanError::ItemOutOfRange { .. } => "not_found",
            PlanError::InvalidTransition { .. } => "conflict",
        };
        ApiErrorBody {
            success: false,
            kind: kind.to_string(),
            error: err.to_string(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiErrorBody>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBatchRequest {
    pub description: String,
    #[serde(default)]
    pub background: String,
    pub items: Vec<ItemSpec>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBatchResponse {
    pub success: bool,
    pub plan_id: String,
    pub total: usize,
    pub context_quality: ContextQuality,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatusResponse {
    pub success: bool,
    pub plan_id: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub avg_score: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteItemResponse {
    pub success: bool,
    pub plan_id: String,
    pub index: usize,
    pub state: ItemState,
    pub outcome: Option<ItemOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunBatchResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: BatchReport,
}

/// Batch request surface.
pub struct BatchService {
    store: Arc<PlanStore>,
    executor: Arc<SequentialExecutor>,
}

impl BatchService {
    pub fn new(store: Arc<PlanStore>, executor: Arc<SequentialExecutor>) -> Self {
        Self { store, executor }
    }

    pub fn create_batch(&self, request: CreateBatchRequest) -> ApiResult<CreateBatchResponse> {
        let total = request.items.len();
        let plan_id = self.store.create_plan(
            request.description,
            request.background,
            request.items,
            request.metadata,
        )?;
        let plan = self.store.get_plan(&plan_id)?;
        Ok(CreateBatchResponse {
            success: true,
            plan_id,
            total,
            context_quality: plan.context_quality,
        })
    }

    pub async fn execute_item(&self, plan_id: &str, index: usize) -> ApiResult<ExecuteItemResponse> {
        let item = self.executor.execute_single(plan_id, index).await?;
        Ok(ExecuteItemResponse {
            success: true,
            plan_id: plan_id.to_string(),
            index,
            state: item.state,
            outcome: item.outcome,
        })
    }

    /// Drive the whole plan to completion.
    pub async fn run_batch(&self, plan_id: &str) -> ApiResult<RunBatchResponse> {
        let report = self.executor.run(plan_id).await?;
        Ok(RunBatchResponse {
            success: true,
            report,
        })
    }

    pub fn get_batch_status(&self, plan_id: &str) -> ApiResult<BatchStatusResponse> {
        let status = self.store.status(plan_id)?;
        Ok(BatchStatusResponse {
            success: true,
            plan_id: plan_id.to_string(),
            total: status.total,
            succeeded: status.succeeded,
            failed: status.failed,
            avg_score: status.avg_score,
            trend: status.trend,
        })
    }
}

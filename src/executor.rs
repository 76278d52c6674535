//! Sequential Executor
//!
//! Drives a batch plan to completion item by item. Items run strictly in plan
//! order so that item N's learnings reflect only items 1..N-1. A failing item
//! is recorded and skipped past, never aborting the batch; checkpoints are
//! emitted every K items; persistence to collaborators is best-effort.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::collaborators::{CalendarDraft, Checkpoint, CheckpointNotifier, ContentCalendar, KnowledgeStore};
use crate::config::{ContextConfig, ExecutorConfig, QualityConfig};
use crate::context::{ContextManager, Summarizer, Trend};
use crate::error::{OrchestratorError, PlanError};
use crate::generation::GenerationEngine;
use crate::plan::{
    FailureKind, ItemFailure, ItemOutcome, ItemState, ItemSuccess, PlanItem, PlanStore,
};
use crate::quality::QualityGate;
use crate::stream::GenerationRequest;
use crate::types::Platform;

/// Batch-level cancellation token. Once triggered, no further items start;
/// the in-flight item runs to natural completion or its own deadline.
#[derive(Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Final report for one executed batch.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchReport {
    pub plan_id: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub avg_score: f64,
    pub trend: Trend,
    pub checkpoints_emitted: usize,
}

/// Sequential, failure-tolerant batch executor.
pub struct SequentialExecutor {
    store: Arc<PlanStore>,
    engine: Arc<GenerationEngine>,
    gate: Arc<QualityGate>,
    summarizer: Arc<dyn Summarizer>,
    calendar: Option<Arc<dyn ContentCalendar>>,
    knowledge: Option<Arc<dyn KnowledgeStore>>,
    notifier: Option<Arc<dyn CheckpointNotifier>>,
    exec_cfg: ExecutorConfig,
    ctx_cfg: ContextConfig,
    quality_cfg: QualityConfig,
    cancel: CancellationFlag,
}

impl SequentialExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<PlanStore>,
        engine: Arc<GenerationEngine>,
        gate: Arc<QualityGate>,
        summarizer: Arc<dyn Summarizer>,
        exec_cfg: ExecutorConfig,
        ctx_cfg: ContextConfig,
        quality_cfg: QualityConfig,
    ) -> Self {
        Self {
            store,
            engine,
            gate,
            summarizer,
            calendar: None,
            knowledge: None,
            notifier: None,
            exec_cfg,
            ctx_cfg,
            quality_cfg,
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_calendar(mut self, calendar: Arc<dyn ContentCalendar>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeStore>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CheckpointNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Drive the whole plan. Batch-level completion is independent of
    /// per-item success: a plan where every item fails still completes.
    pub async fn run(&self, plan_id: &str) -> Result<BatchReport, PlanError> {
        let total = self.store.get_plan(plan_id)?.items.len();
        let mut ctx = ContextManager::new(
            self.ctx_cfg.clone(),
            Arc::clone(&self.summarizer),
            self.quality_cfg.max_score,
        );
        let mut checkpoints_emitted = 0usize;

        info!(plan_id = %plan_id, items = total, "batch execution started");

        for index in 0..total {
            if self.cancel.is_cancelled() {
                // Not-yet-started items still reach a terminal state.
                self.store.update_item(plan_id, index, ItemState::Running, None)?;
                self.store.update_item(
                    plan_id,
                    index,
                    ItemState::Failed,
                    Some(ItemOutcome::Failure(ItemFailure {
                        kind: FailureKind::Cancelled,
                        message: OrchestratorError::Cancelled.to_string(),
                    })),
                )?;
                continue;
            }

            self.run_item(plan_id, index, &mut ctx).await?;

            if (index + 1) % self.exec_cfg.checkpoint_interval == 0 {
                self.emit_checkpoint(plan_id, index + 1).await?;
                checkpoints_emitted += 1;
            }

            self.engine.sweep_sessions().await;
        }

        let status = self.store.status(plan_id)?;
        debug_assert_eq!(status.succeeded + status.failed, status.total);
        debug_assert_eq!(ctx.tracked(), status.succeeded);

        info!(
            plan_id = %plan_id,
            succeeded = status.succeeded,
            failed = status.failed,
            avg_score = status.avg_score,
            "batch execution completed"
        );

        Ok(BatchReport {
            plan_id: plan_id.to_string(),
            total: status.total,
            succeeded: status.succeeded,
            failed: status.failed,
            avg_score: status.avg_score,
            trend: status.trend,
            checkpoints_emitted,
        })
    }

    /// Execute a single item outside a batch run, with empty learnings.
    pub async fn execute_single(&self, plan_id: &str, index: usize) -> Result<PlanItem, PlanError> {
        let plan = self.store.get_plan(plan_id)?;
        if index >= plan.items.len() {
            return Err(PlanError::ItemOutOfRange {
                plan_id: plan_id.to_string(),
                index,
            });
        }
        let mut ctx = ContextManager::new(
            self.ctx_cfg.clone(),
            Arc::clone(&self.summarizer),
            self.quality_cfg.max_score,
        );
        self.run_item(plan_id, index, &mut ctx).await?;
        let plan = self.store.get_plan(plan_id)?;
        Ok(plan.items[index].clone())
    }

    /// Run one item through the full pipeline and record its terminal state.
    /// Only plan errors (store lookups) propagate; everything else is folded
    /// into the item outcome.
    async fn run_item(
        &self,
        plan_id: &str,
        index: usize,
        ctx: &mut ContextManager,
    ) -> Result<(), PlanError> {
        self.store.update_item(plan_id, index, ItemState::Running, None)?;
        let plan = self.store.get_plan(plan_id)?;
        let item = plan.items[index].clone();

        let learnings = ctx.get_learnings();
        let target_score = ctx.get_target_score();

        match self
            .generate_item(&plan.background, &item, learnings, target_score, plan_id)
            .await
        {
            Ok((success, platform, summary)) => {
                // Context mutation happens strictly after the terminal state
                // is decided, and only successes count toward the tracked
                // total.
                let score = success.score;
                self.store.update_item(
                    plan_id,
                    index,
                    ItemState::Succeeded,
                    Some(ItemOutcome::Success(success)),
                )?;
                ctx.add_result(summary, score, platform).await;
                debug!(plan_id = %plan_id, index, score, "item succeeded");
            }
            Err(err) => {
                error!(plan_id = %plan_id, index, error = %err, "item failed, continuing batch");
                self.store.update_item(
                    plan_id,
                    index,
                    ItemState::Failed,
                    Some(ItemOutcome::Failure(ItemFailure {
                        kind: FailureKind::from(&err),
                        message: err.to_string(),
                    })),
                )?;
            }
        }
        Ok(())
    }

    async fn generate_item(
        &self,
        background: &str,
        item: &PlanItem,
        learnings: String,
        target_score: u8,
        plan_id: &str,
    ) -> Result<(ItemSuccess, Platform, String), OrchestratorError> {
        let platform = Platform::parse(&item.platform)?;

        let request = GenerationRequest {
            platform,
            topic: item.topic.clone(),
            background: background.to_string(),
            learnings,
            target_score,
            overrides: item.overrides.clone(),
        };
        let payload = self.engine.generate(&request).await?;

        let report = self.gate.validate_and_fix(&payload.content, platform).await;

        let mut persistence_notes = Vec::new();
        let calendar_ref = match &self.calendar {
            Some(calendar) => {
                let draft = CalendarDraft {
                    content: report.content.clone(),
                    platform: platform.as_str().to_string(),
                    hook_preview: hook_preview(&report.content),
                    status: if report.needs_review {
                        "needs_review".to_string()
                    } else {
                        "scheduled".to_string()
                    },
                    review_notes: report.scoring_note.clone(),
                };
                match calendar.create_record(&draft).await {
                    Ok(record) => Some(record),
                    Err(err) => {
                        warn!(plan_id = %plan_id, error = %err, "calendar persistence failed");
                        persistence_notes.push(format!("calendar: {err}"));
                        None
                    }
                }
            }
            None => None,
        };

        let knowledge_ref = match &self.knowledge {
            Some(knowledge) => {
                let metadata = serde_json::json!({
                    "plan_id": plan_id,
                    "platform": platform.as_str(),
                    "topic": item.topic,
                    "score": report.score,
                });
                match knowledge.save_with_embedding(&report.content, &metadata).await {
                    Ok(record_id) => Some(record_id),
                    Err(err) => {
                        warn!(plan_id = %plan_id, error = %err, "knowledge persistence failed");
                        persistence_notes.push(format!("knowledge: {err}"));
                        None
                    }
                }
            }
            None => None,
        };

        let summary = format!("{}: {}", item.topic, hook_preview(&report.content));
        let success = ItemSuccess {
            content: report.content,
            score: report.score,
            needs_review: report.needs_review,
            calendar_ref,
            knowledge_ref,
            persistence_notes,
            scoring_note: report.scoring_note,
        };
        Ok((success, platform, summary))
    }

    async fn emit_checkpoint(&self, plan_id: &str, completed: usize) -> Result<(), PlanError> {
        let status = self.store.status(plan_id)?;
        let checkpoint = Checkpoint {
            plan_id: plan_id.to_string(),
            completed,
            succeeded: status.succeeded,
            failed: status.failed,
            avg_score: status.avg_score,
            trend: status.trend,
        };
        info!(
            plan_id = %plan_id,
            completed,
            succeeded = checkpoint.succeeded,
            failed = checkpoint.failed,
            trend = checkpoint.trend.as_str(),
            "checkpoint"
        );
        if let Some(notifier) = &self.notifier {
            if let Err(err) = notifier.notify(&checkpoint).await {
                warn!(plan_id = %plan_id, error = %err, "checkpoint notification failed");
            }
        }
        Ok(())
    }

    /// Garbage-collect terminal plans past the retention window.
    pub fn prune_plans(&self) -> usize {
        self.store.prune_terminal(self.exec_cfg.plan_retention())
    }
}

fn hook_preview(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or("");
    if first_line.chars().count() <= 80 {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(80).collect();
        format!("{cut}…")
    }
}

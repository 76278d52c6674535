//! Shared test doubles and harness assembly for integration tests.
//!
//! Everything here is in-memory and deterministic: a scripted generative
//! model, a scripted validator, and recording collaborators, wired through
//! the same constructors the binary uses.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use cadence::api::{BatchService, CreateBatchRequest};
use cadence::breaker::CircuitBreaker;
use cadence::collaborators::{
    CalendarDraft, Checkpoint, CheckpointNotifier, ContentCalendar, KnowledgeStore,
};
use cadence::config::{
    BreakerConfig, ContextConfig, ExecutorConfig, QualityConfig, SessionPoolConfig, StreamConfig,
};
use cadence::context::DigestSummarizer;
use cadence::error::OrchestratorError;
use cadence::executor::SequentialExecutor;
use cadence::generation::GenerationEngine;
use cadence::plan::{ItemSpec, PlanStore, RecordRef};
use cadence::quality::{ContentFixer, ContentValidator, FixOutcome, QualityIssue, Validation};
use cadence::session::{ModelConnector, SessionPool};
use cadence::stream::{
    EventStream, GenerationPayload, GenerationRequest, GenerativeModel, StreamCallDriver,
    StreamEvent,
};
use cadence::types::Platform;

/// Scripted behavior for one `start` of the generative model.
pub enum ModelBehavior {
    /// Deliver a delta and a completion carrying this content
    Complete(String),
    /// Never yield a message, so the idle timeout fires
    Hang,
    /// Fail the connection attempt outright
    Fail,
}

/// Script shared across every session the pool opens, consumed in global
/// call order. Every `start` is recorded for assertions on the request the
/// executor assembled.
#[derive(Default)]
pub struct ModelScript {
    behaviors: Mutex<VecDeque<ModelBehavior>>,
    pub requests: Mutex<Vec<RecordedRequest>>,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub topic: String,
    pub learnings: String,
    pub target_score: u8,
}

struct ScriptedModel {
    script: Arc<ModelScript>,
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn start(
        &self,
        request: &GenerationRequest,
        _resume_chars: usize,
    ) -> Result<EventStream, OrchestratorError> {
        self.script.requests.lock().push(RecordedRequest {
            topic: request.topic.clone(),
            learnings: request.learnings.clone(),
            target_score: request.target_score,
        });
        let behavior = self
            .script
            .behaviors
            .lock()
            .pop_front()
            .unwrap_or_else(|| ModelBehavior::Complete("generated post".to_string()));
        match behavior {
            ModelBehavior::Complete(content) => Ok(Box::pin(futures::stream::iter(vec![
                Ok(StreamEvent::Delta {
                    text: content.clone(),
                }),
                Ok(StreamEvent::Completed {
                    payload: GenerationPayload {
                        content,
                        model: Some("scripted".to_string()),
                    },
                }),
            ]))),
            ModelBehavior::Hang => Ok(Box::pin(futures::stream::pending())),
            ModelBehavior::Fail => Err(OrchestratorError::ProviderRequestFailed(
                "scripted failure".to_string(),
            )),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedConnector {
    script: Arc<ModelScript>,
}

#[async_trait]
impl ModelConnector for ScriptedConnector {
    async fn connect(
        &self,
        _platform: Platform,
    ) -> Result<Arc<dyn GenerativeModel>, OrchestratorError> {
        Ok(Arc::new(ScriptedModel {
            script: Arc::clone(&self.script),
        }))
    }
}

/// Scripted validation result for one `validate` call.
pub enum ScoreScript {
    Score(f64),
    /// Rubric service unreachable: the gate must degrade, not fail
    Unavailable,
}

struct ScriptedValidator {
    scores: Mutex<VecDeque<ScoreScript>>,
}

#[async_trait]
impl ContentValidator for ScriptedValidator {
    async fn validate(
        &self,
        _content: &str,
        _platform: Platform,
    ) -> Result<Validation, OrchestratorError> {
        match self
            .scores
            .lock()
            .pop_front()
            .unwrap_or(ScoreScript::Score(20.0))
        {
            ScoreScript::Score(score) => Ok(Validation {
                score,
                issues: Vec::new(),
            }),
            ScoreScript::Unavailable => Err(OrchestratorError::ValidationUnavailable(
                "rubric down".to_string(),
            )),
        }
    }
}

struct SuffixFixer;

#[async_trait]
impl ContentFixer for SuffixFixer {
    async fn fix(
        &self,
        content: &str,
        _platform: Platform,
        _issues: &[QualityIssue],
    ) -> Result<FixOutcome, OrchestratorError> {
        Ok(FixOutcome {
            content: format!("{content} [revised]"),
            estimated_score: 21.0,
        })
    }
}

pub struct RecordingCalendar {
    fail: bool,
    pub drafts: Mutex<Vec<CalendarDraft>>,
}

#[async_trait]
impl ContentCalendar for RecordingCalendar {
    async fn create_record(&self, draft: &CalendarDraft) -> Result<RecordRef, OrchestratorError> {
        if self.fail {
            return Err(OrchestratorError::PersistenceFailed(
                "calendar unreachable".to_string(),
            ));
        }
        let mut drafts = self.drafts.lock();
        drafts.push(draft.clone());
        Ok(RecordRef {
            record_id: format!("cal-{}", drafts.len()),
            url: None,
        })
    }
}

#[derive(Default)]
pub struct RecordingKnowledge {
    pub saved: Mutex<Vec<serde_json::Value>>,
}

#[async_trait]
impl KnowledgeStore for RecordingKnowledge {
    async fn save_with_embedding(
        &self,
        _content: &str,
        metadata: &serde_json::Value,
    ) -> Result<String, OrchestratorError> {
        let mut saved = self.saved.lock();
        saved.push(metadata.clone());
        Ok(format!("doc-{}", saved.len()))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub checkpoints: Mutex<Vec<Checkpoint>>,
}

#[async_trait]
impl CheckpointNotifier for RecordingNotifier {
    async fn notify(&self, checkpoint: &Checkpoint) -> Result<(), OrchestratorError> {
        self.checkpoints.lock().push(checkpoint.clone());
        Ok(())
    }
}

/// Fully wired orchestration stack over the test doubles.
pub struct Harness {
    pub service: BatchService,
    pub store: Arc<PlanStore>,
    pub executor: Arc<SequentialExecutor>,
    pub script: Arc<ModelScript>,
    pub calendar: Arc<RecordingCalendar>,
    pub knowledge: Arc<RecordingKnowledge>,
    pub notifier: Arc<RecordingNotifier>,
}

pub struct HarnessBuilder {
    behaviors: VecDeque<ModelBehavior>,
    scores: VecDeque<ScoreScript>,
    checkpoint_interval: usize,
    calendar_fails: bool,
    failure_threshold: usize,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            behaviors: VecDeque::new(),
            scores: VecDeque::new(),
            checkpoint_interval: 10,
            calendar_fails: false,
            failure_threshold: 5,
        }
    }

    pub fn model(mut self, behaviors: Vec<ModelBehavior>) -> Self {
        self.behaviors = behaviors.into();
        self
    }

    pub fn scores(mut self, scores: Vec<f64>) -> Self {
        self.scores = scores.into_iter().map(ScoreScript::Score).collect();
        self
    }

    pub fn score_scripts(mut self, scores: Vec<ScoreScript>) -> Self {
        self.scores = scores.into();
        self
    }

    pub fn checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn failing_calendar(mut self) -> Self {
        self.calendar_fails = true;
        self
    }

    pub fn failure_threshold(mut self, threshold: usize) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn build(self) -> Harness {
        let ctx_cfg = ContextConfig::default();
        let store = Arc::new(PlanStore::new(&ctx_cfg));

        let script = Arc::new(ModelScript {
            behaviors: Mutex::new(self.behaviors),
            requests: Mutex::new(Vec::new()),
        });
        let pool = Arc::new(SessionPool::new(
            SessionPoolConfig::default(),
            Arc::new(ScriptedConnector {
                script: Arc::clone(&script),
            }),
        ));
        let breaker = Arc::new(CircuitBreaker::new(
            "scripted-model",
            BreakerConfig {
                failure_threshold: self.failure_threshold,
                failure_window_ms: 60_000,
                cooldown_ms: 60_000,
            },
        ));
        // Tight timeouts so hang scenarios resolve quickly.
        let driver = StreamCallDriver::new(StreamConfig {
            idle_timeout_ms: 30,
            max_reconnects: 0,
            overall_deadline_ms: 2_000,
        });
        let engine = Arc::new(GenerationEngine::new(pool, breaker, driver));

        let gate = Arc::new(cadence::quality::QualityGate::new(
            Arc::new(ScriptedValidator {
                scores: Mutex::new(self.scores),
            }),
            Arc::new(SuffixFixer),
            QualityConfig::default(),
        ));

        let calendar = Arc::new(RecordingCalendar {
            fail: self.calendar_fails,
            drafts: Mutex::new(Vec::new()),
        });
        let knowledge = Arc::new(RecordingKnowledge::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let executor = Arc::new(
            SequentialExecutor::new(
                Arc::clone(&store),
                engine,
                gate,
                Arc::new(DigestSummarizer),
                ExecutorConfig {
                    checkpoint_interval: self.checkpoint_interval,
                    plan_retention_ms: 3_600_000,
                },
                ctx_cfg,
                QualityConfig::default(),
            )
            .with_calendar(Arc::clone(&calendar) as Arc<dyn ContentCalendar>)
            .with_knowledge(Arc::clone(&knowledge) as Arc<dyn KnowledgeStore>)
            .with_notifier(Arc::clone(&notifier) as Arc<dyn CheckpointNotifier>),
        );

        Harness {
            service: BatchService::new(Arc::clone(&store), Arc::clone(&executor)),
            store,
            executor,
            script,
            calendar,
            knowledge,
            notifier,
        }
    }
}

/// Build a batch request from `(platform, topic)` pairs.
pub fn batch_request(items: &[(&str, &str)]) -> CreateBatchRequest {
    CreateBatchRequest {
        description: "test batch".to_string(),
        background: String::new(),
        items: items
            .iter()
            .map(|(platform, topic)| ItemSpec {
                platform: platform.to_string(),
                topic: topic.to_string(),
                overrides: HashMap::new(),
            })
            .collect(),
        metadata: HashMap::new(),
    }
}

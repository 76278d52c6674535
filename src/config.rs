//! Configuration System
//!
//! Hierarchical configuration with file and environment variable overrides.
//! Every knob has a serde default so a missing or partial config file yields
//! a fully usable configuration.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;
use crate::logging::LoggingConfig;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceConfig {
    /// Streaming call driver settings
    #[serde(default)]
    pub stream: StreamConfig,

    /// Generative-model session pool settings
    #[serde(default)]
    pub sessions: SessionPoolConfig,

    /// Circuit breaker settings for the generative model dependency
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Quality gate thresholds
    #[serde(default)]
    pub quality: QualityConfig,

    /// Cross-item context accumulation settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Sequential executor settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// External collaborator endpoints
    #[serde(default)]
    pub collaborators: CollaboratorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Streaming call driver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Maximum silence between incremental messages before a reconnect cycle
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Reconnect-and-resume cycles allowed before surfacing a timeout error
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: usize,

    /// Hard ceiling on total elapsed time for one generation call
    #[serde(default = "default_deadline_ms")]
    pub overall_deadline_ms: u64,
}

fn default_idle_timeout_ms() -> u64 {
    45_000
}

fn default_max_reconnects() -> usize {
    2
}

fn default_deadline_ms() -> u64 {
    240_000
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_idle_timeout_ms(),
            max_reconnects: default_max_reconnects(),
            overall_deadline_ms: default_deadline_ms(),
        }
    }
}

impl StreamConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn overall_deadline(&self) -> Duration {
        Duration::from_millis(self.overall_deadline_ms)
    }
}

/// Session pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPoolConfig {
    /// Hard cap on concurrently open sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Idle time after which a session is evicted proactively
    #[serde(default = "default_idle_ttl_ms")]
    pub idle_ttl_ms: u64,

    /// Interval of the background TTL sweep
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_max_sessions() -> usize {
    10
}

fn default_idle_ttl_ms() -> u64 {
    300_000
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}

impl Default for SessionPoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            idle_ttl_ms: default_idle_ttl_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl SessionPoolConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_millis(self.idle_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures within the window that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,

    /// Window in which consecutive failures are counted
    #[serde(default = "default_failure_window_ms")]
    pub failure_window_ms: u64,

    /// Cooldown before an open circuit admits a half-open trial call
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

fn default_failure_threshold() -> usize {
    5
}

fn default_failure_window_ms() -> u64 {
    60_000
}

fn default_cooldown_ms() -> u64 {
    30_000
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            failure_window_ms: default_failure_window_ms(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl BreakerConfig {
    pub fn failure_window(&self) -> Duration {
        Duration::from_millis(self.failure_window_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Quality gate thresholds on the fixed 0-25 rubric scale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Rubric maximum
    #[serde(default = "default_max_score")]
    pub max_score: f64,

    /// Below this score the single fix pass runs
    #[serde(default = "default_fix_threshold")]
    pub fix_threshold: f64,

    /// Per-platform overrides of the fix threshold
    #[serde(default)]
    pub platform_fix_thresholds: HashMap<String, f64>,

    /// Below this score the item is flagged for human review
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,

    /// Score assigned when the scoring dependency is unreachable
    #[serde(default = "default_fallback_score")]
    pub fallback_score: f64,
}

fn default_max_score() -> f64 {
    25.0
}

fn default_fix_threshold() -> f64 {
    18.0
}

fn default_review_threshold() -> f64 {
    15.0
}

fn default_fallback_score() -> f64 {
    15.0
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_score: default_max_score(),
            fix_threshold: default_fix_threshold(),
            platform_fix_thresholds: HashMap::new(),
            review_threshold: default_review_threshold(),
            fallback_score: default_fallback_score(),
        }
    }
}

impl QualityConfig {
    pub fn fix_threshold_for(&self, platform: &str) -> f64 {
        self.platform_fix_thresholds
            .get(platform)
            .copied()
            .unwrap_or(self.fix_threshold)
    }
}

/// Cross-item context settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Entry count past which compaction runs
    #[serde(default = "default_compaction_interval")]
    pub compaction_interval: usize,

    /// Most recent entries kept verbatim through a compaction
    #[serde(default = "default_retained_entries")]
    pub retained_entries: usize,

    /// Target score handed to the very first item of a batch
    #[serde(default = "default_baseline_target")]
    pub baseline_target: u8,

    /// Background material at or above this size classifies a plan as `rich`
    #[serde(default = "default_rich_background_chars")]
    pub rich_background_chars: usize,
}

fn default_compaction_interval() -> usize {
    10
}

fn default_retained_entries() -> usize {
    5
}

fn default_baseline_target() -> u8 {
    18
}

fn default_rich_background_chars() -> usize {
    400
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            compaction_interval: default_compaction_interval(),
            retained_entries: default_retained_entries(),
            baseline_target: default_baseline_target(),
            rich_background_chars: default_rich_background_chars(),
        }
    }
}

/// Sequential executor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Checkpoint notification interval, in items
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,

    /// Retention of fully terminal plans before garbage collection
    #[serde(default = "default_plan_retention_ms")]
    pub plan_retention_ms: u64,
}

fn default_checkpoint_interval() -> usize {
    10
}

fn default_plan_retention_ms() -> u64 {
    3_600_000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: default_checkpoint_interval(),
            plan_retention_ms: default_plan_retention_ms(),
        }
    }
}

impl ExecutorConfig {
    pub fn plan_retention(&self) -> Duration {
        Duration::from_millis(self.plan_retention_ms)
    }
}

/// External collaborator endpoints. All optional except the model endpoint,
/// which the binary requires; absent collaborators are skipped best-effort.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollaboratorConfig {
    /// Generative model base URL
    pub model_url: Option<String>,

    /// Generative model API key
    pub model_api_key: Option<String>,

    /// Quality rubric service base URL (validation and fix passes)
    pub rubric_url: Option<String>,

    /// Content calendar base URL
    pub calendar_url: Option<String>,

    /// Knowledge/vector store base URL
    pub knowledge_url: Option<String>,

    /// Checkpoint notification webhook URL
    pub notify_url: Option<String>,
}

impl CadenceConfig {
    /// Load configuration from an optional TOML file with `CADENCE_`
    /// environment variable overrides (e.g. `CADENCE_STREAM__IDLE_TIMEOUT_MS`).
    pub fn load(path: Option<&Path>) -> Result<Self, OrchestratorError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("CADENCE")
                .separator("__")
                .try_parsing(true),
        );
        let loaded = builder.build()?;
        let cfg: CadenceConfig = loaded.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.sessions.max_sessions == 0 {
            return Err(OrchestratorError::ConfigError(
                "sessions.max_sessions must be at least 1".to_string(),
            ));
        }
        if self.quality.review_threshold > self.quality.fix_threshold {
            return Err(OrchestratorError::ConfigError(
                "quality.review_threshold cannot exceed quality.fix_threshold".to_string(),
            ));
        }
        if self.context.retained_entries >= self.context.compaction_interval {
            return Err(OrchestratorError::ConfigError(
                "context.retained_entries must be below context.compaction_interval".to_string(),
            ));
        }
        if self.executor.checkpoint_interval == 0 {
            return Err(OrchestratorError::ConfigError(
                "executor.checkpoint_interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

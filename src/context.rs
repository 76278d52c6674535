//! Context Manager
//!
//! Accumulates per-item learnings across a batch, derives the target quality
//! score for the next item, and compacts history so the learnings text stays
//! bounded regardless of batch length. The numeric score history survives
//! compaction untouched; only the textual entries are folded.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ContextConfig;
use crate::error::OrchestratorError;
use crate::types::Platform;

/// One learning recorded after a completed item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningEntry {
    pub summary: String,
    pub score: f64,
    /// None for synthesized compaction entries spanning platforms
    pub platform: Option<Platform>,
    pub compacted: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Summarization capability used by compaction.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, entries: &[LearningEntry]) -> Result<String, OrchestratorError>;
}

/// Deterministic bounded digest, used directly or as the fallback when a
/// model-backed summarizer is unreachable. Compaction must never block on the
/// model being up.
pub struct DigestSummarizer;

#[async_trait]
impl Summarizer for DigestSummarizer {
    async fn summarize(&self, entries: &[LearningEntry]) -> Result<String, OrchestratorError> {
        Ok(digest(entries))
    }
}

fn digest(entries: &[LearningEntry]) -> String {
    let count = entries.len();
    let avg = if count == 0 {
        0.0
    } else {
        entries.iter().map(|e| e.score).sum::<f64>() / count as f64
    };
    let best = entries
        .iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .map(|e| truncate(&e.summary, 80))
        .unwrap_or_default();
    format!("Digest of {count} earlier posts (avg score {avg:.1}). Strongest: {best}")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}

/// Quality trajectory over a score history, comparing the mean of the first
/// half against the second half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

impl Trend {
    const EPSILON: f64 = 0.5;

    pub fn from_scores(scores: &[f64]) -> Trend {
        if scores.len() < 2 {
            return Trend::Stable;
        }
        let mid = scores.len() / 2;
        let first = scores[..mid].iter().sum::<f64>() / mid as f64;
        let second = scores[mid..].iter().sum::<f64>() / (scores.len() - mid) as f64;
        if second - first > Self::EPSILON {
            Trend::Improving
        } else if first - second > Self::EPSILON {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Trend::Improving => "improving",
            Trend::Stable => "stable",
            Trend::Declining => "declining",
        }
    }
}

/// Aggregate view over the full score history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextStats {
    pub count: usize,
    pub avg_score: f64,
    pub trend: Trend,
}

/// Per-plan learning accumulator. Mutated only by the sequential executor,
/// strictly after an item reaches a terminal state.
pub struct ContextManager {
    cfg: ContextConfig,
    summarizer: Arc<dyn Summarizer>,
    entries: Vec<LearningEntry>,
    scores: Vec<f64>,
    compactions: u32,
    max_score: f64,
}

impl ContextManager {
    pub fn new(cfg: ContextConfig, summarizer: Arc<dyn Summarizer>, max_score: f64) -> Self {
        Self {
            cfg,
            summarizer,
            entries: Vec::new(),
            scores: Vec::new(),
            compactions: 0,
            max_score,
        }
    }

    /// Record a completed item. Triggers compaction once the entry count
    /// exceeds the configured interval.
    pub async fn add_result(&mut self, summary: String, score: f64, platform: Platform) {
        self.entries.push(LearningEntry {
            summary,
            score,
            platform: Some(platform),
            compacted: false,
            recorded_at: Utc::now(),
        });
        self.scores.push(score);

        if self.entries.len() > self.cfg.compaction_interval {
            self.compact().await;
        }
    }

    /// Learnings text fed forward into the next generation call. Bounded by
    /// compaction independent of batch length.
    pub fn get_learnings(&self) -> String {
        self.entries
            .iter()
            .map(|entry| match entry.platform {
                Some(platform) => {
                    format!("- [{platform}] {} (score {:.1})", entry.summary, entry.score)
                }
                None => format!("- {}", entry.summary),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Target score for the next item: the fixed baseline for the first item,
    /// then ceil(average of prior scores) + 1, capped at the rubric maximum.
    pub fn get_target_score(&self) -> u8 {
        if self.scores.is_empty() {
            return self.cfg.baseline_target;
        }
        let avg = self.scores.iter().sum::<f64>() / self.scores.len() as f64;
        let target = avg.ceil() + 1.0;
        target.min(self.max_score) as u8
    }

    pub fn stats(&self) -> ContextStats {
        let count = self.scores.len();
        let avg_score = if count == 0 {
            0.0
        } else {
            self.scores.iter().sum::<f64>() / count as f64
        };
        ContextStats {
            count,
            avg_score,
            trend: Trend::from_scores(&self.scores),
        }
    }

    /// Number of posts tracked. Equals succeeded items, never attempts.
    pub fn tracked(&self) -> usize {
        self.scores.len()
    }

    pub fn compactions(&self) -> u32 {
        self.compactions
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Fold everything older than the retained window (including a previous
    /// compaction entry) into a single synthesized entry. Idempotent: the
    /// score history is untouched and re-running on compacted state cannot
    /// grow the entry list.
    async fn compact(&mut self) {
        if self.entries.len() <= self.cfg.retained_entries {
            return;
        }
        let retained = self
            .entries
            .split_off(self.entries.len() - self.cfg.retained_entries);
        let folded = std::mem::replace(&mut self.entries, retained);

        let summary = match self.summarizer.summarize(&folded).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(error = %err, "summarizer unavailable, using local digest");
                digest(&folded)
            }
        };
        let avg = folded.iter().map(|e| e.score).sum::<f64>() / folded.len() as f64;

        self.entries.insert(
            0,
            LearningEntry {
                summary,
                score: avg,
                platform: None,
                compacted: true,
                recorded_at: Utc::now(),
            },
        );
        self.compactions += 1;
        debug!(
            folded = folded.len(),
            retained = self.entries.len(),
            compactions = self.compactions,
            "compacted learning history"
        );
    }
}

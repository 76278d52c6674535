//! Quality Gate
//!
//! Single-pass validate-then-fix workflow. Validation scores content on a
//! fixed 0-25 rubric; a score below the platform threshold triggers exactly
//! one fix pass addressing every listed issue. A failing scoring dependency
//! degrades to a fallback score instead of failing the item, because losing
//! content is worse than losing a score.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::QualityConfig;
use crate::error::OrchestratorError;
use crate::types::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Minor,
    Major,
    Critical,
}

/// One structured finding from the validation rubric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: IssueSeverity,
    /// The offending excerpt
    pub excerpt: String,
    /// Suggested replacement text
    pub suggestion: String,
}

/// Validation outcome: a rubric score and the issues behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validation {
    pub score: f64,
    #[serde(default)]
    pub issues: Vec<QualityIssue>,
}

/// Result of the single fix pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixOutcome {
    pub content: String,
    pub estimated_score: f64,
}

#[async_trait]
pub trait ContentValidator: Send + Sync {
    async fn validate(
        &self,
        content: &str,
        platform: Platform,
    ) -> Result<Validation, OrchestratorError>;
}

#[async_trait]
pub trait ContentFixer: Send + Sync {
    /// Rewrite `content` addressing every listed issue.
    async fn fix(
        &self,
        content: &str,
        platform: Platform,
        issues: &[QualityIssue],
    ) -> Result<FixOutcome, OrchestratorError>;
}

/// Outcome of the quality gate for one item.
///
/// `score` is always the ORIGINAL validation score, kept for audit and status
/// purposes even when the content was revised by the fix pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub content: String,
    pub score: f64,
    pub issues: Vec<QualityIssue>,
    /// Whether the fix pass rewrote the content
    pub fixed: bool,
    /// Whether the item should be routed to human review
    pub needs_review: bool,
    /// Set when automated scoring failed and the fallback score was used
    pub scoring_note: Option<String>,
}

/// Validate-and-fix workflow, one pass, no iteration loop.
pub struct QualityGate {
    validator: std::sync::Arc<dyn ContentValidator>,
    fixer: std::sync::Arc<dyn ContentFixer>,
    cfg: QualityConfig,
}

impl QualityGate {
    pub fn new(
        validator: std::sync::Arc<dyn ContentValidator>,
        fixer: std::sync::Arc<dyn ContentFixer>,
        cfg: QualityConfig,
    ) -> Self {
        Self {
            validator,
            fixer,
            cfg,
        }
    }

    /// Run validation and at most one fix pass. Never fails: validation
    /// infrastructure errors degrade to the configured fallback score.
    pub async fn validate_and_fix(&self, content: &str, platform: Platform) -> QualityReport {
        let validation = match self.validator.validate(content, platform).await {
            Ok(validation) => validation,
            Err(err) => {
                warn!(
                    platform = %platform,
                    error = %err,
                    fallback_score = self.cfg.fallback_score,
                    "automated scoring failed, using fallback score"
                );
                return QualityReport {
                    content: content.to_string(),
                    score: self.cfg.fallback_score,
                    issues: Vec::new(),
                    fixed: false,
                    // The score was never measured, so the content always
                    // goes to human review.
                    needs_review: true,
                    scoring_note: Some(format!("automated scoring failed: {err}")),
                };
            }
        };

        let score = validation.score;
        let threshold = self.cfg.fix_threshold_for(platform.as_str());
        let mut final_content = content.to_string();
        let mut fixed = false;

        if score < threshold {
            match self
                .fixer
                .fix(content, platform, &validation.issues)
                .await
            {
                Ok(outcome) => {
                    debug!(
                        platform = %platform,
                        original_score = score,
                        estimated_score = outcome.estimated_score,
                        issues = validation.issues.len(),
                        "fix pass applied"
                    );
                    final_content = outcome.content;
                    fixed = true;
                }
                Err(err) => {
                    // Non-fatal: the original content still ships.
                    warn!(platform = %platform, error = %err, "fix pass failed, keeping original content");
                }
            }
        }

        QualityReport {
            content: final_content,
            score,
            issues: validation.issues,
            fixed,
            needs_review: score < self.cfg.review_threshold,
            scoring_note: None,
        }
    }
}

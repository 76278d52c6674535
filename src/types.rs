//! Shared identifiers and value types.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;

/// Target platform for a generated piece of content.
///
/// Plan items carry the platform as a raw string so that an unrecognized
/// platform fails the individual item at execution time instead of rejecting
/// the whole batch at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    LinkedIn,
    Twitter,
    Instagram,
    Facebook,
}

impl Platform {
    pub fn parse(value: &str) -> Result<Self, OrchestratorError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "linkedin" => Ok(Platform::LinkedIn),
            "twitter" | "x" => Ok(Platform::Twitter),
            "instagram" => Ok(Platform::Instagram),
            "facebook" => Ok(Platform::Facebook),
            other => Err(OrchestratorError::UnknownPlatform(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::LinkedIn => "linkedin",
            Platform::Twitter => "twitter",
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static PLAN_COUNTER: AtomicU64 = AtomicU64::new(1);
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn new_plan_id() -> String {
    let ts = now_millis();
    let pid = std::process::id();
    let seq = PLAN_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("plan-{ts}-{pid}-{seq}")
}

pub fn new_session_id() -> String {
    let ts = now_millis();
    let seq = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("sess-{ts}-{seq}")
}

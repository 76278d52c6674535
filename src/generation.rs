//! Generation Engine
//!
//! Ties the session pool, circuit breaker, and streaming call driver together
//! for one generation call. The breaker wraps the pool: while the circuit is
//! open, calls fail fast with a distinct error instead of attempting and
//! timing out.

use std::sync::Arc;

use tracing::debug;

use crate::breaker::CircuitBreaker;
use crate::error::OrchestratorError;
use crate::session::SessionPool;
use crate::stream::{GenerationPayload, GenerationRequest, StreamCallDriver};

pub struct GenerationEngine {
    pool: Arc<SessionPool>,
    breaker: Arc<CircuitBreaker>,
    driver: StreamCallDriver,
}

impl GenerationEngine {
    pub fn new(pool: Arc<SessionPool>, breaker: Arc<CircuitBreaker>, driver: StreamCallDriver) -> Self {
        Self {
            pool,
            breaker,
            driver,
        }
    }

    /// Execute one generation call through a pooled session.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationPayload, OrchestratorError> {
        self.breaker.try_acquire()?;

        let session = match self.pool.acquire(request.platform).await {
            Ok(session) => session,
            Err(err) => {
                self.breaker.record_failure();
                return Err(err);
            }
        };

        debug!(
            session_id = %session.id,
            platform = %request.platform,
            target_score = request.target_score,
            "starting generation call"
        );

        match self.driver.call(session.client.as_ref(), request).await {
            Ok(payload) => {
                self.breaker.record_success();
                self.pool.touch(&session.id);
                Ok(payload)
            }
            Err(err) => {
                self.breaker.record_failure();
                // A session that failed mid-stream is not routed to again.
                self.pool.complete(&session.id).await;
                Err(err)
            }
        }
    }

    /// Evict idle sessions; called by the executor between items.
    pub async fn sweep_sessions(&self) -> usize {
        self.pool.sweep_idle().await
    }

    pub async fn shutdown(&self) {
        self.pool.drain().await;
    }
}

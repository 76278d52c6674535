//! Session Pool
//!
//! Bounded set of live generative-model connections with LRU eviction and
//! TTL-based sweeping. Sessions are created lazily on first use per platform
//! and closed on eviction, explicit completion, or shutdown. The executor is
//! the only caller, so the internal map only needs a mutex for safety against
//! the background TTL sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::SessionPoolConfig;
use crate::error::OrchestratorError;
use crate::stream::GenerativeModel;
use crate::types::{new_session_id, Platform};

/// Connection factory for the generative model.
#[async_trait::async_trait]
pub trait ModelConnector: Send + Sync {
    async fn connect(
        &self,
        platform: Platform,
    ) -> Result<Arc<dyn GenerativeModel>, OrchestratorError>;
}

struct Session {
    id: String,
    platform: Platform,
    client: Arc<dyn GenerativeModel>,
    created_at: Instant,
    last_used: Instant,
}

/// Checked-out view of a pooled session.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    pub client: Arc<dyn GenerativeModel>,
}

/// Bounded session pool with LRU eviction and idle TTL.
pub struct SessionPool {
    cfg: SessionPoolConfig,
    connector: Arc<dyn ModelConnector>,
    inner: Mutex<HashMap<String, Session>>,
}

impl SessionPool {
    pub fn new(cfg: SessionPoolConfig, connector: Arc<dyn ModelConnector>) -> Self {
        Self {
            cfg,
            connector,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire a session bound to `platform`, reusing the most recently used
    /// match or connecting a new one. Connecting may evict the LRU session
    /// when the pool is at capacity; eviction never surfaces to the caller.
    pub async fn acquire(&self, platform: Platform) -> Result<SessionHandle, OrchestratorError> {
        if let Some(handle) = self.reuse(platform) {
            debug!(session_id = %handle.id, platform = %platform, "reusing pooled session");
            return Ok(handle);
        }

        // Connect outside the lock; the map is only held for bookkeeping.
        let client = self.connector.connect(platform).await?;
        let id = new_session_id();
        let now = Instant::now();

        let evicted = {
            let mut inner = self.inner.lock();
            let mut evicted = Vec::new();
            while inner.len() >= self.cfg.max_sessions {
                let lru = inner
                    .values()
                    .min_by_key(|s| s.last_used)
                    .map(|s| s.id.clone());
                match lru {
                    Some(lru_id) => {
                        if let Some(session) = inner.remove(&lru_id) {
                            evicted.push(session);
                        }
                    }
                    None => break,
                }
            }
            inner.insert(
                id.clone(),
                Session {
                    id: id.clone(),
                    platform,
                    client: Arc::clone(&client),
                    created_at: now,
                    last_used: now,
                },
            );
            evicted
        };

        for session in evicted {
            info!(
                session_id = %session.id,
                platform = %session.platform,
                age_ms = session.created_at.elapsed().as_millis() as u64,
                "evicting least-recently-used session"
            );
            Self::close_session(session).await;
        }

        debug!(session_id = %id, platform = %platform, "opened new session");
        Ok(SessionHandle { id, client })
    }

    fn reuse(&self, platform: Platform) -> Option<SessionHandle> {
        let mut inner = self.inner.lock();
        let id = inner
            .values()
            .filter(|s| s.platform == platform)
            .max_by_key(|s| s.last_used)
            .map(|s| s.id.clone())?;
        let session = inner.get_mut(&id)?;
        session.last_used = Instant::now();
        Some(SessionHandle {
            id: session.id.clone(),
            client: Arc::clone(&session.client),
        })
    }

    /// Refresh the last-used time of a session after a successful call.
    pub fn touch(&self, session_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(session) = inner.get_mut(session_id) {
            session.last_used = Instant::now();
        }
    }

    /// Explicitly complete a session, removing it from future routing.
    pub async fn complete(&self, session_id: &str) {
        let session = self.inner.lock().remove(session_id);
        if let Some(session) = session {
            debug!(session_id = %session.id, "completing session");
            Self::close_session(session).await;
        }
    }

    /// Evict every session idle past the TTL. Returns the evicted count.
    pub async fn sweep_idle(&self) -> usize {
        let ttl = self.cfg.idle_ttl();
        let expired: Vec<Session> = {
            let mut inner = self.inner.lock();
            let ids: Vec<String> = inner
                .values()
                .filter(|s| s.last_used.elapsed() >= ttl)
                .map(|s| s.id.clone())
                .collect();
            ids.into_iter().filter_map(|id| inner.remove(&id)).collect()
        };
        let count = expired.len();
        for session in expired {
            info!(session_id = %session.id, platform = %session.platform, "evicting idle session");
            Self::close_session(session).await;
        }
        count
    }

    /// Close every session. Called on shutdown.
    pub async fn drain(&self) {
        let all: Vec<Session> = self.inner.lock().drain().map(|(_, s)| s).collect();
        for session in all {
            Self::close_session(session).await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Spawn the background TTL sweeper. The handle should be aborted on
    /// shutdown.
    pub fn spawn_ttl_sweeper(pool: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = pool.cfg.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = pool.sweep_idle().await;
                if evicted > 0 {
                    debug!(evicted, "ttl sweep evicted idle sessions");
                }
            }
        })
    }

    async fn close_session(session: Session) {
        if let Err(err) = session.client.close().await {
            warn!(session_id = %session.id, error = %err, "failed to close session cleanly");
        }
    }
}

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{Credentials, ProvideCredentials};
use crate::error::Result;
use crate::time::{SharedTimeSource, system_time_source};

/// Credentials are refreshed this long before they actually expire.
pub const DEFAULT_EXPIRY_BUFFER: Duration = Duration::from_secs(10);

/// Caches the credentials of an inner provider until they expire.
///
/// The lock is held across both the validity check and the refresh, so any
/// number of concurrent callers cause at most one fetch. The cache is only
/// written once a fetch completes; dropping a caller mid-refresh leaves it as
/// it was.
pub struct CachedProvider {
    inner: Arc<dyn ProvideCredentials>,
    cached: Mutex<Option<Credentials>>,
    time: SharedTimeSource,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn ProvideCredentials>) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
            time: system_time_source(),
        }
    }

    /// Seed the cache with credentials that were already fetched.
    pub fn with_initial(self, credentials: Credentials) -> Self {
        Self {
            cached: Mutex::new(Some(credentials)),
            ..self
        }
    }

    pub fn with_time_source(mut self, time: SharedTimeSource) -> Self {
        self.time = time;
        self
    }

    pub async fn credentials(&self) -> Result<Credentials> {
        let mut cached = self.cached.lock().await;

        if let Some(creds) = cached.as_ref() {
            if !creds.is_expired_at(self.time.now(), DEFAULT_EXPIRY_BUFFER) {
                return Ok(creds.clone());
            }
            debug!("Cached credentials expired, refreshing");
        }

        let fresh = self.inner.provide_credentials().await?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drop the cached credentials so the next call fetches again.
    pub async fn invalidate(&self) {
        debug!("Invalidating cached credentials");
        *self.cached.lock().await = None;
    }
}

impl fmt::Debug for CachedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedProvider")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProvideCredentials for CachedProvider {
    async fn provide_credentials(&self) -> Result<Credentials> {
        self.credentials().await
    }
}

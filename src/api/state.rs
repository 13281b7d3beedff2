//! Shared API state
//!
//! Holds the configuration, the artifact cache, and the capture lock.
//! Artifacts load once on first use and are swapped atomically when a
//! training run completes, so concurrent inferences never observe a torn
//! artifact set. The capture semaphore has a single permit: two concurrent
//! captures on the shared interface would contend for the same output file.

use std::sync::Arc;

use tokio::sync::{RwLock, Semaphore};

use super::auth::AuthService;
use crate::config::Config;
use crate::error::Result;
use crate::model::{ArtifactStore, Artifacts};

pub struct AppState {
    pub config: Config,
    pub store: ArtifactStore,
    pub auth: AuthService,
    pub capture_lock: Semaphore,
    artifacts: RwLock<Option<Arc<Artifacts>>>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let store = ArtifactStore::new(&config.model.model_dir);
        let auth = AuthService::from_config(&config.auth)?;
        Ok(Self {
            config,
            store,
            auth,
            capture_lock: Semaphore::new(1),
            artifacts: RwLock::new(None),
        })
    }

    /// The active artifact set, loading it on first use. Serving paths only
    /// ever take the read lock once loaded.
    pub async fn artifacts(&self) -> Result<Arc<Artifacts>> {
        if let Some(artifacts) = self.artifacts.read().await.as_ref() {
            return Ok(artifacts.clone());
        }

        let mut guard = self.artifacts.write().await;
        if let Some(artifacts) = guard.as_ref() {
            return Ok(artifacts.clone());
        }
        let loaded = Arc::new(self.store.load()?);
        *guard = Some(loaded.clone());
        Ok(loaded)
    }

    /// Swap in a freshly trained artifact set.
    pub async fn replace_artifacts(&self, artifacts: Artifacts) {
        *self.artifacts.write().await = Some(Arc::new(artifacts));
    }
}

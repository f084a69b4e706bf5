//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::DashboardConfig;
use crate::services::media::MediaStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: DashboardConfig,
    pool: PgPool,
    media: MediaStore,
}

impl AppState {
    /// Create the state; the media store writes under `config.media_root`.
    #[must_use]
    pub fn new(config: DashboardConfig, pool: PgPool) -> Self {
        let media = MediaStore::new(config.media_root.clone());
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                media,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DashboardConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Product image storage.
    #[must_use]
    pub fn media(&self) -> &MediaStore {
        &self.inner.media
    }
}

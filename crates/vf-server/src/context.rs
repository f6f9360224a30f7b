//! Application context shared by all handlers and workers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use vf_av::ToolRegistry;
use vf_core::config::Config;
use vf_db::pool::DbPool;

use crate::catalog::VideoListCache;
use crate::jwt::JwtService;
use crate::mailer::Mailer;
use crate::middleware::rate_limit::{create_limiter, SharedLimiter};

/// Application context shared by all request handlers (via Axum state) and
/// by queue workers.
///
/// Cheaply cloneable because it only holds `Arc`s.
#[derive(Clone)]
pub struct AppContext {
    /// Database connection pool.
    pub db: DbPool,
    /// Immutable application configuration snapshot.
    pub config: Arc<Config>,
    /// External tool registry (ffmpeg, ffprobe).
    pub tools: Arc<ToolRegistry>,
    pub jwt: Arc<JwtService>,
    pub mailer: Arc<dyn Mailer>,
    /// Serialized catalog list cache.
    pub video_cache: Arc<VideoListCache>,
    /// Shared limiter for the credential endpoints.
    pub auth_limiter: SharedLimiter,
}

impl AppContext {
    pub fn new(config: Config, db: DbPool, tools: ToolRegistry, mailer: Arc<dyn Mailer>) -> Self {
        let jwt = JwtService::new(&config.auth);
        let video_cache =
            VideoListCache::new(Duration::from_secs(config.cache.video_list_ttl_secs));
        let auth_limiter = create_limiter(config.auth.rate_limit_per_minute);

        Self {
            db,
            config: Arc::new(config),
            tools: Arc::new(tools),
            jwt: Arc::new(jwt),
            mailer,
            video_cache: Arc::new(video_cache),
            auth_limiter,
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.config.server.media_root
    }
}

/// Context over an in-memory database with a recording mailer.
#[cfg(test)]
pub(crate) fn test_context() -> AppContext {
    let mut config = Config::default();
    config.auth.bcrypt_cost = 4;
    config.server.media_root = std::env::temp_dir().join(format!("vf-test-{}", uuid::Uuid::new_v4()));
    let db = vf_db::pool::init_memory_pool().unwrap();
    AppContext::new(
        config,
        db,
        ToolRegistry::default(),
        Arc::new(crate::mailer::MemoryMailer::default()),
    )
}

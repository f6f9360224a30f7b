//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates an in-memory DB, a temporary media
//! root, a recording mailer and a full [`AppContext`]. The [`with_server`]
//! constructor starts Axum on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use vf_av::ToolRegistry;
use vf_core::config::Config;
use vf_core::{Category, QueueName};
use vf_db::models::{NewUser, NewVideo, User, Video};
use vf_db::pool::{init_memory_pool, DbPool};
use vf_server::context::AppContext;
use vf_server::mailer::MemoryMailer;
use vf_server::router::build_router;

pub const PASSWORD: &str = "Zebra-Kite-42";

/// Test harness wrapping a fully-constructed [`AppContext`] backed by an
/// in-memory database.
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    pub mailer: Arc<MemoryMailer>,
    /// Keeps the media root alive for the lifetime of the harness.
    pub media: tempfile::TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(mut config: Config) -> Self {
        let media = tempfile::tempdir().expect("failed to create media root");
        config.server.media_root = media.path().to_path_buf();
        config.auth.bcrypt_cost = 4;

        let db = init_memory_pool().expect("failed to create in-memory pool");
        let mailer = Arc::new(MemoryMailer::default());
        let ctx = AppContext::new(config, db.clone(), ToolRegistry::default(), mailer.clone());

        Self {
            ctx,
            db,
            mailer,
            media,
        }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::with_server_config(Config::default()).await
    }

    /// Start an Axum server with custom config on a random port.
    pub async fn with_server_config(mut config: Config) -> (Self, SocketAddr) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        // Absolute links in responses point back at this server.
        config.server.site_url = format!("http://{addr}");
        let harness = Self::with_config(config);

        let app = build_router(harness.ctx.clone());
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .ok();
        });

        (harness, addr)
    }

    /// Get a database connection from the pool.
    pub fn conn(&self) -> vf_db::pool::PooledConnection {
        vf_db::pool::get_conn(&self.db).expect("failed to get db connection")
    }

    pub fn create_user(&self, email: &str, active: bool, staff: bool) -> User {
        let hash = vf_server::accounts::hash_password(PASSWORD, 4).unwrap();
        vf_db::queries::users::create_user(
            &self.conn(),
            &NewUser {
                email,
                username: Some(email),
                password_hash: &hash,
                is_active: active,
                is_staff: staff,
                is_superuser: staff,
            },
        )
        .unwrap()
    }

    pub fn create_video(&self, title: &str, video_file: Option<&str>) -> Video {
        vf_db::queries::videos::create_video(
            &self.conn(),
            &NewVideo {
                title: title.to_string(),
                description: format!("{title} description"),
                category: Category::Drama,
                video_file: video_file.map(String::from),
                ..Default::default()
            },
        )
        .unwrap()
    }

    /// Write a file below the media root.
    pub fn write_media(&self, rel: &str, bytes: &[u8]) {
        let path = self.media.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    /// Run queued jobs until the queue is empty.
    pub async fn drain_queue(&self) -> usize {
        let mut n = 0;
        while vf_server::worker::work_one(&self.ctx, &QueueName::ALL, "test-worker")
            .await
            .unwrap()
        {
            n += 1;
        }
        n
    }
}

/// Client that keeps cookies and does not follow redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Log in `email` with [`PASSWORD`] on a cookie-keeping client.
pub async fn login(addr: SocketAddr, email: &str) -> reqwest::Client {
    let client = client();
    let resp = client
        .post(format!("http://{addr}/api/login/"))
        .json(&serde_json::json!({ "email": email, "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200, "login failed for {email}");
    client
}

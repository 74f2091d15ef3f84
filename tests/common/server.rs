//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own job database.

use super::constants::*;
use super::fakes::{FakeAiClient, FixtureContentStore};
use folio_server::ai::AiClient;
use folio_server::job_queue::templates::{default_registry, TemplateDeps};
use folio_server::job_queue::{JobQueue, JobStatusStore, SqliteJobStatusStore};
use folio_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

/// Knobs for [`TestServer::spawn_with`].
#[derive(Default)]
pub struct ServerFixture {
    /// Reuse an existing database directory, e.g. to simulate a restart.
    pub db_dir: Option<PathBuf>,
    /// Hold every model call until a permit is added.
    pub gate: Option<Arc<Semaphore>>,
}

/// Test server instance with an isolated job database
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Direct handle to the queue behind the server
    pub queue: JobQueue,

    /// Directory holding jobs.db
    pub db_dir: PathBuf,

    // Private fields - keep resources alive until drop
    _temp_db_dir: Option<TempDir>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port
    pub async fn spawn() -> Self {
        Self::spawn_with(ServerFixture::default()).await
    }

    /// Spawns a test server configured by `fixture`
    ///
    /// # Panics
    ///
    /// Panics if the database cannot be opened, the port cannot be bound, or
    /// the server doesn't become ready within timeout.
    pub async fn spawn_with(fixture: ServerFixture) -> Self {
        let (temp_db_dir, db_dir) = match fixture.db_dir {
            Some(dir) => (None, dir),
            None => {
                let dir = TempDir::new().expect("Failed to create temp dir");
                let path = dir.path().to_path_buf();
                (Some(dir), path)
            }
        };

        let store: Arc<dyn JobStatusStore> = Arc::new(
            SqliteJobStatusStore::new(db_dir.join("jobs.db")).expect("Failed to open job store"),
        );

        let ai: Arc<dyn AiClient> = match fixture.gate {
            Some(gate) => Arc::new(FakeAiClient::gated(gate)),
            None => Arc::new(FakeAiClient::default()),
        };
        let registry = default_registry(TemplateDeps {
            content: Arc::new(FixtureContentStore::default()),
            ai,
        });
        let queue = JobQueue::start(store, registry).expect("Failed to start job queue");

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            metrics_port: 0,
            requests_logging_level: RequestsLoggingLevel::None,
            public_base_url: Some(base_url.clone()),
        };

        let app = make_app(config, queue.clone()).expect("Failed to build app");

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            queue,
            db_dir,
            _temp_db_dir: temp_db_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::{fmt::Debug, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use folio_server::ai::{AiClient, LlmAiClient, LlmProvider, OpenAIProvider};
use folio_server::config::{AppConfig, CliConfig, FileConfig};
use folio_server::content_store::{ContentStore, HttpContentStore};
use folio_server::job_queue::templates::{default_registry, TemplateDeps};
use folio_server::job_queue::{JobQueue, JobStatusStore, SqliteJobStatusStore};
use folio_server::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the SQLite databases.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Optional TOML config file. Its values override the CLI.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Public URL of this server, used to build status endpoints.
    #[clap(long)]
    pub public_base_url: Option<String>,

    /// URL of the content store service.
    #[clap(long)]
    pub content_store_url: Option<String>,

    /// Base URL of the OpenAI-compatible API.
    #[clap(long)]
    pub ai_base_url: Option<String>,

    /// Model used for completions.
    #[clap(long)]
    pub ai_model: Option<String>,
}

impl From<&CliArgs> for CliConfig {
    fn from(args: &CliArgs) -> Self {
        CliConfig {
            db_dir: args.db_dir.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            public_base_url: args.public_base_url.clone(),
            content_store_url: args.content_store_url.clone(),
            ai_base_url: args.ai_base_url.clone(),
            ai_model: args.ai_model.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let app_config = AppConfig::resolve(&CliConfig::from(&cli_args), file_config)?;

    info!("Initializing metrics...");
    metrics::init_metrics();

    let content: Arc<dyn ContentStore> = Arc::new(HttpContentStore::new(
        &app_config.content_store.base_url,
        app_config.content_store.timeout_sec,
    )?);
    info!(
        "Content store configured at {}",
        app_config.content_store.base_url
    );

    let provider: Arc<dyn LlmProvider> = Arc::new(OpenAIProvider::new(
        app_config.ai.base_url.clone(),
        app_config.ai.model.clone(),
        app_config.ai.api_key.clone(),
    ));
    info!(
        "Using {} model {} at {}",
        provider.name(),
        provider.model(),
        app_config.ai.base_url
    );
    if let Err(e) = provider.health_check().await {
        warn!("LLM provider is not reachable yet: {}", e);
    }
    let ai: Arc<dyn AiClient> = Arc::new(LlmAiClient::new(
        provider,
        app_config.ai.client_options(),
    ));

    let registry = default_registry(TemplateDeps { content, ai });
    registry.ensure_builtins_registered()?;

    let db_path = app_config.job_db_path();
    info!("Opening job status database at {:?}...", db_path);
    let store: Arc<dyn JobStatusStore> = Arc::new(SqliteJobStatusStore::new(&db_path)?);
    let job_queue = JobQueue::start(store, registry)?;

    let shutdown = CancellationToken::new();
    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        port: app_config.port,
        metrics_port: app_config.metrics_port,
        public_base_url: app_config.public_base_url.clone(),
    };

    let server = run_server(server_config, job_queue, shutdown.clone());
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            shutdown.cancel();
            server.await
        }
    }
}

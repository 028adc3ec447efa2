//! havend - Haven survey verification daemon.
//!
//! Serves the REST boundary over the workflow service. Storage is
//! PostgreSQL when a database URL is configured, in-memory otherwise.

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use survey_api::{create_router, ApiConfig, AppState, DaemonError, DaemonResult};
use survey_service::WorkflowService;
use survey_storage::memory::InMemorySurveyStorage;
use survey_storage::postgres::PostgresSurveyStorage;
use survey_storage::SurveyStorage;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Haven daemon CLI
#[derive(Parser)]
#[command(name = "havend")]
#[command(about = "Haven survey verification service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "HAVEN_CONFIG")]
    config: Option<String>,

    /// Listen address
    #[arg(short, long, env = "HAVEN_LISTEN_ADDR")]
    listen: Option<String>,

    /// PostgreSQL URL; in-memory storage when absent
    #[arg(long, env = "HAVEN_DATABASE_URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(long, env = "HAVEN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "HAVEN_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());
    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let mut config =
        ApiConfig::load(cli.config.as_deref()).map_err(|e| DaemonError::Config(e.to_string()))?;
    if let Some(listen) = cli.listen {
        config.listen_addr = listen;
    }
    if cli.database_url.is_some() {
        config.database_url = cli.database_url;
    }

    let storage: Arc<dyn SurveyStorage> = match &config.database_url {
        Some(url) => Arc::new(
            PostgresSurveyStorage::connect(url)
                .await
                .map_err(|e| DaemonError::Storage(e.to_string()))?,
        ),
        None => Arc::new(InMemorySurveyStorage::new()),
    };

    let service = Arc::new(WorkflowService::with_storage(storage));
    let app = create_router(AppState::new(service));

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .map_err(|e| DaemonError::Config(format!("invalid listen address: {e}")))?;

    let backend = if config.database_url.is_some() {
        "postgres"
    } else {
        "memory"
    };
    tracing::info!(%addr, backend, "havend listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| DaemonError::Server(e.to_string()))?;
    Ok(())
}

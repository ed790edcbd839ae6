use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use atelier_pipeline::queue::DispatchQueue;
use atelier_pipeline::{JobEventBus, JobService, PipelineContext, PipelineRuntime};
use atelier_provider::{FakeProvider, GenerationProvider, HttpProvider};
use atelier_store::blob::{BlobStore, LocalBlobStore};
use atelier_store::memory::{MemoryAssetStore, MemoryJobStore, MemoryTokenLedger};
use atelier_store::postgres::{PgAssetStore, PgJobStore, PgTokenLedger};
use atelier_store::{AssetStore, JobStore, TokenLedger};

use atelier_api::config::{pipeline_config_from_env, provider_config_from_env, ServerConfig};
use atelier_api::router::build_app_router;
use atelier_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "atelier_api=debug,atelier_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Stores ---
    let (jobs, ledger, assets, pool) = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = atelier_store::create_pool(&database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            atelier_store::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            (
                Arc::new(PgJobStore::new(pool.clone())) as Arc<dyn JobStore>,
                Arc::new(PgTokenLedger::new(pool.clone())) as Arc<dyn TokenLedger>,
                Arc::new(PgAssetStore::new(pool.clone())) as Arc<dyn AssetStore>,
                Some(pool),
            )
        }
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set; using in-memory stores (state is lost on restart)"
            );
            (
                Arc::new(MemoryJobStore::new()) as Arc<dyn JobStore>,
                Arc::new(MemoryTokenLedger::new()) as Arc<dyn TokenLedger>,
                Arc::new(MemoryAssetStore::new()) as Arc<dyn AssetStore>,
                None,
            )
        }
    };

    // --- Blob storage ---
    let asset_dir = std::env::var("ASSET_DIR").unwrap_or_else(|_| "./data/assets".into());
    let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(&asset_dir));
    tracing::info!(asset_dir = %asset_dir, "Blob storage ready");

    // --- Provider ---
    let provider_config = provider_config_from_env();
    let provider: Arc<dyn GenerationProvider> = if provider_config.api_key.is_empty() {
        tracing::warn!("PROVIDER_API_KEY not set; using the always-succeeding fake provider");
        Arc::new(FakeProvider::always_succeeding())
    } else {
        tracing::info!(base_url = %provider_config.base_url, "Provider client configured");
        Arc::new(HttpProvider::new(provider_config))
    };

    // --- Pipeline ---
    let ctx = Arc::new(PipelineContext {
        jobs,
        ledger,
        assets,
        blobs,
        provider,
        queue: Arc::new(DispatchQueue::new()),
        bus: Arc::new(JobEventBus::default()),
        config: pipeline_config_from_env(),
    });
    let runtime = PipelineRuntime::start(Arc::clone(&ctx));

    // --- App state ---
    let state = AppState {
        service: JobService::new(Arc::clone(&ctx)),
        pool,
        config: Arc::new(config.clone()),
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Drain dispatch workers and the poller before exiting.
    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(drain, runtime.shutdown())
        .await
        .is_err()
    {
        tracing::warn!("Pipeline did not drain in time; exiting anyway");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

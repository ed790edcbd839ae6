use std::time::Duration;

use atelier_pipeline::PipelineConfig;
use atelier_provider::ProviderConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on draining the pipeline after the server stops (default: `30`).
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
        }
    }
}

/// Load pipeline tunables from environment variables, starting from
/// [`PipelineConfig::default`] (production values).
///
/// | Env Var                  | Default |
/// |--------------------------|---------|
/// | `WORKER_COUNT`           | `4`     |
/// | `LEASE_TTL_SECS`         | `120`   |
/// | `SCAN_INTERVAL_MS`       | `2000`  |
/// | `SCAN_BATCH_SIZE`        | `50`    |
/// | `RECONCILE_INTERVAL_SECS`| `60`    |
pub fn pipeline_config_from_env() -> PipelineConfig {
    let mut config = PipelineConfig::default();

    if let Ok(value) = std::env::var("WORKER_COUNT") {
        config.worker_count = value.parse().expect("WORKER_COUNT must be a valid usize");
    }
    if let Ok(value) = std::env::var("LEASE_TTL_SECS") {
        let secs: u64 = value.parse().expect("LEASE_TTL_SECS must be a valid u64");
        config.lease_ttl = Duration::from_secs(secs);
    }
    if let Ok(value) = std::env::var("SCAN_INTERVAL_MS") {
        let millis: u64 = value.parse().expect("SCAN_INTERVAL_MS must be a valid u64");
        config.scan_interval = Duration::from_millis(millis);
    }
    if let Ok(value) = std::env::var("SCAN_BATCH_SIZE") {
        config.scan_batch_size = value.parse().expect("SCAN_BATCH_SIZE must be a valid i64");
    }
    if let Ok(value) = std::env::var("RECONCILE_INTERVAL_SECS") {
        let secs: u64 = value
            .parse()
            .expect("RECONCILE_INTERVAL_SECS must be a valid u64");
        config.reconcile_interval = Duration::from_secs(secs);
    }

    config
}

/// Load the generation-provider client settings from environment variables.
///
/// | Env Var                 | Default                  |
/// |-------------------------|--------------------------|
/// | `PROVIDER_BASE_URL`     | `http://localhost:9090`  |
/// | `PROVIDER_API_KEY`      | empty (fake provider)    |
/// | `PROVIDER_TIMEOUT_SECS` | `30`                     |
pub fn provider_config_from_env() -> ProviderConfig {
    let mut config = ProviderConfig::default();

    if let Ok(value) = std::env::var("PROVIDER_BASE_URL") {
        config.base_url = value.trim_end_matches('/').to_string();
    }
    if let Ok(value) = std::env::var("PROVIDER_API_KEY") {
        config.api_key = value;
    }
    if let Ok(value) = std::env::var("PROVIDER_TIMEOUT_SECS") {
        let secs: u64 = value
            .parse()
            .expect("PROVIDER_TIMEOUT_SECS must be a valid u64");
        config.timeout = Duration::from_secs(secs);
    }

    config
}

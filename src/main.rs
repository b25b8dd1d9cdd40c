//! Plughost: plugin runtime host.
//!
//! Loads configuration, wires the runtime, and keeps plugins running until
//! the process receives Ctrl-C.

use tracing_subscriber::{EnvFilter, fmt};

use plughost_core::config::RuntimeConfig;
use plughost_core::error::AppError;
use plughost_runtime::PluginRuntime;

#[tokio::main]
async fn main() {
    let env = std::env::var("PLUGHOST_ENV").unwrap_or_else(|_| "development".to_string());

    let config = match RuntimeConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!(env = %env, "Configuration loaded");

    if let Err(e) = run(config).await {
        tracing::error!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &RuntimeConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: RuntimeConfig) -> Result<(), AppError> {
    tracing::info!("Starting plughost v{}", env!("CARGO_PKG_VERSION"));

    let runtime = PluginRuntime::bootstrap(config)?;
    runtime.start().await?;

    let stats = runtime.manager().get_stats().await;
    tracing::info!(
        plugins = stats.total,
        hooks = stats.registered_hooks,
        commands = stats.registered_commands,
        "Runtime ready, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| AppError::internal(format!("Failed to listen for shutdown signal: {e}")))?;

    tracing::info!("Shutdown signal received");
    runtime.stop().await
}

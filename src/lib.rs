pub mod alerting;
pub mod clinical;
pub mod config;
pub mod core_state;
pub mod db;
pub mod models;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Core(#[from] core_state::CoreError),
    #[error("Channel setup failed: {0}")]
    Channel(#[from] alerting::ChannelError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves config, opens the database and processes intake lines from
/// stdin until EOF.
pub async fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("ckdwatch starting v{}", config::APP_VERSION);

    let config = config::AppConfig::from_env()?;
    let dispatcher = alerting::NotificationDispatcher::from_config(&config)?;
    let state = Arc::new(core_state::CoreState::open(config)?);
    let pipeline = pipeline::ResultPipeline::new(state, dispatcher);

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stats = pipeline::serve_lines(&pipeline, stdin, tokio::io::stdout()).await?;

    tracing::info!(
        processed = stats.processed,
        rejected = stats.rejected,
        failed = stats.failed,
        "Input closed, shutting down"
    );
    Ok(())
}

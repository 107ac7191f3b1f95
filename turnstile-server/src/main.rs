use anyhow::Result;

use turnstile_server::config::Config;
use turnstile_server::store;
use turnstile_server::transport::{Transport, http::HttpTransport};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from environment variables and CLI arguments
    let config = Config::from_env_and_args()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("turnstile={}", config.log_level).parse()?)
                .add_directive(format!("turnstile_server={}", config.log_level).parse()?),
        )
        .init();

    let turnstile = store::create_turnstile(&config.store, &config.limiter)?;

    tracing::info!(
        "Turnstile server started with store type: {:?}",
        config.store.store_type
    );
    tracing::info!(
        "Limit: {} per {:?}, key prefix: {}",
        config.limiter.limit,
        config.limiter.window,
        config.limiter.key_prefix
    );

    let transport = HttpTransport::new(&config.http.host, config.http.port);
    if let Err(e) = transport.start(turnstile).await {
        tracing::error!("HTTP transport failed: {}", e);
        return Err(e);
    }

    Ok(())
}

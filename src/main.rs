//! Discord bot entry point.

use tracing::{error, info};

use morpheus_helper::BotConfig;

#[tokio::main]
async fn main() {
    // Respects RUST_LOG, defaults to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };
    info!(
        prefix = %config.default_prefix,
        owner = ?config.owner_id,
        "starting bot"
    );

    if let Err(e) = morpheus_helper::run(config).await {
        error!(error = %e, "bot stopped");
        std::process::exit(1);
    }
}

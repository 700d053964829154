//! ChatWarden binary entry point

use std::sync::Arc;

use chatwarden::{AppState, config, platform};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Initialize tracing/logging
/// 2. Load configuration from file and environment
/// 3. Initialize AppState (database, chats, staff, services)
/// 4. Run until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize tracing/logging
    let log_format =
        std::env::var("CHATWARDEN__LOGGING__FORMAT").unwrap_or_else(|_| "pretty".to_string());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "chatwarden=info".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "chatwarden=info".into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting ChatWarden...");

    // 2. Load configuration
    let config = config::AppConfig::load()?;
    tracing::info!(
        chats = config.moderated_chats.len(),
        staff_chat = ?config.staff_chat_id,
        "Configuration loaded"
    );

    // 3. Initialize application state. The transport adapter that feeds
    // platform updates into the inspector plugs in here; the logging
    // gateway stands in until one is attached.
    let gateway: Arc<dyn platform::PlatformGateway> = Arc::new(platform::LoggingGateway);
    let _state = AppState::new(config, gateway).await?;

    tracing::info!("ChatWarden ready");

    // 4. Run until interrupted
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    Ok(())
}

//! ChatWarden - a moderation service for multi-chat communities
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Platform boundary                        │
//! │  - PlatformGateway (ban/unban/restrict/send/delete)         │
//! │  - Inbound messages and staff gestures                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                           │
//! │  - MessageInspector (per-message pipeline)                  │
//! │  - PunishmentEngine (ban/mute/warn + fan-out)               │
//! │  - AdminApi (operation façade), AuditRouter                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                             │
//! │  - SQLite (sqlx), WAL, single writer                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `platform`: chat-platform capability trait and message types
//! - `service`: inspection, punishments, audit, admin façade
//! - `data`: database layer
//! - `config`: configuration management
//! - `error`: error types

pub mod config;
pub mod data;
pub mod error;
pub mod platform;
pub mod service;

use std::sync::Arc;

use crate::service::authz;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database layer
    pub db: Arc<data::Database>,

    /// Chat platform capabilities
    pub gateway: Arc<dyn platform::PlatformGateway>,

    /// Punishment mutations
    pub engine: Arc<service::PunishmentEngine>,

    /// Per-message pipeline
    pub inspector: Arc<service::MessageInspector>,

    /// Operation façade for the UI shell
    pub admin: Arc<service::AdminApi>,

    /// Staff audit log
    pub audit: Arc<service::AuditRouter>,

    /// Multi-step prompt state
    pub dialogs: Arc<service::Dialogs>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to the SQLite database (schema created on first run)
    /// 2. Register the moderated chats from config
    /// 3. Seed the system issuer and apply preset staff roles
    /// 4. Wire the audit router, engine, inspector and admin façade
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(
        config: config::AppConfig,
        gateway: Arc<dyn platform::PlatformGateway>,
    ) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = Arc::new(data::Database::connect(&config.database_path).await?);
        tracing::info!(path = %config.database_path.display(), "Database connected");

        // 2. Register moderated chats
        for chat_id in &config.moderated_chats {
            db.ensure_chat(*chat_id, None).await?;
        }
        tracing::info!(count = config.moderated_chats.len(), "Moderated chats registered");

        // 3. Seed the system issuer for automatic punishments, then apply
        //    preset staff. Both are idempotent across restarts.
        db.ensure_user(service::SYSTEM_USER_ID, Some("automod"), Some("AutoMod"))
            .await?;
        db.set_role(service::SYSTEM_USER_ID, authz::ROLE_OWNER)
            .await?;
        for (user_id, level) in config.preset_staff_parsed()? {
            db.ensure_user(user_id, None, None).await?;
            db.set_role(user_id, level).await?;
            tracing::info!(user_id, level, "Preset staff role applied");
        }

        // 4. Wire services
        let audit = Arc::new(service::AuditRouter::new(
            gateway.clone(),
            config.staff_chat_id,
            service::AuditTopics {
                log: config.log_topic_id,
                punish: config.punish_topic_id,
                gban: config.gban_topic_id,
                report: config.report_topic_id,
            },
        ));

        let engine = Arc::new(service::PunishmentEngine::new(
            db.clone(),
            gateway.clone(),
            audit.clone(),
            config.max_warns,
        ));

        let classifier: Option<Arc<dyn service::MessageClassifier>> =
            match &config.perplexity_api_key {
                Some(api_key) => {
                    tracing::info!(model = %config.perplexity_model, "AI classifier enabled");
                    Some(Arc::new(service::Classifier::new(
                        api_key.clone(),
                        config.perplexity_model.clone(),
                    )?))
                }
                None => {
                    tracing::info!("AI classifier disabled (no API key)");
                    None
                }
            };

        let inspector = Arc::new(service::MessageInspector::new(
            db.clone(),
            gateway.clone(),
            engine.clone(),
            classifier,
            service::InspectorConfig {
                spam_messages_count: config.spam_messages_count,
                spam_interval_seconds: config.spam_interval_seconds,
                antispam_warn_threshold: config.antispam_warn_threshold,
            },
        ));

        let admin = Arc::new(service::AdminApi::new(
            db.clone(),
            engine.clone(),
            audit.clone(),
            config.users_per_page,
        ));

        tracing::info!("Application state initialized");

        Ok(Self {
            config: Arc::new(config),
            db,
            gateway,
            engine,
            inspector,
            admin,
            audit,
            dialogs: Arc::new(service::Dialogs::new()),
        })
    }
}

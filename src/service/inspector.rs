//! Per-message inspection pipeline
//!
//! Runs for every message observed in a moderated chat, staff included.
//! The steps are ordered; the first one that produces a verdict ends the
//! pipeline. Accounting always happens, and the global-ban check runs
//! before the staff exemption.

use std::sync::Arc;

use crate::data::{Database, now_ts};
use crate::error::AppError;
use crate::platform::{IncomingMessage, PlatformGateway};
use crate::service::authz;
use crate::service::classifier::{MessageClassifier, VerdictAction};
use crate::service::punishment::PunishmentEngine;

/// Synthetic issuer for automatic punishments (word filter, anti-spam, AI).
/// Seeded at init with the owner role so the engine's authz gate holds.
pub const SYSTEM_USER_ID: i64 = 0;

const MUTE_SECS_ON_AI_VERDICT: i64 = 3600;

/// Anti-spam and threshold knobs, copied from the process configuration.
#[derive(Debug, Clone, Copy)]
pub struct InspectorConfig {
    pub spam_messages_count: i64,
    pub spam_interval_seconds: i64,
    pub antispam_warn_threshold: i64,
}

/// Which pipeline step fired, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InspectionOutcome {
    /// No step fired; the message stays
    Clean,
    /// Sender is globally banned; chat ban re-issued, message deleted
    GloballyBanned,
    /// Sender is staff; inspection stopped after accounting
    StaffExempt,
    /// Chat is in read-only mode; message deleted
    ReadOnlyDeleted,
    /// A filtered word matched; message deleted, warn issued
    WordFilter { word: String },
    /// Sliding-window flood; message deleted, `warned` when strikes reached
    /// the threshold and an automatic warn fired
    Spam { warned: bool },
    /// The AI classifier flagged the message and the action was applied
    AiFlagged(VerdictAction),
}

pub struct MessageInspector {
    db: Arc<Database>,
    gateway: Arc<dyn PlatformGateway>,
    engine: Arc<PunishmentEngine>,
    classifier: Option<Arc<dyn MessageClassifier>>,
    config: InspectorConfig,
}

impl MessageInspector {
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<dyn PlatformGateway>,
        engine: Arc<PunishmentEngine>,
        classifier: Option<Arc<dyn MessageClassifier>>,
        config: InspectorConfig,
    ) -> Self {
        Self {
            db,
            gateway,
            engine,
            classifier,
            config,
        }
    }

    /// Run the pipeline for one message.
    pub async fn inspect(&self, msg: &IncomingMessage) -> Result<InspectionOutcome, AppError> {
        // 1. Accounting, unconditional.
        let user = self
            .db
            .ensure_user(msg.user_id, msg.handle.as_deref(), msg.display_name.as_deref())
            .await?;
        self.db.increment_messages(user.user_id).await?;

        // 2. Global ban, before the staff exemption.
        if self.db.is_globally_banned(user.user_id).await? {
            if let Err(error) = self.gateway.ban_member(msg.chat_id, user.user_id, 0).await {
                tracing::warn!(%error, chat_id = msg.chat_id, "re-ban of globally banned user failed");
            }
            self.delete(msg).await;
            return Ok(InspectionOutcome::GloballyBanned);
        }

        // 3. Staff exemption.
        if authz::can_moderate(user.role) {
            return Ok(InspectionOutcome::StaffExempt);
        }

        let chat = self.db.ensure_chat(msg.chat_id, None).await?;

        // 4. Read-only mode.
        if chat.read_only {
            self.delete(msg).await;
            return Ok(InspectionOutcome::ReadOnlyDeleted);
        }

        // 5. Word filter: case-insensitive substring match.
        let normalized = msg.text.to_lowercase();
        for word in self.db.list_banwords(chat.chat_id).await? {
            if normalized.contains(&word) {
                self.delete(msg).await;
                self.engine
                    .warn(
                        user.user_id,
                        &format!("word filter: {word}"),
                        SYSTEM_USER_ID,
                    )
                    .await?;
                return Ok(InspectionOutcome::WordFilter { word });
            }
        }

        // 6. Anti-spam.
        if chat.antispam {
            let count = self
                .db
                .check_spam(
                    user.user_id,
                    chat.chat_id,
                    now_ts(),
                    self.config.spam_interval_seconds,
                )
                .await?;
            if count > self.config.spam_messages_count {
                self.delete(msg).await;
                let strikes = self.db.add_spam_strike(user.user_id, chat.chat_id).await?;
                let warned = strikes >= self.config.antispam_warn_threshold;
                if warned {
                    self.engine
                        .warn(user.user_id, "antispam", SYSTEM_USER_ID)
                        .await?;
                    self.db
                        .reset_spam_strikes(user.user_id, chat.chat_id)
                        .await?;
                }
                return Ok(InspectionOutcome::Spam { warned });
            }
        }

        // 7. AI moderation.
        if chat.ai_moderation {
            if let Some(classifier) = &self.classifier {
                let verdict = classifier.classify(&msg.text).await;
                if verdict.violation {
                    let reason = format!("AI: {}", verdict.reason);
                    match verdict.action {
                        VerdictAction::None => {}
                        VerdictAction::Warn => {
                            self.engine.warn(user.user_id, &reason, SYSTEM_USER_ID).await?;
                            return Ok(InspectionOutcome::AiFlagged(verdict.action));
                        }
                        VerdictAction::Mute => {
                            self.engine
                                .mute(
                                    user.user_id,
                                    now_ts() + MUTE_SECS_ON_AI_VERDICT,
                                    &reason,
                                    SYSTEM_USER_ID,
                                )
                                .await?;
                            return Ok(InspectionOutcome::AiFlagged(verdict.action));
                        }
                        VerdictAction::Ban => {
                            self.engine.ban(user.user_id, 0, &reason, SYSTEM_USER_ID).await?;
                            return Ok(InspectionOutcome::AiFlagged(verdict.action));
                        }
                    }
                }
            }
        }

        Ok(InspectionOutcome::Clean)
    }

    async fn delete(&self, msg: &IncomingMessage) {
        if let Err(error) = self
            .gateway
            .delete_message(msg.chat_id, msg.message_id)
            .await
        {
            tracing::warn!(
                %error,
                chat_id = msg.chat_id,
                message_id = msg.message_id,
                "delete_message failed"
            );
        }
    }
}

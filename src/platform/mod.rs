//! Chat-platform gateway
//!
//! The transport (receiving updates, restricting members, sending replies)
//! lives behind the [`PlatformGateway`] trait; adapter crates or binaries
//! provide the concrete client. Everything here is the capability surface
//! the moderation core consumes, nothing more.

use async_trait::async_trait;

use crate::error::AppError;

/// Permission set used with `restrict_member`.
///
/// Field-for-field what the platform lets us toggle on a group member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatPermissions {
    pub send_messages: bool,
    pub send_media: bool,
    pub send_polls: bool,
    pub send_other: bool,
    pub add_web_previews: bool,
    pub invite_users: bool,
}

impl ChatPermissions {
    /// Everything off: the permission set applied on mute.
    pub fn muted() -> Self {
        Self {
            send_messages: false,
            send_media: false,
            send_polls: false,
            send_other: false,
            add_web_previews: false,
            invite_users: false,
        }
    }

    /// Full permissive set, applied on unmute.
    pub fn unrestricted() -> Self {
        Self {
            send_messages: true,
            send_media: true,
            send_polls: true,
            send_other: true,
            add_web_previews: true,
            invite_users: true,
        }
    }
}

/// One message observed in a moderated chat.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub text: String,
}

/// Capabilities consumed from the chat platform.
///
/// All deadlines are epoch seconds; `until_date = 0` means permanent.
/// Implementations must not retry internally; callers decide whether a
/// failure is swallowed (fan-out) or surfaced.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformGateway: Send + Sync {
    async fn ban_member(&self, chat_id: i64, user_id: i64, until_date: i64)
    -> Result<(), AppError>;

    async fn unban_member(
        &self,
        chat_id: i64,
        user_id: i64,
        only_if_banned: bool,
    ) -> Result<(), AppError>;

    async fn restrict_member(
        &self,
        chat_id: i64,
        user_id: i64,
        permissions: ChatPermissions,
        until_date: i64,
    ) -> Result<(), AppError>;

    /// Send an HTML-formatted message, optionally into a thread (topic).
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        message_thread_id: Option<i64>,
    ) -> Result<(), AppError>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), AppError>;
}

/// Gateway that only logs intended platform calls.
///
/// Used by the binary when no transport adapter is wired, and handy for
/// dry runs against a production store.
pub struct LoggingGateway;

#[async_trait]
impl PlatformGateway for LoggingGateway {
    async fn ban_member(
        &self,
        chat_id: i64,
        user_id: i64,
        until_date: i64,
    ) -> Result<(), AppError> {
        tracing::info!(chat_id, user_id, until_date, "gateway: ban_member");
        Ok(())
    }

    async fn unban_member(
        &self,
        chat_id: i64,
        user_id: i64,
        only_if_banned: bool,
    ) -> Result<(), AppError> {
        tracing::info!(chat_id, user_id, only_if_banned, "gateway: unban_member");
        Ok(())
    }

    async fn restrict_member(
        &self,
        chat_id: i64,
        user_id: i64,
        permissions: ChatPermissions,
        until_date: i64,
    ) -> Result<(), AppError> {
        tracing::info!(
            chat_id,
            user_id,
            send_messages = permissions.send_messages,
            until_date,
            "gateway: restrict_member"
        );
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        message_thread_id: Option<i64>,
    ) -> Result<(), AppError> {
        tracing::info!(chat_id, ?message_thread_id, text, "gateway: send_message");
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), AppError> {
        tracing::info!(chat_id, message_id, "gateway: delete_message");
        Ok(())
    }
}

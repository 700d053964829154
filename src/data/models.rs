//! Data models
//!
//! Rust structs representing database entities. Platform ids are the
//! platform-assigned integers; instants are absolute epoch seconds
//! (`0` means "permanent" wherever a deadline is expected).

use serde::{Deserialize, Serialize};

// =============================================================================
// User
// =============================================================================

/// A user observed in any moderated chat.
///
/// Created on first observation and never destroyed. The punishment flags
/// (`is_banned`, `ban_until`, `is_muted`, `mute_until`) are a materialized
/// view over the per-(user, chat) ban/mute rows; the rows are authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub user_id: i64,
    /// Platform handle without the leading `@`; may be empty
    pub handle: String,
    pub display_name: String,
    /// Role level: 0 user, 5 moderator, 7 senior moderator, 8 admin, 9 owner
    pub role: i64,
    /// Interface language preference
    pub ui_lang: String,
    pub messages_count: i64,
    pub warns_count: i64,
    pub is_banned: bool,
    /// Ban deadline (epoch seconds, 0 = permanent); meaningful when banned
    pub ban_until: i64,
    pub is_muted: bool,
    pub mute_until: i64,
    pub joined_at: i64,
    pub last_seen: i64,
}

impl User {
    /// Display label for UI and audit records: name plus handle when known.
    pub fn label(&self) -> String {
        if self.handle.is_empty() {
            self.display_name.clone()
        } else {
            format!("{} (@{})", self.display_name, self.handle)
        }
    }
}

// =============================================================================
// Chat
// =============================================================================

/// A moderated group chat from the configured allow-list.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Chat {
    pub chat_id: i64,
    pub title: String,
    /// Non-staff messages are deleted while set
    pub read_only: bool,
    pub antispam: bool,
    pub ai_moderation: bool,
}

// =============================================================================
// Punishments
// =============================================================================

/// Kind of an issued moderation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PunishmentKind {
    Ban,
    Unban,
    Mute,
    Unmute,
    Warn,
    Unwarn,
    EditBan,
    EditMute,
    GlobalBan,
}

impl PunishmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ban => "ban",
            Self::Unban => "unban",
            Self::Mute => "mute",
            Self::Unmute => "unmute",
            Self::Warn => "warn",
            Self::Unwarn => "unwarn",
            Self::EditBan => "editban",
            Self::EditMute => "editmute",
            Self::GlobalBan => "globalban",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ban" => Some(Self::Ban),
            "unban" => Some(Self::Unban),
            "mute" => Some(Self::Mute),
            "unmute" => Some(Self::Unmute),
            "warn" => Some(Self::Warn),
            "unwarn" => Some(Self::Unwarn),
            "editban" => Some(Self::EditBan),
            "editmute" => Some(Self::EditMute),
            "globalban" => Some(Self::GlobalBan),
            _ => None,
        }
    }

    /// Whether a duration accompanies this kind in audit records.
    pub fn has_duration(&self) -> bool {
        matches!(
            self,
            Self::Ban | Self::Mute | Self::EditBan | Self::EditMute | Self::GlobalBan
        )
    }
}

/// A row in the append-only log of issued actions.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Punishment {
    pub id: i64,
    /// One of the `PunishmentKind` string forms
    pub kind: String,
    pub user_id: i64,
    pub issued_by: i64,
    pub issued_at: i64,
    /// Deadline (epoch seconds, 0 = permanent / not applicable)
    pub until: i64,
    pub reason: Option<String>,
    /// Chat the action originated from; 0 for service-wide actions
    pub chat_id: i64,
}

/// Current ban state for one (user, chat) pair. At most one row per pair.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActiveBan {
    pub user_id: i64,
    pub chat_id: i64,
    /// 0 = permanent, otherwise an absolute epoch second in the future
    pub until: i64,
    pub reason: Option<String>,
    pub issued_by: i64,
    pub issued_at: i64,
}

/// Current mute state for one (user, chat) pair. At most one row per pair.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActiveMute {
    pub user_id: i64,
    pub chat_id: i64,
    pub until: i64,
    pub reason: Option<String>,
    pub issued_by: i64,
    pub issued_at: i64,
}

/// Service-wide ban. When set, the user is banned in every moderated chat;
/// the row is authoritative, fan-out is best-effort.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GlobalBan {
    pub user_id: i64,
    pub reason: Option<String>,
    pub banned_by: i64,
    pub banned_at: i64,
}

// =============================================================================
// Reports
// =============================================================================

/// Report lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Open,
    Accepted,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Accepted => "accepted",
        }
    }
}

/// A user-filed report against another user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Report {
    pub id: i64,
    pub reporter_id: i64,
    pub reported_id: i64,
    pub reason: String,
    pub chat_id: i64,
    pub created_at: i64,
    /// One of the `ReportStatus` string forms
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punishment_kind_round_trips_through_storage_form() {
        for kind in [
            PunishmentKind::Ban,
            PunishmentKind::Unban,
            PunishmentKind::Mute,
            PunishmentKind::Unmute,
            PunishmentKind::Warn,
            PunishmentKind::Unwarn,
            PunishmentKind::EditBan,
            PunishmentKind::EditMute,
            PunishmentKind::GlobalBan,
        ] {
            assert_eq!(PunishmentKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(PunishmentKind::from_str("kick"), None);
    }

    #[test]
    fn user_label_includes_handle_when_present() {
        let user = User {
            user_id: 7,
            handle: "alice".to_string(),
            display_name: "Alice".to_string(),
            role: 0,
            ui_lang: "ru".to_string(),
            messages_count: 0,
            warns_count: 0,
            is_banned: false,
            ban_until: 0,
            is_muted: false,
            mute_until: 0,
            joined_at: 0,
            last_seen: 0,
        };
        assert_eq!(user.label(), "Alice (@alice)");
    }
}

//! Staff audit log router
//!
//! Translates structured events into short human-readable records posted to
//! the configured staff chat, partitioned by topic id. Delivery is
//! best-effort: failures are logged at WARN and dropped, auditing never
//! blocks a mutation.

use std::sync::Arc;

use crate::data::{PunishmentKind, Report, User};
use crate::platform::PlatformGateway;
use crate::service::duration::format_duration;

/// Topic ids inside the staff chat. Any absent topic falls back to `log`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditTopics {
    pub log: Option<i64>,
    pub punish: Option<i64>,
    pub gban: Option<i64>,
    pub report: Option<i64>,
}

pub struct AuditRouter {
    gateway: Arc<dyn PlatformGateway>,
    staff_chat_id: Option<i64>,
    topics: AuditTopics,
}

impl AuditRouter {
    pub fn new(
        gateway: Arc<dyn PlatformGateway>,
        staff_chat_id: Option<i64>,
        topics: AuditTopics,
    ) -> Self {
        Self {
            gateway,
            staff_chat_id,
            topics,
        }
    }

    /// Audit one punishment mutation.
    pub async fn punishment(
        &self,
        kind: PunishmentKind,
        target: &User,
        issuer: &User,
        until: i64,
        reason: Option<&str>,
        now: i64,
    ) {
        let topic = match kind {
            PunishmentKind::GlobalBan => self.topics.gban.or(self.topics.log),
            _ => self.topics.punish.or(self.topics.log),
        };
        let text = format_punishment_record(kind, target, issuer, until, reason, now);
        self.deliver(&text, topic).await;
    }

    /// Audit a newly filed report.
    pub async fn report(&self, report: &Report, reporter: &User, reported: &User) {
        let topic = self.topics.report.or(self.topics.log);
        let text = format_report_record(report, reporter, reported);
        self.deliver(&text, topic).await;
    }

    /// Free-form record on the general log topic.
    pub async fn generic(&self, text: &str) {
        self.deliver(text, self.topics.log).await;
    }

    async fn deliver(&self, text: &str, topic: Option<i64>) {
        let Some(staff_chat_id) = self.staff_chat_id else {
            tracing::debug!("audit dropped: staff_chat_id is not configured");
            return;
        };

        if let Err(error) = self
            .gateway
            .send_message(staff_chat_id, text, topic)
            .await
        {
            tracing::warn!(%error, ?topic, "Failed to deliver audit record");
        }
    }
}

fn icon(kind: PunishmentKind) -> &'static str {
    match kind {
        PunishmentKind::Ban => "🔨",
        PunishmentKind::Unban => "✅",
        PunishmentKind::Mute => "🔇",
        PunishmentKind::Unmute => "🔊",
        PunishmentKind::Warn => "⚠️",
        PunishmentKind::Unwarn => "♻️",
        PunishmentKind::EditBan | PunishmentKind::EditMute => "✏️",
        PunishmentKind::GlobalBan => "🌐",
    }
}

fn escape(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

/// Multi-line HTML block: icon + action, target, issuer, then duration and
/// reason when applicable. Interpolated content is escaped.
fn format_punishment_record(
    kind: PunishmentKind,
    target: &User,
    issuer: &User,
    until: i64,
    reason: Option<&str>,
    now: i64,
) -> String {
    let mut lines = vec![
        format!(
            "{} <b>{}</b>",
            icon(kind),
            kind.as_str().to_uppercase()
        ),
        format!(
            "Нарушитель: {} [<code>{}</code>]",
            escape(&target.label()),
            target.user_id
        ),
        format!(
            "Модератор: {} [<code>{}</code>]",
            escape(&issuer.label()),
            issuer.user_id
        ),
    ];

    if kind.has_duration() {
        lines.push(format!("Срок: {}", format_duration(until, now)));
    }
    if let Some(reason) = reason {
        if !reason.is_empty() {
            lines.push(format!("Причина: {}", escape(reason)));
        }
    }

    lines.join("\n")
}

fn format_report_record(report: &Report, reporter: &User, reported: &User) -> String {
    [
        format!("📣 <b>REPORT</b> #{}", report.id),
        format!(
            "На: {} [<code>{}</code>]",
            escape(&reported.label()),
            reported.user_id
        ),
        format!(
            "От: {} [<code>{}</code>]",
            escape(&reporter.label()),
            reporter.user_id
        ),
        format!("Причина: {}", escape(&report.reason)),
    ]
    .join("\n")
}

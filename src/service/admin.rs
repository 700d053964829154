//! Operation façade consumed by the UI shell
//!
//! Every mutating path runs: authorize, resolve target, parse duration,
//! delegate to the engine or the store, format a reply. Replies are HTML
//! fragments ready for the platform's parse mode; interpolated content is
//! escaped here, once.

use std::sync::Arc;

use crate::data::{Chat, Database, Punishment, Report, User, now_ts};
use crate::error::AppError;
use crate::service::audit::AuditRouter;
use crate::service::authz;
use crate::service::duration::{format_duration, parse_duration};
use crate::service::punishment::PunishmentEngine;

/// `last_seen` recency treated as "online".
const ONLINE_WINDOW_SECS: i64 = 600;

/// One page of the paginated user list.
#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<User>,
    pub page: i64,
    pub total_pages: i64,
    pub total_users: i64,
}

pub struct AdminApi {
    db: Arc<Database>,
    engine: Arc<PunishmentEngine>,
    audit: Arc<AuditRouter>,
    users_per_page: i64,
}

impl AdminApi {
    pub fn new(
        db: Arc<Database>,
        engine: Arc<PunishmentEngine>,
        audit: Arc<AuditRouter>,
        users_per_page: i64,
    ) -> Self {
        Self {
            db,
            engine,
            audit,
            users_per_page,
        }
    }

    // =========================================================================
    // Target resolution
    // =========================================================================

    /// Resolve a free-form target argument to a user row.
    ///
    /// Numeric input resolves even for ids never seen before (the row is
    /// created on the spot, so a ban can precede the first message).
    /// `@handle` and bare handle input only match known users.
    pub async fn resolve_target(&self, query: &str) -> Result<User, AppError> {
        let query = query.trim();

        if let Ok(user_id) = query.parse::<i64>() {
            return self.db.ensure_user(user_id, None, None).await;
        }

        self.db
            .find_user(query)
            .await?
            .ok_or(AppError::TargetNotFound)
    }

    /// Lookup without side effects, for the search screen.
    pub async fn find_user(&self, query: &str) -> Result<User, AppError> {
        if let Ok(user_id) = query.trim().parse::<i64>() {
            return self
                .db
                .get_user(user_id)
                .await?
                .ok_or(AppError::TargetNotFound);
        }

        self.db
            .find_user(query)
            .await?
            .ok_or(AppError::TargetNotFound)
    }

    // =========================================================================
    // Punishments
    // =========================================================================

    pub async fn ban(
        &self,
        issuer: i64,
        target: &str,
        duration: &str,
        reason: &str,
    ) -> Result<String, AppError> {
        self.require_moderator(issuer).await?;
        let target = self.resolve_target(target).await?;
        let now = now_ts();
        let until = parse_duration(duration, now);

        self.engine.ban(target.user_id, until, reason, issuer).await?;

        Ok(format!(
            "🔨 {} забанен. Срок: {}",
            escape(&target.label()),
            format_duration(until, now)
        ))
    }

    pub async fn unban(&self, issuer: i64, target: &str) -> Result<String, AppError> {
        self.require_moderator(issuer).await?;
        let target = self.resolve_target(target).await?;
        self.engine.unban(target.user_id, issuer).await?;

        Ok(format!("✅ {} разбанен.", escape(&target.label())))
    }

    pub async fn editban(
        &self,
        issuer: i64,
        target: &str,
        duration: &str,
    ) -> Result<String, AppError> {
        self.require_moderator(issuer).await?;
        let target = self.resolve_target(target).await?;
        let now = now_ts();
        let until = parse_duration(duration, now);

        self.engine.editban(target.user_id, until, issuer).await?;

        Ok(format!(
            "✏️ Срок бана {} изменён: {}",
            escape(&target.label()),
            format_duration(until, now)
        ))
    }

    pub async fn mute(
        &self,
        issuer: i64,
        target: &str,
        duration: &str,
        reason: &str,
    ) -> Result<String, AppError> {
        self.require_moderator(issuer).await?;
        let target = self.resolve_target(target).await?;
        let now = now_ts();
        let until = parse_duration(duration, now);

        self.engine.mute(target.user_id, until, reason, issuer).await?;

        Ok(format!(
            "🔇 {} замьючен. Срок: {}",
            escape(&target.label()),
            format_duration(until, now)
        ))
    }

    pub async fn unmute(&self, issuer: i64, target: &str) -> Result<String, AppError> {
        self.require_moderator(issuer).await?;
        let target = self.resolve_target(target).await?;
        self.engine.unmute(target.user_id, issuer).await?;

        Ok(format!("🔊 {} размьючен.", escape(&target.label())))
    }

    pub async fn editmute(
        &self,
        issuer: i64,
        target: &str,
        duration: &str,
    ) -> Result<String, AppError> {
        self.require_moderator(issuer).await?;
        let target = self.resolve_target(target).await?;
        let now = now_ts();
        let until = parse_duration(duration, now);

        self.engine.editmute(target.user_id, until, issuer).await?;

        Ok(format!(
            "✏️ Срок мьюта {} изменён: {}",
            escape(&target.label()),
            format_duration(until, now)
        ))
    }

    pub async fn warn(
        &self,
        issuer: i64,
        target: &str,
        reason: &str,
    ) -> Result<String, AppError> {
        self.require_moderator(issuer).await?;
        let target = self.resolve_target(target).await?;
        let outcome = self.engine.warn(target.user_id, reason, issuer).await?;

        let mut reply = format!(
            "⚠️ {} получил предупреждение ({}).",
            escape(&target.label()),
            outcome.count
        );
        if outcome.auto_banned {
            reply.push_str("\n🔨 Лимит предупреждений исчерпан: бан навсегда.");
        }

        Ok(reply)
    }

    pub async fn unwarn(&self, issuer: i64, target: &str) -> Result<String, AppError> {
        self.require_moderator(issuer).await?;
        let target = self.resolve_target(target).await?;
        self.engine.unwarn(target.user_id, issuer).await?;

        Ok(format!(
            "♻️ Предупреждения {} сброшены.",
            escape(&target.label())
        ))
    }

    pub async fn globalban(
        &self,
        issuer: i64,
        target: &str,
        reason: &str,
    ) -> Result<String, AppError> {
        self.require_admin(issuer).await?;
        let target = self.resolve_target(target).await?;
        self.engine.globalban(target.user_id, reason, issuer).await?;

        Ok(format!(
            "🌐 {} забанен во всех чатах навсегда.",
            escape(&target.label())
        ))
    }

    // =========================================================================
    // User listings
    // =========================================================================

    /// Page is zero-based; out-of-range pages clamp to the last one.
    pub async fn list_users(&self, page: i64) -> Result<UserPage, AppError> {
        let total_users = self.db.count_users().await?;
        let total_pages = (total_users + self.users_per_page - 1) / self.users_per_page;
        let page = page.clamp(0, (total_pages - 1).max(0));

        let users = self
            .db
            .list_users(self.users_per_page, page * self.users_per_page)
            .await?;

        Ok(UserPage {
            users,
            page,
            total_pages,
            total_users,
        })
    }

    pub async fn list_online(&self) -> Result<Vec<User>, AppError> {
        self.db.get_online_users(ONLINE_WINDOW_SECS).await
    }

    pub async fn list_staff(&self) -> Result<Vec<User>, AppError> {
        self.db.get_staff_users().await
    }

    pub async fn top_users(&self, n: i64) -> Result<Vec<User>, AppError> {
        self.db.get_top_users(n).await
    }

    /// Most recent log entries for a user, for the profile drill-down.
    pub async fn punishment_history(
        &self,
        target: &str,
        n: i64,
    ) -> Result<Vec<Punishment>, AppError> {
        let user = self.find_user(target).await?;
        self.db.get_punishment_history(user.user_id, n).await
    }

    // =========================================================================
    // Roles
    // =========================================================================

    pub async fn set_role(
        &self,
        issuer: i64,
        target: &str,
        level: i64,
    ) -> Result<String, AppError> {
        self.require_admin(issuer).await?;
        let target = self.resolve_target(target).await?;

        self.db.set_role(target.user_id, level).await?;
        self.audit
            .generic(&format!(
                "👤 Роль {} [<code>{}</code>] изменена: {}",
                escape(&target.label()),
                target.user_id,
                authz::role_name(level)
            ))
            .await;

        Ok(format!(
            "👤 {} теперь {}.",
            escape(&target.label()),
            authz::role_name(level)
        ))
    }

    // =========================================================================
    // Reports
    // =========================================================================

    /// File a report. Open to everyone, no role gate.
    pub async fn create_report(
        &self,
        reporter: i64,
        target: &str,
        reason: &str,
        chat_id: i64,
    ) -> Result<String, AppError> {
        let reporter = self.db.ensure_user(reporter, None, None).await?;
        let reported = self.resolve_target(target).await?;

        let report = self
            .db
            .add_report(reporter.user_id, reported.user_id, reason, chat_id)
            .await?;
        self.audit.report(&report, &reporter, &reported).await;

        Ok(format!("📣 Жалоба #{} отправлена модераторам.", report.id))
    }

    pub async fn list_open_reports(&self, n: i64) -> Result<Vec<Report>, AppError> {
        self.db.get_open_reports(n).await
    }

    pub async fn accept_report(&self, issuer: i64, report_id: i64) -> Result<String, AppError> {
        self.require_moderator(issuer).await?;
        self.db.accept_report(report_id).await?;

        Ok(format!("✅ Жалоба #{report_id} принята."))
    }

    // =========================================================================
    // Chat settings
    // =========================================================================

    pub async fn list_chats(&self) -> Result<Vec<Chat>, AppError> {
        self.db.get_all_chats().await
    }

    pub async fn set_read_only(
        &self,
        issuer: i64,
        chat_id: i64,
        value: bool,
    ) -> Result<String, AppError> {
        self.require_moderator(issuer).await?;
        self.db.set_read_only(chat_id, value).await?;

        Ok(toggle_reply("Режим read-only", value))
    }

    pub async fn set_antispam(
        &self,
        issuer: i64,
        chat_id: i64,
        value: bool,
    ) -> Result<String, AppError> {
        self.require_moderator(issuer).await?;
        self.db.set_antispam(chat_id, value).await?;

        Ok(toggle_reply("Антиспам", value))
    }

    pub async fn set_ai_moderation(
        &self,
        issuer: i64,
        chat_id: i64,
        value: bool,
    ) -> Result<String, AppError> {
        self.require_moderator(issuer).await?;
        self.db.set_ai_moderation(chat_id, value).await?;

        Ok(toggle_reply("AI-модерация", value))
    }

    pub async fn add_banword(
        &self,
        issuer: i64,
        chat_id: i64,
        word: &str,
    ) -> Result<String, AppError> {
        self.require_moderator(issuer).await?;
        self.db.add_banword(chat_id, word).await?;

        Ok(format!(
            "🚫 Слово «{}» добавлено в фильтр.",
            escape(word.trim())
        ))
    }

    pub async fn remove_banword(
        &self,
        issuer: i64,
        chat_id: i64,
        word: &str,
    ) -> Result<String, AppError> {
        self.require_moderator(issuer).await?;
        self.db.remove_banword(chat_id, word).await?;

        Ok(format!(
            "✅ Слово «{}» удалено из фильтра.",
            escape(word.trim())
        ))
    }

    pub async fn list_banwords(&self, chat_id: i64) -> Result<Vec<String>, AppError> {
        self.db.list_banwords(chat_id).await
    }

    // =========================================================================
    // Authz helpers
    // =========================================================================

    async fn require_moderator(&self, issuer: i64) -> Result<(), AppError> {
        if !authz::can_moderate(self.db.get_role(issuer).await?) {
            return Err(AppError::AuthzDenied);
        }
        Ok(())
    }

    async fn require_admin(&self, issuer: i64) -> Result<(), AppError> {
        if !authz::can_admin(self.db.get_role(issuer).await?) {
            return Err(AppError::AuthzDenied);
        }
        Ok(())
    }
}

fn escape(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

fn toggle_reply(feature: &str, value: bool) -> String {
    if value {
        format!("{feature}: включено")
    } else {
        format!("{feature}: выключено")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{MockPlatformGateway, PlatformGateway};
    use crate::service::audit::AuditTopics;
    use tempfile::TempDir;

    const CHAT: i64 = -1001;
    const ADMIN: i64 = 88;
    const MOD: i64 = 77;
    const TARGET: i64 = 12345;

    struct Fixture {
        db: Arc<Database>,
        api: AdminApi,
        _tmp: TempDir,
    }

    async fn fixture() -> Fixture {
        let mut gateway = MockPlatformGateway::new();
        gateway.expect_ban_member().returning(|_, _, _| Ok(()));
        gateway.expect_unban_member().returning(|_, _, _| Ok(()));
        gateway
            .expect_restrict_member()
            .returning(|_, _, _, _| Ok(()));
        gateway.expect_send_message().returning(|_, _, _| Ok(()));
        gateway.expect_delete_message().returning(|_, _| Ok(()));
        let gateway: Arc<dyn PlatformGateway> = Arc::new(gateway);

        let tmp = TempDir::new().unwrap();
        let db = Arc::new(Database::connect(&tmp.path().join("test.db")).await.unwrap());
        db.ensure_chat(CHAT, Some("Main")).await.unwrap();
        db.ensure_user(ADMIN, Some("admin"), Some("Admin")).await.unwrap();
        db.set_role(ADMIN, authz::ROLE_ADMIN).await.unwrap();
        db.ensure_user(MOD, Some("mod"), Some("Mod")).await.unwrap();
        db.set_role(MOD, authz::ROLE_MODERATOR).await.unwrap();
        db.ensure_user(TARGET, Some("violator"), Some("Violator"))
            .await
            .unwrap();

        let audit = Arc::new(AuditRouter::new(
            gateway.clone(),
            None,
            AuditTopics::default(),
        ));
        let engine = Arc::new(PunishmentEngine::new(
            db.clone(),
            gateway.clone(),
            audit.clone(),
            3,
        ));
        let api = AdminApi::new(db.clone(), engine, audit, 10);

        Fixture { db, api, _tmp: tmp }
    }

    #[tokio::test]
    async fn target_resolves_by_id_handle_and_at_handle() {
        let fixture = fixture().await;

        let by_id = fixture.api.resolve_target("12345").await.unwrap();
        let by_handle = fixture.api.resolve_target("violator").await.unwrap();
        let by_at = fixture.api.resolve_target("@Violator").await.unwrap();

        assert_eq!(by_id.user_id, TARGET);
        assert_eq!(by_handle.user_id, TARGET);
        assert_eq!(by_at.user_id, TARGET);
    }

    #[tokio::test]
    async fn numeric_unknown_target_is_created_on_the_spot() {
        let fixture = fixture().await;

        let user = fixture.api.resolve_target("999999").await.unwrap();
        assert_eq!(user.user_id, 999_999);
        assert!(fixture.db.get_user(999_999).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_handle_is_not_found() {
        let fixture = fixture().await;

        let result = fixture.api.resolve_target("@nobody").await;
        assert!(matches!(result, Err(AppError::TargetNotFound)));
    }

    #[tokio::test]
    async fn ban_reply_carries_name_and_duration() {
        let fixture = fixture().await;

        let reply = fixture
            .api
            .ban(MOD, "@violator", "30m", "spam")
            .await
            .unwrap();

        assert!(reply.contains("Violator"));
        assert!(reply.contains("30 мин."));
        let user = fixture.db.get_user(TARGET).await.unwrap().unwrap();
        assert!(user.is_banned);
    }

    #[tokio::test]
    async fn warn_reply_reports_autoban_at_threshold() {
        let fixture = fixture().await;

        for _ in 0..2 {
            let reply = fixture.api.warn(MOD, "@violator", "spam").await.unwrap();
            assert!(!reply.contains("навсегда"));
        }
        let reply = fixture.api.warn(MOD, "@violator", "spam").await.unwrap();
        assert!(reply.contains("навсегда"));
    }

    #[tokio::test]
    async fn set_role_requires_admin() {
        let fixture = fixture().await;

        let denied = fixture.api.set_role(MOD, "@violator", 5).await;
        assert!(matches!(denied, Err(AppError::AuthzDenied)));

        fixture.api.set_role(ADMIN, "@violator", 5).await.unwrap();
        assert_eq!(fixture.db.get_role(TARGET).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn chat_toggles_are_moderator_gated() {
        let fixture = fixture().await;

        let denied = fixture.api.set_read_only(TARGET, CHAT, true).await;
        assert!(matches!(denied, Err(AppError::AuthzDenied)));

        fixture.api.set_read_only(MOD, CHAT, true).await.unwrap();
        let chat = fixture.db.get_chat(CHAT).await.unwrap().unwrap();
        assert!(chat.read_only);
    }

    #[tokio::test]
    async fn banword_round_trip_is_case_insensitive() {
        let fixture = fixture().await;

        fixture.api.add_banword(MOD, CHAT, "Spam").await.unwrap();
        assert!(fixture
            .api
            .list_banwords(CHAT)
            .await
            .unwrap()
            .contains(&"spam".to_string()));

        fixture.api.remove_banword(MOD, CHAT, "SPAM").await.unwrap();
        assert!(fixture.api.list_banwords(CHAT).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reports_flow_from_anyone_to_open_list() {
        let fixture = fixture().await;

        let reply = fixture
            .api
            .create_report(TARGET, "77", "abuse of power", CHAT)
            .await
            .unwrap();
        assert!(reply.contains("#1"));

        let open = fixture.api.list_open_reports(10).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].reported_id, MOD);

        fixture.api.accept_report(MOD, open[0].id).await.unwrap();
        assert!(fixture.api.list_open_reports(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn user_pages_clamp_to_the_last_page() {
        let fixture = fixture().await;

        let page = fixture.api.list_users(50).await.unwrap();
        assert_eq!(page.page, 0);
        assert_eq!(page.total_users, 3);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.users.len(), 3);
    }
}

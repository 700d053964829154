//! Punishment engine
//!
//! Applies, amends and lifts bans, mutes and warns. The store mutation is
//! authoritative and happens first; the per-chat platform fan-out is a
//! best-effort convergence mechanism whose failures are logged and ignored.
//! Every mutation produces exactly one audit record, except warn→autoban
//! which cascades into a second one.

use std::sync::Arc;

use crate::data::{Database, PunishmentKind, User, now_ts};
use crate::error::AppError;
use crate::platform::{ChatPermissions, PlatformGateway};
use crate::service::audit::AuditRouter;
use crate::service::authz;

/// Result of a `warn` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarnOutcome {
    /// Warn count after the increment
    pub count: i64,
    /// Whether the count reached the threshold and a permanent ban was issued
    pub auto_banned: bool,
}

pub struct PunishmentEngine {
    db: Arc<Database>,
    gateway: Arc<dyn PlatformGateway>,
    audit: Arc<AuditRouter>,
    max_warns: i64,
}

impl PunishmentEngine {
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<dyn PlatformGateway>,
        audit: Arc<AuditRouter>,
        max_warns: i64,
    ) -> Self {
        Self {
            db,
            gateway,
            audit,
            max_warns,
        }
    }

    /// Ban a user in every moderated chat.
    ///
    /// `until = 0` means permanent; otherwise an absolute epoch second.
    pub async fn ban(
        &self,
        target: i64,
        until: i64,
        reason: &str,
        issuer: i64,
    ) -> Result<(), AppError> {
        let issuer = self.require_moderator(issuer).await?;
        let target = self.db.ensure_user(target, None, None).await?;

        let chats = self.db.get_all_chats().await?;
        for chat in &chats {
            self.db
                .set_ban(target.user_id, chat.chat_id, until, Some(reason), issuer.user_id)
                .await?;
        }
        self.db
            .add_punishment(
                PunishmentKind::Ban,
                target.user_id,
                issuer.user_id,
                until,
                Some(reason),
                0,
            )
            .await?;

        for chat in &chats {
            if let Err(error) = self
                .gateway
                .ban_member(chat.chat_id, target.user_id, until)
                .await
            {
                tracing::warn!(
                    %error,
                    chat_id = chat.chat_id,
                    user_id = target.user_id,
                    "ban fan-out failed for chat"
                );
            }
        }

        self.audit
            .punishment(
                PunishmentKind::Ban,
                &target,
                &issuer,
                until,
                Some(reason),
                now_ts(),
            )
            .await;

        Ok(())
    }

    /// Lift a ban everywhere and clear the user's flags.
    pub async fn unban(&self, target: i64, issuer: i64) -> Result<(), AppError> {
        let issuer = self.require_moderator(issuer).await?;
        let target = self.db.ensure_user(target, None, None).await?;

        self.db.remove_ban(target.user_id).await?;
        self.db
            .add_punishment(PunishmentKind::Unban, target.user_id, issuer.user_id, 0, None, 0)
            .await?;

        for chat in self.db.get_all_chats().await? {
            if let Err(error) = self
                .gateway
                .unban_member(chat.chat_id, target.user_id, true)
                .await
            {
                tracing::warn!(
                    %error,
                    chat_id = chat.chat_id,
                    user_id = target.user_id,
                    "unban fan-out failed for chat"
                );
            }
        }

        self.audit
            .punishment(PunishmentKind::Unban, &target, &issuer, 0, None, now_ts())
            .await;

        Ok(())
    }

    /// Change the deadline of an active ban.
    ///
    /// Deliberately no platform fan-out: the stored deadline is
    /// authoritative and converges on the next inbound event.
    pub async fn editban(&self, target: i64, until: i64, issuer: i64) -> Result<(), AppError> {
        let issuer = self.require_moderator(issuer).await?;
        let target = self
            .db
            .get_user(target)
            .await?
            .ok_or(AppError::TargetNotFound)?;

        self.db.update_ban_duration(target.user_id, until).await?;
        self.db
            .add_punishment(
                PunishmentKind::EditBan,
                target.user_id,
                issuer.user_id,
                until,
                None,
                0,
            )
            .await?;

        self.audit
            .punishment(PunishmentKind::EditBan, &target, &issuer, until, None, now_ts())
            .await;

        Ok(())
    }

    /// Mute a user in every moderated chat.
    pub async fn mute(
        &self,
        target: i64,
        until: i64,
        reason: &str,
        issuer: i64,
    ) -> Result<(), AppError> {
        let issuer = self.require_moderator(issuer).await?;
        let target = self.db.ensure_user(target, None, None).await?;

        let chats = self.db.get_all_chats().await?;
        for chat in &chats {
            self.db
                .set_mute(target.user_id, chat.chat_id, until, Some(reason), issuer.user_id)
                .await?;
        }
        self.db
            .add_punishment(
                PunishmentKind::Mute,
                target.user_id,
                issuer.user_id,
                until,
                Some(reason),
                0,
            )
            .await?;

        for chat in &chats {
            if let Err(error) = self
                .gateway
                .restrict_member(chat.chat_id, target.user_id, ChatPermissions::muted(), until)
                .await
            {
                tracing::warn!(
                    %error,
                    chat_id = chat.chat_id,
                    user_id = target.user_id,
                    "mute fan-out failed for chat"
                );
            }
        }

        self.audit
            .punishment(
                PunishmentKind::Mute,
                &target,
                &issuer,
                until,
                Some(reason),
                now_ts(),
            )
            .await;

        Ok(())
    }

    /// Lift a mute and restore the full permissive permission set.
    pub async fn unmute(&self, target: i64, issuer: i64) -> Result<(), AppError> {
        let issuer = self.require_moderator(issuer).await?;
        let target = self.db.ensure_user(target, None, None).await?;

        self.db.remove_mute(target.user_id).await?;
        self.db
            .add_punishment(PunishmentKind::Unmute, target.user_id, issuer.user_id, 0, None, 0)
            .await?;

        for chat in self.db.get_all_chats().await? {
            if let Err(error) = self
                .gateway
                .restrict_member(
                    chat.chat_id,
                    target.user_id,
                    ChatPermissions::unrestricted(),
                    0,
                )
                .await
            {
                tracing::warn!(
                    %error,
                    chat_id = chat.chat_id,
                    user_id = target.user_id,
                    "unmute fan-out failed for chat"
                );
            }
        }

        self.audit
            .punishment(PunishmentKind::Unmute, &target, &issuer, 0, None, now_ts())
            .await;

        Ok(())
    }

    /// Change the deadline of an active mute. No fan-out, as with `editban`.
    pub async fn editmute(&self, target: i64, until: i64, issuer: i64) -> Result<(), AppError> {
        let issuer = self.require_moderator(issuer).await?;
        let target = self
            .db
            .get_user(target)
            .await?
            .ok_or(AppError::TargetNotFound)?;

        self.db.update_mute_duration(target.user_id, until).await?;
        self.db
            .add_punishment(
                PunishmentKind::EditMute,
                target.user_id,
                issuer.user_id,
                until,
                None,
                0,
            )
            .await?;

        self.audit
            .punishment(
                PunishmentKind::EditMute,
                &target,
                &issuer,
                until,
                None,
                now_ts(),
            )
            .await;

        Ok(())
    }

    /// Warn a user. Reaching the threshold issues an automatic permanent
    /// ban in the same call.
    pub async fn warn(
        &self,
        target: i64,
        reason: &str,
        issuer: i64,
    ) -> Result<WarnOutcome, AppError> {
        let issuer_user = self.require_moderator(issuer).await?;
        let target_user = self.db.ensure_user(target, None, None).await?;

        let count = self.db.add_warn(target_user.user_id).await?;
        self.db
            .add_punishment(
                PunishmentKind::Warn,
                target_user.user_id,
                issuer_user.user_id,
                0,
                Some(reason),
                0,
            )
            .await?;

        self.audit
            .punishment(
                PunishmentKind::Warn,
                &target_user,
                &issuer_user,
                0,
                Some(reason),
                now_ts(),
            )
            .await;

        let auto_banned = count >= self.max_warns;
        if auto_banned {
            let reason = format!("Autoban: {count} warns");
            self.ban(target_user.user_id, 0, &reason, issuer).await?;
        }

        Ok(WarnOutcome { count, auto_banned })
    }

    /// Reset the warn counter to zero.
    pub async fn unwarn(&self, target: i64, issuer: i64) -> Result<(), AppError> {
        let issuer = self.require_moderator(issuer).await?;
        let target = self.db.ensure_user(target, None, None).await?;

        self.db.reset_warns(target.user_id).await?;
        self.db
            .add_punishment(PunishmentKind::Unwarn, target.user_id, issuer.user_id, 0, None, 0)
            .await?;

        self.audit
            .punishment(PunishmentKind::Unwarn, &target, &issuer, 0, None, now_ts())
            .await;

        Ok(())
    }

    /// Service-wide permanent ban. The global-ban row is authoritative;
    /// the per-chat fan-out converges lazily on later inbound events.
    pub async fn globalban(
        &self,
        target: i64,
        reason: &str,
        issuer: i64,
    ) -> Result<(), AppError> {
        let issuer = self.require_admin(issuer).await?;
        let target = self.db.ensure_user(target, None, None).await?;

        self.db
            .add_global_ban(target.user_id, Some(reason), issuer.user_id)
            .await?;
        self.db
            .add_punishment(
                PunishmentKind::GlobalBan,
                target.user_id,
                issuer.user_id,
                0,
                Some(reason),
                0,
            )
            .await?;

        for chat in self.db.get_all_chats().await? {
            if let Err(error) = self.gateway.ban_member(chat.chat_id, target.user_id, 0).await {
                tracing::warn!(
                    %error,
                    chat_id = chat.chat_id,
                    user_id = target.user_id,
                    "global ban fan-out failed for chat"
                );
            }
        }

        self.audit
            .punishment(
                PunishmentKind::GlobalBan,
                &target,
                &issuer,
                0,
                Some(reason),
                now_ts(),
            )
            .await;

        Ok(())
    }

    async fn require_moderator(&self, issuer: i64) -> Result<User, AppError> {
        let user = self.db.get_user(issuer).await?.ok_or(AppError::AuthzDenied)?;
        if !authz::can_moderate(user.role) {
            return Err(AppError::AuthzDenied);
        }
        Ok(user)
    }

    async fn require_admin(&self, issuer: i64) -> Result<User, AppError> {
        let user = self.db.get_user(issuer).await?.ok_or(AppError::AuthzDenied)?;
        if !authz::can_admin(user.role) {
            return Err(AppError::AuthzDenied);
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MockPlatformGateway;
    use crate::service::audit::AuditTopics;
    use tempfile::TempDir;

    const MOD_ID: i64 = 77;
    const ADMIN_ID: i64 = 88;
    const TARGET_ID: i64 = 12345;

    async fn setup(gateway: MockPlatformGateway) -> (Arc<Database>, PunishmentEngine, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            Database::connect(&temp_dir.path().join("test.db"))
                .await
                .unwrap(),
        );

        db.ensure_chat(-1001, Some("A")).await.unwrap();
        db.ensure_chat(-1002, Some("B")).await.unwrap();
        db.ensure_user(MOD_ID, Some("mod"), Some("Mod")).await.unwrap();
        db.set_role(MOD_ID, authz::ROLE_MODERATOR).await.unwrap();
        db.ensure_user(ADMIN_ID, Some("admin"), Some("Admin"))
            .await
            .unwrap();
        db.set_role(ADMIN_ID, authz::ROLE_ADMIN).await.unwrap();
        db.ensure_user(TARGET_ID, Some("target"), Some("Target"))
            .await
            .unwrap();

        let gateway: Arc<dyn PlatformGateway> = Arc::new(gateway);
        let audit = Arc::new(AuditRouter::new(
            gateway.clone(),
            Some(-9000),
            AuditTopics::default(),
        ));
        let engine = PunishmentEngine::new(db.clone(), gateway, audit, 3);
        (db, engine, temp_dir)
    }

    fn relaxed_gateway() -> MockPlatformGateway {
        let mut gateway = MockPlatformGateway::new();
        gateway.expect_ban_member().returning(|_, _, _| Ok(()));
        gateway.expect_unban_member().returning(|_, _, _| Ok(()));
        gateway
            .expect_restrict_member()
            .returning(|_, _, _, _| Ok(()));
        gateway.expect_send_message().returning(|_, _, _| Ok(()));
        gateway.expect_delete_message().returning(|_, _| Ok(()));
        gateway
    }

    #[tokio::test]
    async fn ban_records_one_row_per_chat_and_sets_flags() {
        let mut gateway = MockPlatformGateway::new();
        gateway
            .expect_ban_member()
            .times(2)
            .returning(|_, _, _| Ok(()));
        gateway.expect_send_message().returning(|_, _, _| Ok(()));
        let (db, engine, _tmp) = setup(gateway).await;

        let until = now_ts() + 1800;
        engine.ban(TARGET_ID, until, "spam", MOD_ID).await.unwrap();

        let bans = db.get_active_bans(TARGET_ID).await.unwrap();
        assert_eq!(bans.len(), 2);
        assert!(bans.iter().all(|b| b.until == until));
        let user = db.get_user(TARGET_ID).await.unwrap().unwrap();
        assert!(user.is_banned);
        assert_eq!(user.ban_until, until);
    }

    #[tokio::test]
    async fn ban_then_unban_leaves_no_active_ban() {
        let (db, engine, _tmp) = setup(relaxed_gateway()).await;

        engine.ban(TARGET_ID, 0, "spam", MOD_ID).await.unwrap();
        engine.unban(TARGET_ID, MOD_ID).await.unwrap();

        assert!(db.get_active_bans(TARGET_ID).await.unwrap().is_empty());
        let user = db.get_user(TARGET_ID).await.unwrap().unwrap();
        assert!(!user.is_banned);
        assert_eq!(user.ban_until, 0);
    }

    #[tokio::test]
    async fn non_staff_issuer_is_denied() {
        let (db, engine, _tmp) = setup(relaxed_gateway()).await;
        db.ensure_user(5, None, None).await.unwrap();

        let error = engine.ban(TARGET_ID, 0, "x", 5).await.unwrap_err();
        assert!(matches!(error, AppError::AuthzDenied));
        assert!(db.get_active_bans(TARGET_ID).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn editban_updates_deadline_without_fan_out() {
        let mut gateway = MockPlatformGateway::new();
        // No ban_member expectation: editban must not touch the platform.
        gateway.expect_send_message().returning(|_, _, _| Ok(()));
        let (db, engine, _tmp) = setup(gateway).await;

        db.set_ban(TARGET_ID, -1001, now_ts() + 60, Some("x"), MOD_ID)
            .await
            .unwrap();

        let new_until = now_ts() + 7200;
        engine.editban(TARGET_ID, new_until, MOD_ID).await.unwrap();

        let bans = db.get_active_bans(TARGET_ID).await.unwrap();
        assert_eq!(bans[0].until, new_until);
        let user = db.get_user(TARGET_ID).await.unwrap().unwrap();
        assert_eq!(user.ban_until, new_until);
    }

    #[tokio::test]
    async fn editban_without_active_ban_is_target_not_found() {
        let (_db, engine, _tmp) = setup(relaxed_gateway()).await;

        let error = engine.editban(TARGET_ID, 0, MOD_ID).await.unwrap_err();
        assert!(matches!(error, AppError::TargetNotFound));
    }

    #[tokio::test]
    async fn fan_out_failure_does_not_abort_the_mutation() {
        let mut gateway = MockPlatformGateway::new();
        gateway
            .expect_ban_member()
            .times(2)
            .returning(|_, _, _| Err(AppError::Platform("down".to_string())));
        gateway.expect_send_message().returning(|_, _, _| Ok(()));
        let (db, engine, _tmp) = setup(gateway).await;

        engine.ban(TARGET_ID, 0, "spam", MOD_ID).await.unwrap();
        assert!(db.get_user(TARGET_ID).await.unwrap().unwrap().is_banned);
    }

    #[tokio::test]
    async fn third_warn_triggers_exactly_one_autoban() {
        let (db, engine, _tmp) = setup(relaxed_gateway()).await;

        let first = engine.warn(TARGET_ID, "bad", MOD_ID).await.unwrap();
        assert_eq!(first, WarnOutcome { count: 1, auto_banned: false });
        let second = engine.warn(TARGET_ID, "bad", MOD_ID).await.unwrap();
        assert!(!second.auto_banned);

        let third = engine.warn(TARGET_ID, "bad", MOD_ID).await.unwrap();
        assert_eq!(third, WarnOutcome { count: 3, auto_banned: true });

        let user = db.get_user(TARGET_ID).await.unwrap().unwrap();
        assert!(user.is_banned);
        assert_eq!(user.ban_until, 0);

        let history = db.get_punishment_history(TARGET_ID, 10).await.unwrap();
        let bans = history.iter().filter(|p| p.kind == "ban").count();
        assert_eq!(bans, 1);
        assert_eq!(
            history[0].reason.as_deref(),
            Some("Autoban: 3 warns"),
        );
    }

    #[tokio::test]
    async fn unwarn_resets_counter_to_zero() {
        let (db, engine, _tmp) = setup(relaxed_gateway()).await;

        engine.warn(TARGET_ID, "bad", MOD_ID).await.unwrap();
        engine.unwarn(TARGET_ID, MOD_ID).await.unwrap();

        let user = db.get_user(TARGET_ID).await.unwrap().unwrap();
        assert_eq!(user.warns_count, 0);
    }

    #[tokio::test]
    async fn mute_restricts_in_every_chat() {
        let mut gateway = MockPlatformGateway::new();
        gateway
            .expect_restrict_member()
            .withf(|_, _, permissions, _| !permissions.send_messages)
            .times(2)
            .returning(|_, _, _, _| Ok(()));
        gateway.expect_send_message().returning(|_, _, _| Ok(()));
        let (db, engine, _tmp) = setup(gateway).await;

        let until = now_ts() + 3600;
        engine.mute(TARGET_ID, until, "flood", MOD_ID).await.unwrap();

        let user = db.get_user(TARGET_ID).await.unwrap().unwrap();
        assert!(user.is_muted);
        assert_eq!(user.mute_until, until);
    }

    #[tokio::test]
    async fn globalban_requires_admin() {
        let (db, engine, _tmp) = setup(relaxed_gateway()).await;

        let error = engine.globalban(TARGET_ID, "raid", MOD_ID).await.unwrap_err();
        assert!(matches!(error, AppError::AuthzDenied));

        engine.globalban(TARGET_ID, "raid", ADMIN_ID).await.unwrap();
        assert!(db.is_globally_banned(TARGET_ID).await.unwrap());
    }
}

//! SQLite store operations
//!
//! All persistent state goes through this module. The connection pool is
//! process-wide; every mutation commits synchronously. Journal mode is WAL
//! with a 5-second busy timeout, so concurrent handlers serialize cleanly.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};

use super::models::*;
use crate::error::AppError;

const BUSY_TIMEOUT_MS: u64 = 5000;

/// Current epoch second.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Store wrapper around the shared connection pool.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connect to the SQLite store
    ///
    /// Creates the database file if it doesn't exist and brings the schema
    /// up to date. Migrations are additive only: missing columns are added
    /// with defaults, nothing is ever dropped.
    ///
    /// # Errors
    /// Returns error if connection or schema setup fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
            }
        }

        let db_path = path.to_str().ok_or_else(|| {
            AppError::Config(format!(
                "database path must be valid UTF-8: {}",
                path.display()
            ))
        })?;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(AppError::Database)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        init_schema(&pool).await?;
        apply_additive_migrations(&pool).await?;

        tracing::info!("Store connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Idempotent upsert of a user; touches `last_seen`.
    ///
    /// Handle and display name are only overwritten with non-empty values,
    /// and the stored role is never lowered (or touched at all) here.
    pub async fn ensure_user(
        &self,
        user_id: i64,
        handle: Option<&str>,
        display_name: Option<&str>,
    ) -> Result<User, AppError> {
        let now = now_ts();
        let handle = handle.map(|h| h.trim_start_matches('@')).unwrap_or("");
        let display_name = display_name.unwrap_or("");

        sqlx::query(
            r#"
            INSERT INTO users (user_id, handle, display_name, joined_at, last_seen)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                handle = CASE WHEN excluded.handle != '' THEN excluded.handle ELSE handle END,
                display_name = CASE WHEN excluded.display_name != ''
                    THEN excluded.display_name ELSE display_name END,
                last_seen = excluded.last_seen
            "#,
        )
        .bind(user_id)
        .bind(handle)
        .bind(display_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_user(user_id)
            .await?
            .ok_or(AppError::TargetNotFound)
    }

    /// Get a user by id
    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Look a user up by numeric id or handle.
    ///
    /// Handles match case-insensitively and with the leading `@` stripped.
    pub async fn find_user(&self, query: &str) -> Result<Option<User>, AppError> {
        let query = query.trim();
        if let Ok(user_id) = query.parse::<i64>() {
            return self.get_user(user_id).await;
        }

        let handle = query.trim_start_matches('@').to_lowercase();
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(handle) = ?")
            .bind(&handle)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Page through users, ordered by id.
    pub async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>, AppError> {
        let users =
            sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY user_id LIMIT ? OFFSET ?")
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;

        Ok(users)
    }

    pub async fn count_users(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Top users by lifetime message count, descending.
    pub async fn get_top_users(&self, n: i64) -> Result<Vec<User>, AppError> {
        let users =
            sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY messages_count DESC LIMIT ?")
                .bind(n)
                .fetch_all(&self.pool)
                .await?;

        Ok(users)
    }

    /// Users seen within the last `window_sec` seconds.
    pub async fn get_online_users(&self, window_sec: i64) -> Result<Vec<User>, AppError> {
        let cutoff = now_ts() - window_sec;
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE last_seen >= ? ORDER BY last_seen DESC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// Staff (`role > 0`), highest role first.
    pub async fn get_staff_users(&self) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE role > 0 ORDER BY role DESC, user_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    pub async fn increment_messages(&self, user_id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET messages_count = messages_count + 1 WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn touch_last_seen(&self, user_id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_seen = ? WHERE user_id = ?")
            .bind(now_ts())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Role level of a user; absent users have level 0.
    pub async fn get_role(&self, user_id: i64) -> Result<i64, AppError> {
        let role = sqlx::query_scalar::<_, i64>("SELECT role FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(role.unwrap_or(0))
    }

    pub async fn set_role(&self, user_id: i64, level: i64) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE user_id = ?")
            .bind(level)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::TargetNotFound);
        }

        Ok(())
    }

    // =========================================================================
    // Chats
    // =========================================================================

    /// Idempotent upsert of a chat.
    pub async fn ensure_chat(&self, chat_id: i64, title: Option<&str>) -> Result<Chat, AppError> {
        sqlx::query(
            r#"
            INSERT INTO chats (chat_id, title) VALUES (?, ?)
            ON CONFLICT(chat_id) DO UPDATE SET
                title = CASE WHEN excluded.title != '' THEN excluded.title ELSE title END
            "#,
        )
        .bind(chat_id)
        .bind(title.unwrap_or(""))
        .execute(&self.pool)
        .await?;

        let chat = sqlx::query_as::<_, Chat>("SELECT * FROM chats WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(chat)
    }

    pub async fn get_chat(&self, chat_id: i64) -> Result<Option<Chat>, AppError> {
        let chat = sqlx::query_as::<_, Chat>("SELECT * FROM chats WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(chat)
    }

    /// Every registered moderated chat.
    pub async fn get_all_chats(&self) -> Result<Vec<Chat>, AppError> {
        let chats = sqlx::query_as::<_, Chat>("SELECT * FROM chats ORDER BY chat_id")
            .fetch_all(&self.pool)
            .await?;

        Ok(chats)
    }

    pub async fn set_read_only(&self, chat_id: i64, value: bool) -> Result<(), AppError> {
        self.set_chat_flag(chat_id, "read_only", value).await
    }

    pub async fn set_antispam(&self, chat_id: i64, value: bool) -> Result<(), AppError> {
        self.set_chat_flag(chat_id, "antispam", value).await
    }

    pub async fn set_ai_moderation(&self, chat_id: i64, value: bool) -> Result<(), AppError> {
        self.set_chat_flag(chat_id, "ai_moderation", value).await
    }

    async fn set_chat_flag(&self, chat_id: i64, column: &str, value: bool) -> Result<(), AppError> {
        // Column names come from the three callers above, never from input.
        let sql = format!("UPDATE chats SET {column} = ? WHERE chat_id = ?");
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::TargetNotFound);
        }

        Ok(())
    }

    // =========================================================================
    // Active bans / mutes
    // =========================================================================

    /// Upsert the active ban for one (user, chat) pair.
    ///
    /// At most one active ban exists per pair; the user's denormalized
    /// flags are recomputed from the rows afterwards.
    pub async fn set_ban(
        &self,
        user_id: i64,
        chat_id: i64,
        until: i64,
        reason: Option<&str>,
        issued_by: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO bans (user_id, chat_id, until, reason, issued_by, issued_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(until)
        .bind(reason)
        .bind(issued_by)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;

        self.refresh_punishment_flags(user_id).await
    }

    /// Remove every active ban row for a user and clear the flags.
    pub async fn remove_ban(&self, user_id: i64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM bans WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        self.refresh_punishment_flags(user_id).await
    }

    /// Change the deadline on every active ban row for a user.
    pub async fn update_ban_duration(&self, user_id: i64, until: i64) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE bans SET until = ? WHERE user_id = ?")
            .bind(until)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::TargetNotFound);
        }

        self.refresh_punishment_flags(user_id).await
    }

    pub async fn get_active_bans(&self, user_id: i64) -> Result<Vec<ActiveBan>, AppError> {
        let bans = sqlx::query_as::<_, ActiveBan>("SELECT * FROM bans WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(bans)
    }

    pub async fn set_mute(
        &self,
        user_id: i64,
        chat_id: i64,
        until: i64,
        reason: Option<&str>,
        issued_by: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO mutes (user_id, chat_id, until, reason, issued_by, issued_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(until)
        .bind(reason)
        .bind(issued_by)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;

        self.refresh_punishment_flags(user_id).await
    }

    pub async fn remove_mute(&self, user_id: i64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM mutes WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        self.refresh_punishment_flags(user_id).await
    }

    pub async fn update_mute_duration(&self, user_id: i64, until: i64) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE mutes SET until = ? WHERE user_id = ?")
            .bind(until)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::TargetNotFound);
        }

        self.refresh_punishment_flags(user_id).await
    }

    pub async fn get_active_mutes(&self, user_id: i64) -> Result<Vec<ActiveMute>, AppError> {
        let mutes = sqlx::query_as::<_, ActiveMute>("SELECT * FROM mutes WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(mutes)
    }

    /// Recompute `is_banned/ban_until/is_muted/mute_until` from the
    /// per-(user, chat) rows. The rows are authoritative; the user columns
    /// are a materialized view for UI speed.
    pub async fn refresh_punishment_flags(&self, user_id: i64) -> Result<(), AppError> {
        let ban_deadlines: Vec<i64> = self
            .get_active_bans(user_id)
            .await?
            .iter()
            .map(|b| b.until)
            .collect();
        let mute_deadlines: Vec<i64> = self
            .get_active_mutes(user_id)
            .await?
            .iter()
            .map(|m| m.until)
            .collect();
        let (is_banned, ban_until) = flags_from(&ban_deadlines);
        let (is_muted, mute_until) = flags_from(&mute_deadlines);

        sqlx::query(
            r#"
            UPDATE users SET is_banned = ?, ban_until = ?, is_muted = ?, mute_until = ?
            WHERE user_id = ?
            "#,
        )
        .bind(is_banned)
        .bind(ban_until)
        .bind(is_muted)
        .bind(mute_until)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Warns
    // =========================================================================

    /// Atomically increment the warn counter and return the new count.
    pub async fn add_warn(&self, user_id: i64) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "UPDATE users SET warns_count = warns_count + 1 WHERE user_id = ? RETURNING warns_count",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        count.ok_or(AppError::TargetNotFound)
    }

    /// Reset the warn counter to zero.
    pub async fn reset_warns(&self, user_id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET warns_count = 0 WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // =========================================================================
    // Global bans
    // =========================================================================

    pub async fn add_global_ban(
        &self,
        user_id: i64,
        reason: Option<&str>,
        banned_by: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO global_bans (user_id, reason, banned_by, banned_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(reason)
        .bind(banned_by)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn remove_global_ban(&self, user_id: i64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM global_bans WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn is_globally_banned(&self, user_id: i64) -> Result<bool, AppError> {
        let exists =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM global_bans WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists > 0)
    }

    pub async fn get_global_ban(&self, user_id: i64) -> Result<Option<GlobalBan>, AppError> {
        let ban = sqlx::query_as::<_, GlobalBan>("SELECT * FROM global_bans WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(ban)
    }

    // =========================================================================
    // Punishment log (append-only)
    // =========================================================================

    /// Append one row to the audit log of issued actions.
    pub async fn add_punishment(
        &self,
        kind: PunishmentKind,
        user_id: i64,
        issued_by: i64,
        until: i64,
        reason: Option<&str>,
        chat_id: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO punishments (kind, user_id, issued_by, issued_at, until, reason, chat_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(kind.as_str())
        .bind(user_id)
        .bind(issued_by)
        .bind(now_ts())
        .bind(until)
        .bind(reason)
        .bind(chat_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent log entries for a user.
    pub async fn get_punishment_history(
        &self,
        user_id: i64,
        n: i64,
    ) -> Result<Vec<Punishment>, AppError> {
        let rows = sqlx::query_as::<_, Punishment>(
            "SELECT * FROM punishments WHERE user_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(n)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // =========================================================================
    // Reports
    // =========================================================================

    pub async fn add_report(
        &self,
        reporter_id: i64,
        reported_id: i64,
        reason: &str,
        chat_id: i64,
    ) -> Result<Report, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO reports (reporter_id, reported_id, reason, chat_id, created_at, status)
            VALUES (?, ?, ?, ?, ?, 'open')
            "#,
        )
        .bind(reporter_id)
        .bind(reported_id)
        .bind(reason)
        .bind(chat_id)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;

        let report = sqlx::query_as::<_, Report>("SELECT * FROM reports WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(&self.pool)
            .await?;

        Ok(report)
    }

    /// Oldest open reports first.
    pub async fn get_open_reports(&self, n: i64) -> Result<Vec<Report>, AppError> {
        let reports = sqlx::query_as::<_, Report>(
            "SELECT * FROM reports WHERE status = 'open' ORDER BY id LIMIT ?",
        )
        .bind(n)
        .fetch_all(&self.pool)
        .await?;

        Ok(reports)
    }

    pub async fn accept_report(&self, report_id: i64) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE reports SET status = 'accepted' WHERE id = ?")
            .bind(report_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::TargetNotFound);
        }

        Ok(())
    }

    // =========================================================================
    // Word filters
    // =========================================================================

    /// Add a filtered word for a chat. Case-insensitive, unique per chat.
    pub async fn add_banword(&self, chat_id: i64, word: &str) -> Result<(), AppError> {
        sqlx::query("INSERT OR IGNORE INTO word_filters (chat_id, word) VALUES (?, ?)")
            .bind(chat_id)
            .bind(word.trim().to_lowercase())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn remove_banword(&self, chat_id: i64, word: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM word_filters WHERE chat_id = ? AND word = ?")
            .bind(chat_id)
            .bind(word.trim().to_lowercase())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn list_banwords(&self, chat_id: i64) -> Result<Vec<String>, AppError> {
        let words = sqlx::query_scalar::<_, String>(
            "SELECT word FROM word_filters WHERE chat_id = ? ORDER BY word",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(words)
    }

    // =========================================================================
    // Spam tracker
    // =========================================================================

    /// Record a message timestamp and return the count within the sliding
    /// window (the just-recorded message included). Events that fell out of
    /// the window are pruned on the way.
    pub async fn check_spam(
        &self,
        user_id: i64,
        chat_id: i64,
        now: i64,
        window: i64,
    ) -> Result<i64, AppError> {
        sqlx::query("INSERT INTO spam_events (user_id, chat_id, ts) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(chat_id)
            .bind(now)
            .execute(&self.pool)
            .await?;

        sqlx::query("DELETE FROM spam_events WHERE user_id = ? AND chat_id = ? AND ts < ?")
            .bind(user_id)
            .bind(chat_id)
            .bind(now - window)
            .execute(&self.pool)
            .await?;

        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM spam_events WHERE user_id = ? AND chat_id = ? AND ts >= ?",
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(now - window)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Increment the spam strike counter for a (user, chat) pair.
    pub async fn add_spam_strike(&self, user_id: i64, chat_id: i64) -> Result<i64, AppError> {
        let strikes = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO spam_strikes (user_id, chat_id, strikes) VALUES (?, ?, 1)
            ON CONFLICT(user_id, chat_id) DO UPDATE SET strikes = strikes + 1
            RETURNING strikes
            "#,
        )
        .bind(user_id)
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(strikes)
    }

    pub async fn reset_spam_strikes(&self, user_id: i64, chat_id: i64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM spam_strikes WHERE user_id = ? AND chat_id = ?")
            .bind(user_id)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Collapse active-row deadlines into `(flag, until)`: any permanent row
/// wins, otherwise the latest deadline.
fn flags_from(deadlines: &[i64]) -> (bool, i64) {
    if deadlines.is_empty() {
        return (false, 0);
    }
    if deadlines.contains(&0) {
        return (true, 0);
    }
    (true, deadlines.iter().copied().max().unwrap_or(0))
}

// =============================================================================
// Schema
// =============================================================================

async fn init_schema(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER PRIMARY KEY,
            handle TEXT NOT NULL DEFAULT '',
            display_name TEXT NOT NULL DEFAULT '',
            role INTEGER NOT NULL DEFAULT 0,
            ui_lang TEXT NOT NULL DEFAULT 'ru',
            messages_count INTEGER NOT NULL DEFAULT 0,
            warns_count INTEGER NOT NULL DEFAULT 0,
            is_banned INTEGER NOT NULL DEFAULT 0,
            ban_until INTEGER NOT NULL DEFAULT 0,
            is_muted INTEGER NOT NULL DEFAULT 0,
            mute_until INTEGER NOT NULL DEFAULT 0,
            joined_at INTEGER NOT NULL DEFAULT 0,
            last_seen INTEGER NOT NULL DEFAULT 0
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS chats (
            chat_id INTEGER PRIMARY KEY,
            title TEXT NOT NULL DEFAULT '',
            read_only INTEGER NOT NULL DEFAULT 0,
            antispam INTEGER NOT NULL DEFAULT 0,
            ai_moderation INTEGER NOT NULL DEFAULT 0
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS punishments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            issued_by INTEGER NOT NULL,
            issued_at INTEGER NOT NULL,
            until INTEGER NOT NULL DEFAULT 0,
            reason TEXT,
            chat_id INTEGER NOT NULL DEFAULT 0
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS bans (
            user_id INTEGER NOT NULL,
            chat_id INTEGER NOT NULL,
            until INTEGER NOT NULL DEFAULT 0,
            reason TEXT,
            issued_by INTEGER NOT NULL,
            issued_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, chat_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS mutes (
            user_id INTEGER NOT NULL,
            chat_id INTEGER NOT NULL,
            until INTEGER NOT NULL DEFAULT 0,
            reason TEXT,
            issued_by INTEGER NOT NULL,
            issued_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, chat_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS global_bans (
            user_id INTEGER PRIMARY KEY,
            reason TEXT,
            banned_by INTEGER NOT NULL,
            banned_at INTEGER NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS word_filters (
            chat_id INTEGER NOT NULL,
            word TEXT NOT NULL,
            PRIMARY KEY (chat_id, word)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS reports (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            reporter_id INTEGER NOT NULL,
            reported_id INTEGER NOT NULL,
            reason TEXT NOT NULL,
            chat_id INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'open'
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS spam_events (
            user_id INTEGER NOT NULL,
            chat_id INTEGER NOT NULL,
            ts INTEGER NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS spam_strikes (
            user_id INTEGER NOT NULL,
            chat_id INTEGER NOT NULL,
            strikes INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, chat_id)
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_punishments_user ON punishments (user_id)",
        "CREATE INDEX IF NOT EXISTS idx_spam_events_pair ON spam_events (user_id, chat_id, ts)",
        "CREATE INDEX IF NOT EXISTS idx_users_handle ON users (handle)",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

/// Additive schema upgrades for files created by older versions.
///
/// Missing columns are added with their defaults; columns are never dropped
/// or retyped.
async fn apply_additive_migrations(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    let expected: [(&str, &str, &str); 6] = [
        ("users", "ui_lang", "TEXT NOT NULL DEFAULT 'ru'"),
        ("users", "warns_count", "INTEGER NOT NULL DEFAULT 0"),
        ("users", "mute_until", "INTEGER NOT NULL DEFAULT 0"),
        ("users", "is_muted", "INTEGER NOT NULL DEFAULT 0"),
        ("chats", "ai_moderation", "INTEGER NOT NULL DEFAULT 0"),
        ("reports", "chat_id", "INTEGER NOT NULL DEFAULT 0"),
    ];

    for (table, column, ddl) in expected {
        if !column_exists(pool, table, column).await? {
            let sql = format!("ALTER TABLE {table} ADD COLUMN {column} {ddl}");
            sqlx::query(&sql).execute(pool).await?;
            tracing::info!(table, column, "Added missing column");
        }
    }

    Ok(())
}

async fn column_exists(pool: &Pool<Sqlite>, table: &str, column: &str) -> Result<bool, AppError> {
    let sql = format!("PRAGMA table_info({table})");
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    for row in rows {
        let name: String = row.try_get("name")?;
        if name == column {
            return Ok(true);
        }
    }

    Ok(false)
}

//! Registration repository.
//!
//! A player asks for a code over IRC (`!register`), then posts
//! `<bot> confirm <nick> <code>` in their faction's chat. The poster's game
//! account and faction come from the chat post itself, so a confirmed
//! registration binds the IRC nick to that account.

use super::DbError;
use crate::confirm::TrustLevel;
use crate::feed::FactionId;
use rand::Rng;
use rand::distributions::Alphanumeric;
use sqlx::SqlitePool;

/// How long a registration code stays valid, in seconds.
const CODE_TTL_SECS: i64 = 3600;

const CODE_LEN: usize = 8;

/// A confirmed registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub nick: String,
    pub faction: FactionId,
    pub user_id: u64,
    pub level: TrustLevel,
    pub registered_at: i64,
}

/// Repository for registration operations.
pub struct RegistrationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RegistrationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Issue a fresh code for `nick`, replacing any earlier one.
    pub async fn begin(&self, nick: &str) -> Result<String, DbError> {
        let code: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CODE_LEN)
            .map(char::from)
            .collect();
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO pending_registrations (nick, code, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(nick) DO UPDATE SET code = excluded.code, created_at = excluded.created_at
            "#,
        )
        .bind(nick)
        .bind(&code)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(code)
    }

    /// Confirm a pending code.
    ///
    /// Returns false when there is no pending code for the nick, the code
    /// does not match, or it has expired. A matching code is consumed.
    pub async fn confirm(
        &self,
        faction: FactionId,
        user_id: u64,
        nick: &str,
        level: TrustLevel,
        code: &str,
    ) -> Result<bool, DbError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let pending = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT code, created_at FROM pending_registrations
            WHERE nick = ? COLLATE NOCASE
            "#,
        )
        .bind(nick)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((expected, created_at)) = pending else {
            return Ok(false);
        };
        if expected != code || now - created_at > CODE_TTL_SECS {
            return Ok(false);
        }

        sqlx::query("DELETE FROM pending_registrations WHERE nick = ? COLLATE NOCASE")
            .bind(nick)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO registrations (nick, faction_id, user_id, level, registered_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(nick) DO UPDATE SET
                faction_id = excluded.faction_id,
                user_id = excluded.user_id,
                level = excluded.level,
                registered_at = excluded.registered_at
            "#,
        )
        .bind(nick)
        .bind(faction.0 as i64)
        .bind(user_id as i64)
        .bind(level.as_i64())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Look up a confirmed registration by nick.
    pub async fn find(&self, nick: &str) -> Result<Option<Registration>, DbError> {
        let row = sqlx::query_as::<_, (String, i64, i64, i64, i64)>(
            r#"
            SELECT nick, faction_id, user_id, level, registered_at
            FROM registrations
            WHERE nick = ? COLLATE NOCASE
            "#,
        )
        .bind(nick)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(nick, faction, user_id, level, registered_at)| Registration {
            nick,
            faction: FactionId(faction as u64),
            user_id: user_id as u64,
            level: TrustLevel::from_permission(level),
            registered_at,
        }))
    }
}

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{NewUser, PurgeStats, ResetCode, Session, Store, User, MAX_CODE_ATTEMPTS};

#[derive(Clone)]
pub struct PgStore {
    pub db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .context("run migrations")?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"SELECT id, name, email, password_hash, created_at FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn create_user(&self, new: NewUser<'_>) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, name, email, password_hash, created_at
            "#,
        )
        .bind(new.name)
        .bind(new.email)
        .bind(new.password_hash)
        .fetch_optional(&self.db)
        .await
        .context("insert user")?;
        Ok(user)
    }

    async fn update_password(&self, email: &str, password_hash: &str) -> anyhow::Result<bool> {
        let result = sqlx::query(r#"UPDATE users SET password_hash = $2 WHERE email = $1"#)
            .bind(email)
            .bind(password_hash)
            .execute(&self.db)
            .await
            .context("update password")?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_reset_code(
        &self,
        email: &str,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<ResetCode> {
        let row = sqlx::query_as::<_, ResetCode>(
            r#"
            INSERT INTO password_reset_codes (email, code, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, email, code, expires_at, used, attempts
            "#,
        )
        .bind(email)
        .bind(code)
        .bind(expires_at)
        .fetch_one(&self.db)
        .await
        .context("insert reset code")?;
        Ok(row)
    }

    async fn consume_reset_code(
        &self,
        email: &str,
        code: &str,
        now: OffsetDateTime,
        hold_until: OffsetDateTime,
    ) -> anyhow::Result<Option<ResetCode>> {
        // Single statement so two concurrent verifications cannot both win.
        let row = sqlx::query_as::<_, ResetCode>(
            r#"
            UPDATE password_reset_codes
               SET used = TRUE, expires_at = $4
             WHERE id = (
                    SELECT id
                      FROM password_reset_codes
                     WHERE email = $1 AND code = $2 AND used = FALSE AND expires_at > $3
                       AND attempts < $5
                     ORDER BY created_at DESC
                     LIMIT 1
                     FOR UPDATE SKIP LOCKED
                   )
            RETURNING id, email, code, expires_at, used, attempts
            "#,
        )
        .bind(email)
        .bind(code)
        .bind(now)
        .bind(hold_until)
        .bind(MAX_CODE_ATTEMPTS)
        .fetch_optional(&self.db)
        .await
        .context("consume reset code")?;
        Ok(row)
    }

    async fn record_failed_attempt(&self, email: &str, now: OffsetDateTime) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE password_reset_codes
               SET attempts = attempts + 1
             WHERE email = $1 AND used = FALSE AND expires_at > $2
            "#,
        )
        .bind(email)
        .bind(now)
        .execute(&self.db)
        .await
        .context("record failed code attempt")?;
        Ok(result.rows_affected())
    }

    async fn redeem_reset_grant(&self, id: Uuid, email: &str) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"DELETE FROM password_reset_codes WHERE id = $1 AND email = $2 AND used = TRUE"#,
        )
        .bind(id)
        .bind(email)
        .execute(&self.db)
        .await
        .context("redeem reset grant")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_reset_codes_for(&self, email: &str) -> anyhow::Result<u64> {
        let result = sqlx::query(r#"DELETE FROM password_reset_codes WHERE email = $1"#)
            .bind(email)
            .execute(&self.db)
            .await
            .context("delete reset codes")?;
        Ok(result.rows_affected())
    }

    async fn create_session(&self, session: &Session) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.db)
        .await
        .context("insert session")?;
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> anyhow::Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            r#"SELECT id, user_id, created_at, expires_at FROM sessions WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find session")?;
        Ok(session)
    }

    async fn delete_session(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(r#"DELETE FROM sessions WHERE id = $1"#)
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete session")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query(r#"DELETE FROM sessions WHERE user_id = $1"#)
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("delete user sessions")?;
        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> anyhow::Result<PurgeStats> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let codes = sqlx::query(r#"DELETE FROM password_reset_codes WHERE expires_at <= $1"#)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("purge reset codes")?
            .rows_affected();
        let sessions = sqlx::query(r#"DELETE FROM sessions WHERE expires_at <= $1"#)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("purge sessions")?
            .rows_affected();
        tx.commit().await.context("commit tx")?;
        Ok(PurgeStats { codes, sessions })
    }
}

use async_trait::async_trait;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String, // empty for social accounts
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn has_password(&self) -> bool {
        !self.password_hash.is_empty()
    }
}

/// Fields needed to insert a user; id and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}

#[derive(Debug, Clone, FromRow)]
pub struct ResetCode {
    pub id: Uuid,
    pub email: String,
    pub code: String,
    pub expires_at: OffsetDateTime,
    pub used: bool,
    pub attempts: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

/// Failed verifications after which a code can no longer be redeemed.
pub const MAX_CODE_ATTEMPTS: i32 = 5;

/// Row counts removed by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub codes: u64,
    pub sessions: u64,
}

/// Persistence for users, reset codes and sessions.
///
/// Every method is a single atomic operation against the backing store;
/// callers never hold a lock across calls.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    /// Inserts a user. Returns `None` when the email is already taken.
    async fn create_user(&self, new: NewUser<'_>) -> anyhow::Result<Option<User>>;

    /// Overwrites the password hash. Returns `false` if no user has that email.
    async fn update_password(&self, email: &str, password_hash: &str) -> anyhow::Result<bool>;

    async fn insert_reset_code(
        &self,
        email: &str,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<ResetCode>;

    /// Marks a matching, unused, unexpired code that is under the attempt cap
    /// as used and returns it. The row is kept until `hold_until` so the reset
    /// token minted from it can be redeemed.
    async fn consume_reset_code(
        &self,
        email: &str,
        code: &str,
        now: OffsetDateTime,
        hold_until: OffsetDateTime,
    ) -> anyhow::Result<Option<ResetCode>>;

    /// Counts a failed verification against every live unused code for `email`.
    async fn record_failed_attempt(&self, email: &str, now: OffsetDateTime) -> anyhow::Result<u64>;

    /// Deletes the used code `id` issued to `email`. Returns `false` if it was
    /// already redeemed or never existed.
    async fn redeem_reset_grant(&self, id: Uuid, email: &str) -> anyhow::Result<bool>;

    async fn delete_reset_codes_for(&self, email: &str) -> anyhow::Result<u64>;

    async fn create_session(&self, session: &Session) -> anyhow::Result<()>;

    async fn find_session(&self, id: Uuid) -> anyhow::Result<Option<Session>>;

    async fn delete_session(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> anyhow::Result<u64>;

    /// Removes codes and sessions whose expiry is at or before `now`.
    async fn purge_expired(&self, now: OffsetDateTime) -> anyhow::Result<PurgeStats>;
}

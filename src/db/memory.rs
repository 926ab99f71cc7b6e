use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{NewUser, PurgeStats, ResetCode, Session, Store, User, MAX_CODE_ATTEMPTS};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    codes: Vec<ResetCode>,
    sessions: HashMap<Uuid, Session>,
}

/// Process-local store for tests and database-less development runs.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn create_user(&self, new: NewUser<'_>) -> anyhow::Result<Option<User>> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.email == new.email) {
            return Ok(None);
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new.name.to_string(),
            email: new.email.to_string(),
            password_hash: new.password_hash.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(Some(user))
    }

    async fn update_password(&self, email: &str, password_hash: &str) -> anyhow::Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.users.values_mut().find(|u| u.email == email) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_reset_code(
        &self,
        email: &str,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<ResetCode> {
        let row = ResetCode {
            id: Uuid::new_v4(),
            email: email.to_string(),
            code: code.to_string(),
            expires_at,
            used: false,
            attempts: 0,
        };
        self.tables.lock().await.codes.push(row.clone());
        Ok(row)
    }

    async fn consume_reset_code(
        &self,
        email: &str,
        code: &str,
        now: OffsetDateTime,
        hold_until: OffsetDateTime,
    ) -> anyhow::Result<Option<ResetCode>> {
        let mut tables = self.tables.lock().await;
        let found = tables.codes.iter_mut().rev().find(|c| {
            c.email == email
                && c.code == code
                && !c.used
                && c.expires_at > now
                && c.attempts < MAX_CODE_ATTEMPTS
        });
        Ok(found.map(|c| {
            c.used = true;
            c.expires_at = hold_until;
            c.clone()
        }))
    }

    async fn record_failed_attempt(&self, email: &str, now: OffsetDateTime) -> anyhow::Result<u64> {
        let mut tables = self.tables.lock().await;
        let mut touched = 0;
        for c in tables
            .codes
            .iter_mut()
            .filter(|c| c.email == email && !c.used && c.expires_at > now)
        {
            c.attempts += 1;
            touched += 1;
        }
        Ok(touched)
    }

    async fn redeem_reset_grant(&self, id: Uuid, email: &str) -> anyhow::Result<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.codes.len();
        tables
            .codes
            .retain(|c| !(c.id == id && c.email == email && c.used));
        Ok(tables.codes.len() < before)
    }

    async fn delete_reset_codes_for(&self, email: &str) -> anyhow::Result<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.codes.len();
        tables.codes.retain(|c| c.email != email);
        Ok((before - tables.codes.len()) as u64)
    }

    async fn create_session(&self, session: &Session) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        anyhow::ensure!(
            tables.users.contains_key(&session.user_id),
            "session references unknown user {}",
            session.user_id
        );
        tables.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> anyhow::Result<Option<Session>> {
        Ok(self.tables.lock().await.sessions.get(&id).cloned())
    }

    async fn delete_session(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.tables.lock().await.sessions.remove(&id).is_some())
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> anyhow::Result<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> anyhow::Result<PurgeStats> {
        let mut tables = self.tables.lock().await;
        let codes_before = tables.codes.len();
        tables.codes.retain(|c| c.expires_at > now);
        let sessions_before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.expires_at > now);
        Ok(PurgeStats {
            codes: (codes_before - tables.codes.len()) as u64,
            sessions: (sessions_before - tables.sessions.len()) as u64,
        })
    }
}

use std::sync::Arc;

use tracing::warn;

use crate::config::AppConfig;
use crate::db::{MemoryStore, PgStore, Store};
use crate::mail::{HttpMailer, LogMailer, Mailer};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = match &config.database_url {
            Some(url) => {
                let pg = PgStore::connect(url).await?;
                if let Err(e) = pg.migrate().await {
                    warn!(error = %e, "migrations folder not found or migration failed; continuing");
                }
                Arc::new(pg) as Arc<dyn Store>
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory store, data is lost on restart");
                Arc::new(MemoryStore::new()) as Arc<dyn Store>
            }
        };

        let mailer = match &config.mail {
            Some(mail) => Arc::new(HttpMailer::new(mail.clone())?) as Arc<dyn Mailer>,
            None => {
                warn!("MAIL_API_URL/MAIL_API_KEY not set; reset codes are only logged");
                Arc::new(LogMailer) as Arc<dyn Mailer>
            }
        };

        Ok(Self::from_parts(store, config, mailer))
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        config: Arc<AppConfig>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            store,
            config,
            mailer,
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with_mailer(Arc::new(LogMailer))
    }

    #[cfg(test)]
    pub fn fake_with_mailer(mailer: Arc<dyn Mailer>) -> Self {
        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: crate::config::JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 60,
                reset_ttl_minutes: 15,
            },
            mail: None,
            reset_code_ttl_minutes: 10,
            sweep_interval_secs: 3600,
        });
        Self::from_parts(Arc::new(MemoryStore::new()), config, mailer)
    }
}

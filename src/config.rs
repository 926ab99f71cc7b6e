use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub reset_ttl_minutes: i64,
}

/// Outbound mail API credentials. Without them codes are only logged.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub mail: Option<MailConfig>,
    pub reset_code_ttl_minutes: i64,
    pub sweep_interval_secs: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok();
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "authgate".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "authgate-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60 * 24),
            reset_ttl_minutes: env_or("RESET_TOKEN_TTL_MINUTES", 15),
        };

        let mail = match (
            std::env::var("MAIL_API_URL"),
            std::env::var("MAIL_API_KEY"),
        ) {
            (Ok(api_url), Ok(api_key)) => Some(MailConfig {
                api_url,
                api_key,
                from: std::env::var("MAIL_FROM")
                    .unwrap_or_else(|_| "no-reply@authgate.local".into()),
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt,
            mail,
            reset_code_ttl_minutes: env_or("RESET_CODE_TTL_MINUTES", 10),
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", 60 * 60),
        })
    }
}

use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use serde::de::DeserializeOwned;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{Claims, ResetClaims, TokenKind};
use crate::{config::JwtConfig, state::AppState};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("token is invalid")]
    Invalid,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        }
    }
}

/// A freshly signed session token and the window it is valid for.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub reset_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from_config(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::minutes(cfg.ttl_minutes),
            reset_ttl: Duration::minutes(cfg.reset_ttl_minutes),
        }
    }

    pub fn issue_access(&self, user_id: Uuid, session_id: Uuid) -> anyhow::Result<IssuedToken> {
        let issued_at = OffsetDateTime::now_utc();
        let expires_at = issued_at + self.access_ttl;
        let claims = Claims {
            sub: user_id,
            sid: session_id,
            iat: issued_at.unix_timestamp() as usize,
            exp: expires_at.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind: TokenKind::Access,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, session_id = %session_id, "access token signed");
        Ok(IssuedToken {
            token,
            issued_at,
            expires_at,
        })
    }

    pub fn sign_reset(&self, email: &str, grant_id: Uuid) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = ResetClaims {
            email: email.to_string(),
            jti: grant_id,
            iat: now.unix_timestamp() as usize,
            exp: (now + self.reset_ttl).unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind: TokenKind::PasswordReset,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(email = %email, grant_id = %grant_id, "reset token signed");
        Ok(token)
    }

    fn decode<C: DeserializeOwned>(&self, token: &str) -> Result<C, TokenError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<C>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        let claims: Claims = self.decode(token)?;
        if claims.kind != TokenKind::Access {
            return Err(TokenError::Invalid);
        }
        debug!(user_id = %claims.sub, "access token verified");
        Ok(claims)
    }

    pub fn verify_reset(&self, token: &str) -> Result<ResetClaims, TokenError> {
        let claims: ResetClaims = self.decode(token)?;
        if claims.kind != TokenKind::PasswordReset {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 5,
            reset_ttl_minutes: 15,
        })
    }

    #[test]
    fn issue_and_verify_access_token() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let issued = keys.issue_access(user_id, session_id).expect("sign access");
        assert_eq!(issued.expires_at - issued.issued_at, Duration::minutes(5));

        let claims = keys.verify_access(&issued.token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.sid, session_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn reset_token_carries_email_and_purpose() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let grant_id = Uuid::new_v4();
        let token = keys.sign_reset("ann@x.com", grant_id).expect("sign reset");
        let claims = keys.verify_reset(&token).expect("verify reset");
        assert_eq!(claims.email, "ann@x.com");
        assert_eq!(claims.jti, grant_id);
        assert_eq!(claims.kind, TokenKind::PasswordReset);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn tokens_are_not_interchangeable() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let access = keys.issue_access(Uuid::new_v4(), Uuid::new_v4()).expect("sign access");
        assert_eq!(keys.verify_reset(&access.token).unwrap_err(), TokenError::Invalid);

        let reset = keys.sign_reset("ann@x.com", Uuid::new_v4()).expect("sign reset");
        assert_eq!(keys.verify_access(&reset).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn expired_reset_token_reports_expired() {
        let mut keys = make_keys("dev-secret", "iss", "aud");
        keys.reset_ttl = Duration::minutes(-5);
        let token = keys.sign_reset("ann@x.com", Uuid::new_v4()).expect("sign reset");
        assert_eq!(keys.verify_reset(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn verify_rejects_foreign_secret_issuer_or_audience() {
        let good = make_keys("same-secret", "good-iss", "good-aud");
        let token = good.issue_access(Uuid::new_v4(), Uuid::new_v4()).expect("sign").token;

        for bad in [
            make_keys("same-secret", "bad-iss", "good-aud"),
            make_keys("same-secret", "good-iss", "bad-aud"),
            make_keys("other-secret", "good-iss", "good-aud"),
        ] {
            assert_eq!(bad.verify_access(&token).unwrap_err(), TokenError::Invalid);
        }
    }

    #[test]
    fn garbage_is_invalid() {
        let keys = make_keys("dev-secret", "iss", "aud");
        assert_eq!(keys.verify_access("not.a.jwt").unwrap_err(), TokenError::Invalid);
    }
}

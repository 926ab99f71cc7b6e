use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use super::jwt::JwtKeys;
use crate::{error::AppError, state::AppState};

/// Caller authenticated by a bearer token whose session is still on record.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub session_id: Uuid,
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::auth("Missing Authorization header"))?;

    // Expect "Bearer <token>"
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::auth("Invalid Authorization header"))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify_access(token).map_err(|e| {
            warn!(error = %e, "rejected bearer token");
            AppError::auth("Invalid or expired token")
        })?;

        // Logout and password reset revoke sessions; the signature alone is not enough.
        let session = state.store.find_session(claims.sid).await?;
        match session {
            Some(s) if s.user_id == claims.sub && s.expires_at > OffsetDateTime::now_utc() => {
                Ok(AuthUser {
                    user_id: claims.sub,
                    session_id: claims.sid,
                })
            }
            _ => {
                warn!(user_id = %claims.sub, session_id = %claims.sid, "session revoked or expired");
                Err(AppError::auth("Invalid or expired token"))
            }
        }
    }
}

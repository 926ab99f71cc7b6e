use axum::extract::FromRef;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    jwt::JwtKeys,
    password::{
        check_password_strength, hash_password, is_valid_email, normalize_email,
        verify_dummy_password, verify_password,
    },
    social::{is_social_email, SocialIdentity, SocialProvider},
};
use crate::{
    db::{NewUser, Session, User},
    error::{AppError, AppResult},
    state::AppState,
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Signs a session token for `user` and records its session row.
pub async fn issue_session(state: &AppState, user: &User) -> AppResult<String> {
    let keys = JwtKeys::from_ref(state);
    let session_id = Uuid::new_v4();
    let issued = keys.issue_access(user.id, session_id)?;
    state
        .store
        .create_session(&Session {
            id: session_id,
            user_id: user.id,
            created_at: issued.issued_at,
            expires_at: issued.expires_at,
        })
        .await?;
    debug!(user_id = %user.id, session_id = %session_id, "session opened");
    Ok(issued.token)
}

pub async fn register(state: &AppState, name: &str, email: &str, password: &str) -> AppResult<User> {
    let name = name.trim();
    let email = normalize_email(email);

    if name.is_empty() || email.is_empty() || password.is_empty() {
        return Err(AppError::validation("All fields are required"));
    }
    if name.chars().count() < 2 {
        return Err(AppError::validation("Name must be at least 2 characters"));
    }
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::validation("Invalid email"));
    }
    if is_social_email(&email) {
        warn!(email = %email, "signup in social namespace");
        return Err(AppError::validation("This email address is reserved"));
    }
    check_password_strength(password).map_err(|e| AppError::validation(e.to_string()))?;

    if state.store.find_user_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict("User already exists with this email".into()));
    }

    let hash = hash_password(password)?;
    let user = state
        .store
        .create_user(NewUser {
            name,
            email: &email,
            password_hash: &hash,
        })
        .await?
        // Lost a race with a concurrent signup for the same address.
        .ok_or_else(|| AppError::Conflict("User already exists with this email".into()))?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user)
}

pub async fn authenticate(state: &AppState, email: &str, password: &str) -> AppResult<User> {
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
        return Err(AppError::validation("Email and password are required"));
    }

    let Some(user) = state.store.find_user_by_email(&email).await? else {
        verify_dummy_password(password);
        warn!(email = %email, "login unknown email");
        return Err(AppError::auth(INVALID_CREDENTIALS));
    };

    if !user.has_password() {
        verify_dummy_password(password);
        warn!(user_id = %user.id, "password login on social account");
        return Err(AppError::auth(INVALID_CREDENTIALS));
    }

    if !verify_password(password, &user.password_hash)? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(AppError::auth(INVALID_CREDENTIALS));
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(user)
}

/// Finds or creates the local account for a provider identity.
pub async fn social_sign_in(
    state: &AppState,
    provider: SocialProvider,
    external_id: Option<&str>,
    name: Option<&str>,
) -> AppResult<User> {
    let identity = SocialIdentity::resolve(provider, external_id, name);

    if let Some(user) = state.store.find_user_by_email(&identity.email).await? {
        if user.has_password() {
            warn!(user_id = %user.id, %provider, "social login hit a password account");
            return Err(AppError::Conflict(
                "An account with this email already exists".into(),
            ));
        }
        info!(user_id = %user.id, %provider, "social login reused account");
        return Ok(user);
    }

    let created = state
        .store
        .create_user(NewUser {
            name: &identity.name,
            email: &identity.email,
            password_hash: "",
        })
        .await?;

    let user = match created {
        Some(user) => user,
        None => state
            .store
            .find_user_by_email(&identity.email)
            .await?
            .filter(|u| !u.has_password())
            .ok_or_else(|| AppError::Conflict("An account with this email already exists".into()))?,
    };

    info!(user_id = %user.id, %provider, "social login");
    Ok(user)
}

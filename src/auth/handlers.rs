use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{AuthPayload, LoginRequest, PublicUser, SignupRequest, SocialLoginRequest, UserPayload},
    extractors::AuthUser,
    services::{authenticate, issue_session, register, social_sign_in},
    social::SocialProvider,
};
use crate::{
    error::{ApiResponse, AppError, AppResult, MessageData},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/auth/:provider", post(social_login))
        .route("/logout", post(logout))
}

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/user", get(get_user))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<AuthPayload>>)> {
    let Json(payload) = payload?;
    let user = register(&state, &payload.name, &payload.email, &payload.password).await?;
    let token = issue_session(&state, &user).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(AuthPayload {
            user: user.into(),
            token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<AuthPayload>>> {
    let Json(payload) = payload?;
    let user = authenticate(&state, &payload.email, &payload.password).await?;
    let token = issue_session(&state, &user).await?;
    Ok(ApiResponse::ok(AuthPayload {
        user: user.into(),
        token,
    }))
}

/// The body is optional; an empty request signs in a fresh stub identity.
#[instrument(skip(state, body))]
pub async fn social_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    body: Bytes,
) -> AppResult<Json<ApiResponse<AuthPayload>>> {
    let provider: SocialProvider = provider.parse().map_err(AppError::Validation)?;
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        SocialLoginRequest::default()
    } else {
        let Json(body) = Json::<SocialLoginRequest>::from_bytes(&body)?;
        body
    };
    let user = social_sign_in(
        &state,
        provider,
        body.external_id.as_deref(),
        body.name.as_deref(),
    )
    .await?;
    let token = issue_session(&state, &user).await?;
    Ok(ApiResponse::ok(AuthPayload {
        user: user.into(),
        token,
    }))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<ApiResponse<UserPayload>>> {
    let user = state
        .store
        .find_user_by_id(auth.user_id)
        .await?
        .ok_or_else(|| AppError::auth("Invalid token"))?;
    Ok(ApiResponse::ok(UserPayload {
        user: PublicUser::from(user),
    }))
}

#[instrument(skip(state))]
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<ApiResponse<MessageData>>> {
    state.store.delete_session(auth.session_id).await?;
    info!(user_id = %auth.user_id, session_id = %auth.session_id, "user logged out");
    Ok(ApiResponse::ok(MessageData::new("Logged out successfully")))
}

use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    routing::post,
    Json, Router,
};
use time::{Duration, OffsetDateTime};
use tracing::{info, instrument, warn};

use super::{
    dto::{ForgotPasswordRequest, ForgotPasswordResponse, ResetPasswordRequest, VerifyOtpRequest, VerifyOtpResponse},
    otp::{generate_code, looks_like_code},
};
use crate::{
    auth::{
        jwt::{JwtKeys, TokenError},
        password::{check_password_strength, hash_password, is_valid_email, normalize_email},
    },
    error::{ApiResponse, AppError, AppResult, MessageData},
    mail::EmailMessage,
    state::AppState,
};

const GENERIC_SENT: &str = "If this email is registered, you will receive a verification code";

pub fn reset_routes() -> Router<AppState> {
    Router::new()
        .route("/forgot-password", post(forgot_password))
        .route("/verify-otp", post(verify_otp))
        .route("/reset-password", post(reset_password))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<ForgotPasswordResponse>>> {
    let Json(payload) = payload?;
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        return Err(AppError::validation("Valid email is required"));
    }

    let ttl_minutes = state.config.reset_code_ttl_minutes;
    let response = ForgotPasswordResponse {
        message: GENERIC_SENT.into(),
        expires_in: ttl_minutes * 60,
    };

    if state.store.find_user_by_email(&email).await?.is_none() {
        info!(email = %email, "reset requested for unknown email");
        return Ok(ApiResponse::ok(response));
    }

    let code = generate_code();
    let expires_at = OffsetDateTime::now_utc() + Duration::minutes(ttl_minutes);
    let row = state.store.insert_reset_code(&email, &code, expires_at).await?;

    state
        .mailer
        .send(&EmailMessage::reset_code(&email, &code, ttl_minutes))
        .await?;

    info!(email = %email, code_id = %row.id, "reset code issued");
    Ok(ApiResponse::ok(response))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    payload: Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<VerifyOtpResponse>>> {
    let Json(payload) = payload?;
    let email = normalize_email(&payload.email);
    let otp = payload.otp.trim();
    if email.is_empty() {
        return Err(AppError::validation("Email is required"));
    }
    if !looks_like_code(otp) {
        return Err(AppError::validation("Valid OTP is required"));
    }

    let keys = JwtKeys::from_ref(&state);
    let now = OffsetDateTime::now_utc();
    // The used row backs the reset token; keep it past the token's expiry and validation leeway.
    let hold_until = now + keys.reset_ttl + Duration::minutes(1);
    let consumed = state
        .store
        .consume_reset_code(&email, otp, now, hold_until)
        .await?;
    let Some(code) = consumed else {
        let counted = state.store.record_failed_attempt(&email, now).await?;
        warn!(email = %email, live_codes = counted, "reset code rejected");
        return Err(AppError::validation("Invalid or expired verification code"));
    };

    let token = keys.sign_reset(&email, code.id)?;
    info!(email = %email, code_id = %code.id, "reset code verified");
    Ok(ApiResponse::ok(VerifyOtpResponse {
        message: "OTP verified successfully".into(),
        token,
    }))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<MessageData>>> {
    let Json(payload) = payload?;
    if payload.token.trim().is_empty() {
        return Err(AppError::validation("Token is required"));
    }
    check_password_strength(&payload.new_password)
        .map_err(|e| AppError::validation(e.to_string()))?;

    let claims = JwtKeys::from_ref(&state)
        .verify_reset(payload.token.trim())
        .map_err(|e| {
            warn!(error = %e, "reset token rejected");
            match e {
                TokenError::Expired => AppError::validation("Token has expired"),
                TokenError::Invalid => AppError::validation("Invalid token"),
            }
        })?;

    let Some(user) = state.store.find_user_by_email(&claims.email).await? else {
        return Err(AppError::NotFound("User not found".into()));
    };

    if !state.store.redeem_reset_grant(claims.jti, &claims.email).await? {
        warn!(user_id = %user.id, grant_id = %claims.jti, "reset token already redeemed");
        return Err(AppError::validation("Invalid token"));
    }

    let hash = hash_password(&payload.new_password)?;
    if !state.store.update_password(&user.email, &hash).await? {
        return Err(AppError::NotFound("User not found".into()));
    }

    state.store.delete_reset_codes_for(&user.email).await?;
    let revoked = state.store.delete_sessions_for_user(user.id).await?;

    info!(user_id = %user.id, revoked_sessions = revoked, "password reset");
    Ok(ApiResponse::ok(MessageData::new("Password reset successfully")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::{app::build_app, mail::testing::RecordingMailer};

    const STRONG: &str = "Str0ng!Passw0rd";
    const NEWER: &str = "N3wer!Passw0rd";

    async fn call(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn setup() -> (AppState, Arc<RecordingMailer>, Router) {
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::fake_with_mailer(mailer.clone());
        let app = build_app(state.clone());
        (state, mailer, app)
    }

    async fn signup(app: &Router) -> String {
        let (status, body) = call(
            app,
            "/api/signup",
            json!({"name": "Ann", "email": "ann@x.com", "password": STRONG}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["token"].as_str().unwrap().to_string()
    }

    fn mailed_code(mailer: &RecordingMailer) -> String {
        let messages = mailer.messages();
        let body = &messages.last().expect("a mailed code").body;
        body.split_whitespace()
            .find(|w| w.len() == 6 && w.chars().all(|c| c.is_ascii_digit()))
            .expect("code in body")
            .to_string()
    }

    async fn request_and_verify(app: &Router, mailer: &RecordingMailer) -> String {
        let (status, _) = call(app, "/api/forgot-password", json!({"email": "ann@x.com"})).await;
        assert_eq!(status, StatusCode::OK);
        let code = mailed_code(mailer);
        let (status, body) = call(
            app,
            "/api/verify-otp",
            json!({"email": "ann@x.com", "otp": code}),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn unknown_email_gets_generic_success_and_no_code() {
        let (state, mailer, app) = setup();
        let (status, body) =
            call(&app, "/api/forgot-password", json!({"email": "ghost@x.com"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["message"], GENERIC_SENT);
        assert_eq!(body["data"]["expiresIn"], 600);
        assert!(mailer.messages().is_empty());
        let purged = state
            .store
            .purge_expired(OffsetDateTime::now_utc() + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(purged.codes, 0);
    }

    #[tokio::test]
    async fn known_email_gets_same_body_without_code() {
        let (_, mailer, app) = setup();
        signup(&app).await;
        let (status, body) =
            call(&app, "/api/forgot-password", json!({"email": "ann@x.com"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["message"], GENERIC_SENT);
        let code = mailed_code(&mailer);
        assert!(!body.to_string().contains(&code));
    }

    #[tokio::test]
    async fn forgot_password_validates_email_and_surfaces_mail_failure() {
        let (_, _, app) = setup();
        let (status, _) = call(&app, "/api/forgot-password", json!({"email": "nope"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let state = AppState::fake_with_mailer(Arc::new(RecordingMailer::failing()));
        let app = build_app(state);
        signup(&app).await;
        let (status, body) =
            call(&app, "/api/forgot-password", json!({"email": "ann@x.com"})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn code_is_single_use() {
        let (_, mailer, app) = setup();
        signup(&app).await;
        request_and_verify(&app, &mailer).await;
        let code = mailed_code(&mailer);

        let (status, body) = call(
            &app,
            "/api/verify-otp",
            json!({"email": "ann@x.com", "otp": code}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid or expired verification code");
    }

    #[tokio::test]
    async fn code_stops_working_after_repeated_failures() {
        let (_, mailer, app) = setup();
        signup(&app).await;
        call(&app, "/api/forgot-password", json!({"email": "ann@x.com"})).await;
        let code = mailed_code(&mailer);

        for _ in 0..crate::db::MAX_CODE_ATTEMPTS {
            let (status, _) = call(
                &app,
                "/api/verify-otp",
                json!({"email": "ann@x.com", "otp": "000000"}),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }

        let (status, body) = call(
            &app,
            "/api/verify-otp",
            json!({"email": "ann@x.com", "otp": code}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid or expired verification code");
    }

    #[tokio::test]
    async fn verify_rejects_malformed_and_expired_codes() {
        let (state, _, app) = setup();
        signup(&app).await;

        let (status, _) =
            call(&app, "/api/verify-otp", json!({"email": "ann@x.com", "otp": "123"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        state
            .store
            .insert_reset_code(
                "ann@x.com",
                "424242",
                OffsetDateTime::now_utc() - Duration::minutes(1),
            )
            .await
            .unwrap();
        let (status, _) = call(
            &app,
            "/api/verify-otp",
            json!({"email": "ann@x.com", "otp": "424242"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn full_reset_changes_password_and_revokes_sessions() {
        let (_, mailer, app) = setup();
        let session = signup(&app).await;
        let token = request_and_verify(&app, &mailer).await;

        let (status, body) = call(
            &app,
            "/api/reset-password",
            json!({"token": token, "newPassword": NEWER}),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["message"], "Password reset successfully");

        let (status, _) = call(
            &app,
            "/api/login",
            json!({"email": "ann@x.com", "password": STRONG}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(
            &app,
            "/api/login",
            json!({"email": "ann@x.com", "password": NEWER}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let req = Request::get("/api/user")
            .header(header::AUTHORIZATION, format!("Bearer {session}"))
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn reset_token_cannot_be_replayed() {
        let (_, mailer, app) = setup();
        signup(&app).await;
        let token = request_and_verify(&app, &mailer).await;

        let (status, _) = call(
            &app,
            "/api/reset-password",
            json!({"token": token, "newPassword": NEWER}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &app,
            "/api/reset-password",
            json!({"token": token, "newPassword": "Th1rd!Passw0rd"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid token");

        let (status, _) = call(
            &app,
            "/api/login",
            json!({"email": "ann@x.com", "password": NEWER}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn reset_token_survives_code_expiry_sweep() {
        let (state, mailer, app) = setup();
        signup(&app).await;
        let token = request_and_verify(&app, &mailer).await;

        // Past the 10-minute code lifetime, inside the 15-minute token lifetime.
        state
            .store
            .purge_expired(OffsetDateTime::now_utc() + Duration::minutes(12))
            .await
            .unwrap();

        let (status, body) = call(
            &app,
            "/api/reset-password",
            json!({"token": token, "newPassword": NEWER}),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    #[tokio::test]
    async fn reset_rejects_wrong_purpose_expired_and_weak() {
        let (state, mailer, app) = setup();
        let session = signup(&app).await;

        let (status, body) = call(
            &app,
            "/api/reset-password",
            json!({"token": session, "newPassword": NEWER}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid token");

        let mut keys = JwtKeys::from_ref(&state);
        keys.reset_ttl = Duration::minutes(-5);
        let expired = keys.sign_reset("ann@x.com", uuid::Uuid::new_v4()).unwrap();
        let (status, body) = call(
            &app,
            "/api/reset-password",
            json!({"token": expired, "newPassword": NEWER}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Token has expired");

        let token = request_and_verify(&app, &mailer).await;
        let (status, _) = call(
            &app,
            "/api/reset-password",
            json!({"token": token, "newPassword": "short"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            call(&app, "/api/reset-password", json!({"newPassword": NEWER})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reset_for_vanished_user_is_404() {
        let (state, _, app) = setup();
        let token = JwtKeys::from_ref(&state)
            .sign_reset("ghost@x.com", uuid::Uuid::new_v4())
            .unwrap();
        let (status, body) = call(
            &app,
            "/api/reset-password",
            json!({"token": token, "newPassword": NEWER}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "User not found");
    }
}

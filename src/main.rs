use std::time::Duration;

mod app;
mod auth;
mod config;
mod db;
mod error;
mod health;
mod mail;
mod reset;
mod state;
mod sweep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "authgate=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;

    sweep::spawn_cleanup(
        app_state.store.clone(),
        Duration::from_secs(app_state.config.sweep_interval_secs),
    );

    app::serve(app::build_app(app_state)).await
}

use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod otp;

pub fn router() -> Router<AppState> {
    handlers::reset_routes()
}

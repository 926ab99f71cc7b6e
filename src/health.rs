use axum::Json;
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::error::ApiResponse;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: String,
}

pub async fn health() -> Json<ApiResponse<HealthStatus>> {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    ApiResponse::ok(HealthStatus {
        status: "ok",
        timestamp,
    })
}

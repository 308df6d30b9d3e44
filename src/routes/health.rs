use axum::{Json, extract::State, http::StatusCode};
use sea_orm::{ConnectionTrait, Statement};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    response::{ApiResponse, Meta},
    state::AppState,
};

#[derive(Serialize, ToSchema)]
pub struct HealthData {
    pub status: String,
    pub database: String,
    pub cache: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Database and cache reachable", body = ApiResponse<HealthData>),
        (status = 503, description = "A dependency is down", body = ApiResponse<HealthData>),
    ),
    tag = "Health"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<HealthData>>) {
    let backend = state.orm.get_database_backend();
    let database_up = state
        .orm
        .execute(Statement::from_string(backend, "SELECT 1".to_owned()))
        .await
        .is_ok();
    if !database_up {
        tracing::error!("database health check failed");
    }

    state.cache.set(
        "health_check",
        "ok",
        Some(std::time::Duration::from_secs(10)),
    );
    let cache_up = state.cache.get("health_check").as_deref() == Some("ok");

    let healthy = database_up && cache_up;
    let data = HealthData {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        database: if database_up { "up" } else { "down" }.to_string(),
        cache: if cache_up { "up" } else { "down" }.to_string(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = ApiResponse {
        success: healthy,
        message: "Health check".to_string(),
        data: Some(data),
        meta: Some(Meta::empty()),
    };

    (status, Json(body))
}

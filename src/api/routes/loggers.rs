//! Logger level inspection and adjustment endpoints
//!
//! These routes proxy to the managed service's logger-configuration
//! endpoint. The hub never caches logger state, every read goes to the
//! service so the response reflects what the service actually runs with.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::Value;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
};
use crate::model::EndpointType;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerLevelRequest {
    pub configured_level: String,
}

/// GET /api/v1/services/{id}/loggers
pub async fn get_loggers(
    State(state): State<ApiState>,
    Path(service_id): Path<u64>,
) -> ApiResult<Json<Value>> {
    let url = loggers_url(&state, service_id).await?;
    let document = state.loggers.read(&url).await?;
    Ok(Json(document))
}

/// POST /api/v1/services/{id}/loggers/{logger}
pub async fn set_logger_level(
    State(state): State<ApiState>,
    Path((service_id, logger)): Path<(u64, String)>,
    Json(request): Json<LoggerLevelRequest>,
) -> ApiResult<StatusCode> {
    let level = request.configured_level.trim().to_uppercase();
    if level.is_empty() {
        return Err(ApiError::InvalidRequest(
            "configuredLevel must not be empty".into(),
        ));
    }

    let url = loggers_url(&state, service_id).await?;
    state.loggers.update_level(&url, &logger, &level).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Resolves the discovered logger-configuration endpoint for a service.
async fn loggers_url(state: &ApiState, service_id: u64) -> ApiResult<String> {
    let service = state.registry.get_service(service_id).await?;

    service
        .endpoints
        .iter()
        .find(|endpoint| endpoint.endpoint_type == EndpointType::LoggerConfig && endpoint.enabled)
        .map(|endpoint| endpoint.href.clone())
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "Service {service_id} has no logger configuration endpoint"
            ))
        })
}

//! On-demand collection and lifecycle actions

use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};
use tracing::info;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
};
use crate::model::EndpointType;

/// POST /api/v1/services/{id}/actions/{action}
///
/// Supported actions: `health`, `metrics`, `logs` trigger an immediate
/// collection pass for the matching endpoint; `refresh` runs a full
/// collection of every discovered endpoint; `restart` asks the
/// orchestration layer to restart the service instance.
pub async fn run_action(
    State(state): State<ApiState>,
    Path((service_id, action)): Path<(u64, String)>,
) -> ApiResult<Json<Value>> {
    match action.as_str() {
        "health" => {
            state
                .dispatcher
                .collect_endpoint(service_id, EndpointType::Health)
                .await?;
        }
        "metrics" => {
            state
                .dispatcher
                .collect_endpoint(service_id, EndpointType::Metrics)
                .await?;
        }
        "logs" => {
            state
                .dispatcher
                .collect_endpoint(service_id, EndpointType::Logs)
                .await?;
        }
        "refresh" => {
            state.scheduler.collect_now(service_id).await?;
        }
        "restart" => {
            let service = state.registry.get_service(service_id).await?;
            info!(service = %service.name, "Restart requested");
            state.inventory.restart(&service).await?;

            // Re-poll right away so the status reflects the restart.
            state.scheduler.collect_now(service_id).await?;
        }
        other => {
            return Err(ApiError::InvalidRequest(format!(
                "Unknown action '{other}'"
            )));
        }
    }

    Ok(Json(json!({
        "service_id": service_id,
        "action": action,
        "completed": true,
    })))
}

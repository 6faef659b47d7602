//! Configuration property CRUD endpoints

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
};
use crate::model::ConfigProperty;
use crate::registry::PropertyDraft;

/// GET /api/v1/services/{id}/properties
pub async fn list_properties(
    State(state): State<ApiState>,
    Path(service_id): Path<u64>,
) -> ApiResult<Json<Vec<ConfigProperty>>> {
    Ok(Json(state.registry.list_properties(service_id).await?))
}

/// POST /api/v1/services/{id}/properties
pub async fn create_property(
    State(state): State<ApiState>,
    Path(service_id): Path<u64>,
    Json(draft): Json<PropertyDraft>,
) -> ApiResult<(StatusCode, Json<ConfigProperty>)> {
    let property = state.registry.create_property(service_id, draft).await?;
    Ok((StatusCode::CREATED, Json(property)))
}

/// PUT /api/v1/services/{id}/properties/{property_id}
pub async fn update_property(
    State(state): State<ApiState>,
    Path((service_id, property_id)): Path<(u64, u64)>,
    Json(draft): Json<PropertyDraft>,
) -> ApiResult<Json<ConfigProperty>> {
    ensure_ownership(&state, service_id, property_id).await?;
    let property = state.registry.update_property(property_id, draft).await?;
    Ok(Json(property))
}

/// DELETE /api/v1/services/{id}/properties/{property_id}
pub async fn delete_property(
    State(state): State<ApiState>,
    Path((service_id, property_id)): Path<(u64, u64)>,
) -> ApiResult<StatusCode> {
    ensure_ownership(&state, service_id, property_id).await?;
    state.registry.delete_property(property_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rejects property ids that belong to a different service than the path claims.
async fn ensure_ownership(state: &ApiState, service_id: u64, property_id: u64) -> ApiResult<()> {
    let owned = state
        .registry
        .list_properties(service_id)
        .await?
        .iter()
        .any(|property| property.id == property_id);

    if owned {
        Ok(())
    } else {
        Err(ApiError::NotFound(format!(
            "Property {property_id} not found for service {service_id}"
        )))
    }
}

//! Service registration and query endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::api::{error::ApiResult, state::ApiState};
use crate::discovery::{RegistrationRequest, register_direct};
use crate::model::{LogRecord, ManagedService, MetricSample, RegistrationSource, ServiceStatus};

/// Samples backing the trend arrays in the service list
const TREND_SAMPLE_LIMIT: usize = 20;

/// Default page size for history queries
const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: u64,
    pub name: String,
    pub status: ServiceStatus,
    pub registration_source: RegistrationSource,
    pub external_id: String,
}

/// One service plus its latest metric summary and short trends
#[derive(Debug, Serialize)]
pub struct ServiceSummary {
    #[serde(flatten)]
    pub service: ManagedService,
    pub latest_metric: Option<MetricSample>,
    pub cpu_trend: Vec<f64>,
    pub memory_trend: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub service_id: u64,
    pub samples: Vec<MetricSample>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub service_id: u64,
    pub logs: Vec<LogRecord>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    limit: Option<usize>,
}

/// POST /api/v1/services
pub async fn register_service(
    State(state): State<ApiState>,
    Json(request): Json<RegistrationRequest>,
) -> ApiResult<(StatusCode, Json<RegistrationResponse>)> {
    let service = register_direct(&state.registry, state.probe.as_ref(), request).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegistrationResponse {
            id: service.id,
            name: service.name,
            status: service.status,
            registration_source: service.registration_source,
            external_id: service.external_id,
        }),
    ))
}

/// GET /api/v1/services
pub async fn list_services(
    State(state): State<ApiState>,
) -> ApiResult<Json<Vec<ServiceSummary>>> {
    let services = state.registry.list_services().await;

    let mut summaries = Vec::with_capacity(services.len());
    for service in services {
        let samples = state
            .registry
            .recent_metrics(service.id, TREND_SAMPLE_LIMIT)
            .await?;

        summaries.push(ServiceSummary {
            cpu_trend: samples.iter().map(|sample| sample.cpu_utilization).collect(),
            memory_trend: samples.iter().map(|sample| sample.memory_used_mb).collect(),
            latest_metric: samples.last().cloned(),
            service,
        });
    }

    Ok(Json(summaries))
}

/// GET /api/v1/services/{id}
pub async fn get_service(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<ManagedService>> {
    Ok(Json(state.registry.get_service(id).await?))
}

/// GET /api/v1/services/{id}/metrics
pub async fn get_service_metrics(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<MetricsResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let samples = state.registry.recent_metrics(id, limit).await?;
    Ok(Json(MetricsResponse {
        service_id: id,
        samples,
    }))
}

/// GET /api/v1/services/{id}/logs
pub async fn get_service_logs(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<LogsResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let logs = state.registry.recent_logs(id, limit).await?;
    Ok(Json(LogsResponse {
        service_id: id,
        logs,
    }))
}

//! Metrics collector
//!
//! Fetches the metric catalog, then the individual named metrics the hub
//! cares about (memory used/max, CPU usage, HTTP error counts) and appends
//! one [`MetricSample`] to the registry. A successful pass marks the
//! service UP; a failed catalog fetch propagates to the dispatch boundary
//! (→ DOWN). An unparseable individual metric only defaults that field.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{trace, warn};

use crate::model::{EndpointDescriptor, EndpointType, ManagedService, MetricSample, ServiceStatus};
use crate::probe::EndpointProbe;
use crate::registry::Registry;

use super::{Collector, CollectorOutcome};

const MEMORY_USED: &str = "jvm.memory.used";
const MEMORY_MAX: &str = "jvm.memory.max";
const CPU_USAGE: &str = "process.cpu.usage";
const HTTP_REQUESTS: &str = "http.server.requests";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub struct MetricsCollector {
    probe: Arc<dyn EndpointProbe>,
    registry: Registry,
}

impl MetricsCollector {
    pub fn new(probe: Arc<dyn EndpointProbe>, registry: Registry) -> Self {
        Self { probe, registry }
    }

    /// Fetch one named metric and extract a statistic, defaulting to 0.0
    /// when the metric is absent from the catalog or unparseable
    async fn fetch_value(
        &self,
        service: &ManagedService,
        url: &str,
        names: &[String],
        metric: &str,
        statistic: &str,
    ) -> f64 {
        if !names.iter().any(|name| name == metric) {
            return 0.0;
        }

        match self.probe.fetch_metric(url, metric).await {
            Ok(document) => measurement(&document, statistic).unwrap_or_else(|| {
                warn!("metric {metric} for {} had no {statistic} measurement", service.name);
                0.0
            }),
            Err(e) => {
                warn!("fetching metric {metric} for {} failed: {}", service.name, e);
                0.0
            }
        }
    }

    /// Cumulative count of requests that ended in a server error
    ///
    /// Walks the status tag values of the request metric and sums the COUNT
    /// of every 5xx bucket. Missing tags or fetch failures contribute zero.
    async fn fetch_error_total(
        &self,
        service: &ManagedService,
        url: &str,
        names: &[String],
    ) -> f64 {
        if !names.iter().any(|name| name == HTTP_REQUESTS) {
            return 0.0;
        }

        let document = match self.probe.fetch_metric(url, HTTP_REQUESTS).await {
            Ok(document) => document,
            Err(e) => {
                warn!("fetching {HTTP_REQUESTS} for {} failed: {}", service.name, e);
                return 0.0;
            }
        };

        let mut total = 0.0;
        for status in status_tag_values(&document) {
            if !status.starts_with('5') {
                continue;
            }
            let selector = format!("{HTTP_REQUESTS}?tag=status:{status}");
            match self.probe.fetch_metric(url, &selector).await {
                Ok(bucket) => total += measurement(&bucket, "COUNT").unwrap_or(0.0),
                Err(e) => {
                    warn!("fetching {selector} for {} failed: {}", service.name, e);
                }
            }
        }
        total
    }
}

#[async_trait]
impl Collector for MetricsCollector {
    fn endpoint_type(&self) -> EndpointType {
        EndpointType::Metrics
    }

    async fn collect(
        &self,
        service: &ManagedService,
        descriptor: &EndpointDescriptor,
    ) -> anyhow::Result<CollectorOutcome> {
        let url = &descriptor.href;
        let names = self.probe.fetch_metric_names(url).await?;

        let memory_used = self
            .fetch_value(service, url, &names, MEMORY_USED, "VALUE")
            .await;
        let memory_max = self
            .fetch_value(service, url, &names, MEMORY_MAX, "VALUE")
            .await;
        let cpu = self
            .fetch_value(service, url, &names, CPU_USAGE, "VALUE")
            .await;
        let error_total = self.fetch_error_total(service, url, &names).await;

        // error_count is the delta against the previous sample's cumulative
        // total, so it reflects errors in this polling interval
        let previous_total = self
            .registry
            .latest_metric(service.id)
            .await?
            .and_then(|sample| sample.raw_payload.get("error_total").cloned())
            .and_then(|value| value.as_f64())
            .unwrap_or(0.0);
        let error_count = (error_total - previous_total).max(0.0) as u64;

        let sample = MetricSample {
            service_id: service.id,
            timestamp: Utc::now(),
            memory_used_mb: memory_used / BYTES_PER_MB,
            memory_max_mb: memory_max / BYTES_PER_MB,
            cpu_utilization: cpu.clamp(0.0, 1.0),
            error_count,
            raw_payload: serde_json::json!({
                "memory_used_bytes": memory_used,
                "memory_max_bytes": memory_max,
                "cpu_usage": cpu,
                "error_total": error_total,
            }),
        };

        trace!(
            "recorded metric sample for {} ({}): cpu={:.2} mem={:.0}MB",
            service.name, service.id, sample.cpu_utilization, sample.memory_used_mb
        );

        self.registry.record_metric(sample).await?;

        Ok(CollectorOutcome::Status(ServiceStatus::Up))
    }
}

/// Extract one statistic value from a metric document
fn measurement(document: &Value, statistic: &str) -> Option<f64> {
    document
        .get("measurements")?
        .as_array()?
        .iter()
        .find(|entry| entry.get("statistic").and_then(Value::as_str) == Some(statistic))
        .and_then(|entry| entry.get("value"))
        .and_then(Value::as_f64)
}

/// The values of the `status` tag advertised by a request metric
fn status_tag_values(document: &Value) -> Vec<String> {
    document
        .get("availableTags")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|tag| tag.get("tag").and_then(Value::as_str) == Some("status"))
        .filter_map(|tag| tag.get("values").and_then(Value::as_array))
        .flatten()
        .filter_map(|value| value.as_str().map(str::to_string))
        .collect()
}

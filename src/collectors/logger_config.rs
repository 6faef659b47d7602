//! Logger configuration collector
//!
//! Unlike the other collectors this one is mostly caller-driven: the API
//! layer uses [`LoggerConfigCollector::read`] and
//! [`LoggerConfigCollector::update_level`] to proxy logger-level reads and
//! writes to the managed service, and failures surface to that caller.
//! During a scheduled pass it only verifies the endpoint answers - logger
//! state is never a service-status signal.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use crate::model::{EndpointDescriptor, EndpointType, ManagedService};
use crate::probe::{EndpointProbe, ProbeResult};

use super::{Collector, CollectorOutcome};

pub struct LoggerConfigCollector {
    probe: Arc<dyn EndpointProbe>,
}

impl LoggerConfigCollector {
    pub fn new(probe: Arc<dyn EndpointProbe>) -> Self {
        Self { probe }
    }

    /// Fetch the logger configuration document
    /// (`{"levels": [...], "loggers": {...}}`)
    pub async fn read(&self, loggers_url: &str) -> ProbeResult<Value> {
        self.probe.fetch_loggers(loggers_url).await
    }

    /// Apply a new level for one logger
    pub async fn update_level(
        &self,
        loggers_url: &str,
        logger: &str,
        level: &str,
    ) -> ProbeResult<()> {
        self.probe.set_logger_level(loggers_url, logger, level).await
    }
}

#[async_trait]
impl Collector for LoggerConfigCollector {
    fn endpoint_type(&self) -> EndpointType {
        EndpointType::LoggerConfig
    }

    async fn collect(
        &self,
        service: &ManagedService,
        descriptor: &EndpointDescriptor,
    ) -> anyhow::Result<CollectorOutcome> {
        let document = self.probe.fetch_loggers(&descriptor.href).await?;

        let logger_count = document
            .get("loggers")
            .and_then(Value::as_object)
            .map(|loggers| loggers.len())
            .unwrap_or(0);
        trace!(
            "service {} ({}) exposes {} loggers",
            service.name, service.id, logger_count
        );

        Ok(CollectorOutcome::NoChange)
    }
}

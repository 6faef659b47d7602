//! Health collector

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::model::{EndpointDescriptor, EndpointType, ManagedService};
use crate::probe::EndpointProbe;
use crate::status::map_health_report;

use super::{Collector, CollectorOutcome};

/// Fetches the health document and maps the reported status
///
/// Transport failures propagate to the dispatch boundary, which downgrades
/// the service to DOWN.
pub struct HealthCollector {
    probe: Arc<dyn EndpointProbe>,
}

impl HealthCollector {
    pub fn new(probe: Arc<dyn EndpointProbe>) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl Collector for HealthCollector {
    fn endpoint_type(&self) -> EndpointType {
        EndpointType::Health
    }

    async fn collect(
        &self,
        service: &ManagedService,
        descriptor: &EndpointDescriptor,
    ) -> anyhow::Result<CollectorOutcome> {
        let report = self.probe.fetch_health(&descriptor.href).await?;
        let status = map_health_report(&report);

        trace!(
            "health report for {} ({}): {}",
            service.name, service.id, status
        );

        Ok(CollectorOutcome::Status(status))
    }
}

//! Collectors and the per-service dispatch loop
//!
//! Each collector knows how to fetch and interpret one category of probe
//! data. The dispatcher holds a type-to-collector map built once at startup
//! and drives one collection pass per due service:
//!
//! ```text
//! due service → for each discovered endpoint:
//!     lookup collector → collect → apply proposed status
//! finally: mark the service as seen
//! ```
//!
//! ## Failure policy
//!
//! A collector error for one endpoint never aborts the rest of the pass;
//! it is caught at the dispatch boundary, logged and converted to that
//! collector's failure status (DOWN for health/metrics/logs, nothing for
//! logger-config). A collector panic is caught the same way and treated as
//! its error. Unknown endpoint types are skipped with a debug log.

pub mod health;
pub mod logger_config;
pub mod logs;
pub mod metrics;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, instrument, warn};

use crate::model::{EndpointDescriptor, EndpointType, ManagedService, ServiceStatus};
use crate::registry::Registry;
use crate::registry::error::RegistryResult;

/// Result of one successful collector invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorOutcome {
    /// The collector proposes a status for the service
    Status(ServiceStatus),

    /// Nothing to report (e.g. a quiet log window)
    NoChange,
}

/// One category of probe data collection
#[async_trait]
pub trait Collector: Send + Sync {
    fn endpoint_type(&self) -> EndpointType;

    fn can_handle(&self, descriptor: &EndpointDescriptor) -> bool {
        descriptor.enabled && descriptor.endpoint_type == self.endpoint_type()
    }

    /// Fetch and interpret one endpoint of one service
    ///
    /// Errors are handled at the dispatch boundary; implementations should
    /// propagate probe failures with `?` rather than swallowing them.
    async fn collect(
        &self,
        service: &ManagedService,
        descriptor: &EndpointDescriptor,
    ) -> anyhow::Result<CollectorOutcome>;
}

/// Run one collector, converting a panic into its error outcome
///
/// A panicking collector must not take down the whole pass (or leave the
/// scheduler's in-flight tracking dangling); it is handled exactly like a
/// returned error.
async fn run_collector(
    collector: &Arc<dyn Collector>,
    service: &ManagedService,
    descriptor: &EndpointDescriptor,
) -> anyhow::Result<CollectorOutcome> {
    AssertUnwindSafe(collector.collect(service, descriptor))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(anyhow::anyhow!("collector panicked")))
}

/// Status a collector failure implies for the service
fn failure_status(endpoint_type: EndpointType) -> Option<ServiceStatus> {
    match endpoint_type {
        EndpointType::Health | EndpointType::Metrics | EndpointType::Logs => {
            Some(ServiceStatus::Down)
        }
        // Logger config failures surface to the caller, never to the status
        EndpointType::LoggerConfig => None,
    }
}

/// Maps endpoint types to collectors and runs per-service passes
pub struct Dispatcher {
    registry: Registry,
    collectors: HashMap<EndpointType, Arc<dyn Collector>>,
}

impl Dispatcher {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            collectors: HashMap::new(),
        }
    }

    /// Bind a collector for its endpoint type (builder style, called once
    /// at composition time)
    pub fn with_collector(mut self, collector: Arc<dyn Collector>) -> Self {
        self.collectors.insert(collector.endpoint_type(), collector);
        self
    }

    /// Run one collection pass over all of a service's endpoints
    ///
    /// Only fails for an unknown service id; per-endpoint failures are
    /// contained and reflected in the service status instead.
    #[instrument(skip(self))]
    pub async fn collect_service(&self, service_id: u64) -> RegistryResult<()> {
        let service = self.registry.get_service(service_id).await?;

        if service.endpoints.is_empty() {
            debug!("service {} has no discovered endpoints yet", service_id);
        }

        for descriptor in &service.endpoints {
            let Some(collector) = self.collectors.get(&descriptor.endpoint_type) else {
                debug!(
                    "no collector for endpoint type {} on service {}",
                    descriptor.endpoint_type, service_id
                );
                continue;
            };

            if !collector.can_handle(descriptor) {
                continue;
            }

            match run_collector(collector, &service, descriptor).await {
                Ok(CollectorOutcome::Status(status)) => {
                    self.registry.set_status(service_id, status).await?;
                }
                Ok(CollectorOutcome::NoChange) => {}
                Err(e) => {
                    warn!(
                        "{} collection failed for {} ({}): {:#}",
                        descriptor.endpoint_type, service.name, service_id, e
                    );
                    if let Some(status) = failure_status(descriptor.endpoint_type) {
                        self.registry.set_status(service_id, status).await?;
                    }
                }
            }
        }

        self.registry.touch_seen(service_id).await?;
        Ok(())
    }

    /// Run one collection pass over a single endpoint type only
    ///
    /// Backs the "collect now" action surface. Missing endpoints of the
    /// requested type are a no-op.
    pub async fn collect_endpoint(
        &self,
        service_id: u64,
        endpoint_type: EndpointType,
    ) -> RegistryResult<()> {
        let service = self.registry.get_service(service_id).await?;

        let Some(collector) = self.collectors.get(&endpoint_type) else {
            debug!("no collector for endpoint type {endpoint_type}");
            return Ok(());
        };

        for descriptor in &service.endpoints {
            if !collector.can_handle(descriptor) {
                continue;
            }

            match run_collector(collector, &service, descriptor).await {
                Ok(CollectorOutcome::Status(status)) => {
                    self.registry.set_status(service_id, status).await?;
                }
                Ok(CollectorOutcome::NoChange) => {}
                Err(e) => {
                    warn!(
                        "{} collection failed for {} ({}): {:#}",
                        endpoint_type, service.name, service_id, e
                    );
                    if let Some(status) = failure_status(endpoint_type) {
                        self.registry.set_status(service_id, status).await?;
                    }
                }
            }
        }

        self.registry.touch_seen(service_id).await?;
        Ok(())
    }
}

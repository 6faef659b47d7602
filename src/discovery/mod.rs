//! Service discovery
//!
//! Two sources feed the registry:
//!
//! 1. **Orchestrator scan** - periodically pulls the instance inventory from
//!    the orchestration collaborator (the [`Inventory`] trait), filters for
//!    instances carrying the monitorable marker and upserts one candidate
//!    per match.
//! 2. **Direct registration** - a one-shot request payload validated and
//!    upserted synchronously ([`register_direct`]).
//!
//! Both paths finish with hypermedia endpoint discovery: a service with no
//! known endpoints cannot be collected.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::config::ProbePaths;
use crate::model::{EndpointDescriptor, EndpointType, ManagedService, RegistrationSource};
use crate::probe::EndpointProbe;
use crate::registry::{Registry, ServiceCandidate};

/// Label marking an instance as monitorable
pub const MONITOR_LABEL: &str = "fleetwatch.io/monitor";

/// Annotation overriding the probe port
pub const PORT_ANNOTATION: &str = "fleetwatch.io/port";

/// Annotation overriding the probe base path
pub const PATH_ANNOTATION: &str = "fleetwatch.io/path";

/// Default probe base path on discovered instances
const DEFAULT_PROBE_PATH: &str = "/actuator";

/// One instance reported by the orchestration inventory
#[derive(Debug, Clone)]
pub struct InstanceRecord {
    /// Logical service name (the owning workload)
    pub name: String,
    pub namespace: String,
    /// Pod or instance name
    pub instance_name: String,
    pub version: Option<String>,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
}

impl InstanceRecord {
    pub fn is_monitorable(&self) -> bool {
        self.labels
            .get(MONITOR_LABEL)
            .is_some_and(|value| value == "true")
    }
}

/// Orchestration collaborator: instance inventory plus instance restart
///
/// The hub never talks to the orchestrator API directly; the owner of the
/// deployment supplies an implementation of this trait at composition time.
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Fetch the current instance inventory
    async fn instances(&self) -> anyhow::Result<Vec<InstanceRecord>>;

    /// Restart the underlying instance of a managed service
    async fn restart(&self, service: &ManagedService) -> anyhow::Result<()>;
}

/// Fixed inventory, used for config-seeded deployments and tests
#[derive(Default)]
pub struct StaticInventory {
    records: Vec<InstanceRecord>,
}

impl StaticInventory {
    pub fn new(records: Vec<InstanceRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl Inventory for StaticInventory {
    async fn instances(&self) -> anyhow::Result<Vec<InstanceRecord>> {
        Ok(self.records.clone())
    }

    async fn restart(&self, service: &ManagedService) -> anyhow::Result<()> {
        anyhow::bail!("static inventory cannot restart {}", service.name)
    }
}

/// Periodic orchestrator inventory scan
pub struct OrchestratorScan {
    inventory: Arc<dyn Inventory>,
    registry: Registry,
    probe: Arc<dyn EndpointProbe>,
    default_port: u16,
}

impl OrchestratorScan {
    pub fn new(
        inventory: Arc<dyn Inventory>,
        registry: Registry,
        probe: Arc<dyn EndpointProbe>,
        default_port: u16,
    ) -> Self {
        Self {
            inventory,
            registry,
            probe,
            default_port,
        }
    }

    /// One full discovery pass
    ///
    /// Inventory fetch failure is logged and swallowed - the next scheduled
    /// scan is the retry. A single bad record never aborts the pass.
    #[instrument(skip(self))]
    pub async fn run_once(&self) {
        let records = match self.inventory.instances().await {
            Ok(records) => records,
            Err(e) => {
                warn!("inventory fetch failed, skipping scan: {:#}", e);
                return;
            }
        };

        debug!("inventory returned {} instances", records.len());

        for record in records {
            if !record.is_monitorable() {
                continue;
            }

            let candidate = match candidate_from_instance(&record, self.default_port) {
                Ok(candidate) => candidate,
                Err(e) => {
                    warn!(
                        "skipping instance {}/{}: {}",
                        record.namespace, record.instance_name, e
                    );
                    continue;
                }
            };

            let service = self.registry.upsert_service(candidate).await;
            discover_endpoints(&self.registry, self.probe.as_ref(), &service).await;
        }
    }
}

/// Build a registry candidate from an inventory record
///
/// The probe address is the stable internal DNS name of the workload; the
/// port and base path come from annotations with config defaults.
fn candidate_from_instance(
    record: &InstanceRecord,
    default_port: u16,
) -> Result<ServiceCandidate, String> {
    if record.name.is_empty() {
        return Err("instance has no service name".to_string());
    }

    let port = match record.annotations.get(PORT_ANNOTATION) {
        Some(raw) => raw
            .parse::<u16>()
            .map_err(|_| format!("bad port annotation {raw:?}"))?,
        None => default_port,
    };

    let path = record
        .annotations
        .get(PATH_ANNOTATION)
        .map(String::as_str)
        .unwrap_or(DEFAULT_PROBE_PATH);

    let probe_base_url = format!(
        "http://{}.{}.svc.cluster.local:{}{}",
        record.name, record.namespace, port, path
    );

    Ok(ServiceCandidate {
        external_id: Some(format!("{}/{}", record.namespace, record.name)),
        name: record.name.clone(),
        namespace: Some(record.namespace.clone()),
        version: record.version.clone(),
        instance_name: Some(record.instance_name.clone()),
        probe_base_url,
        registration_source: RegistrationSource::Orchestrator,
        poll_interval_seconds: None,
    })
}

/// Discover the introspection endpoints of a service
///
/// Fetches the hypermedia links document from the probe base URL and
/// registers one descriptor per link whose type matches a known collector.
/// On failure the previous endpoint set is left untouched and the service
/// stays collectable-on-retry (`Unknown` until the first successful pass).
pub async fn discover_endpoints(
    registry: &Registry,
    probe: &dyn EndpointProbe,
    service: &ManagedService,
) -> usize {
    let links = match probe.fetch_links(&service.probe_base_url).await {
        Ok(links) => links,
        Err(e) => {
            warn!(
                "endpoint discovery failed for {} ({}): {}",
                service.name, service.id, e
            );
            return 0;
        }
    };

    let mut endpoints: Vec<EndpointDescriptor> = links
        .into_iter()
        .filter_map(|(name, href)| {
            EndpointType::from_link(&name).map(|endpoint_type| EndpointDescriptor {
                endpoint_type,
                href,
                enabled: true,
            })
        })
        .collect();
    endpoints.sort_by_key(|descriptor| descriptor.endpoint_type);

    let count = endpoints.len();
    if let Err(e) = registry.set_endpoints(service.id, endpoints).await {
        warn!("failed to store endpoints for {}: {}", service.id, e);
        return 0;
    }

    debug!(
        "discovered {} endpoints for {} ({})",
        count, service.name, service.id
    );
    count
}

/// Direct self-registration payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub probe_base_url: String,
    pub external_id: Option<String>,
    pub version: Option<String>,
    pub poll_interval_seconds: Option<u64>,
    /// Explicit endpoint paths; skips hypermedia discovery when present
    pub paths: Option<ProbePaths>,
    /// Flat variants of `paths` for clients that send individual keys;
    /// each overrides the matching field of the nested block
    pub health_path: Option<String>,
    pub metrics_path: Option<String>,
    pub logs_path: Option<String>,
    pub config_path: Option<String>,
    /// When false the service is recorded as manually registered
    pub auto_register: Option<bool>,
}

impl RegistrationRequest {
    /// Merge the nested block and the flat keys; `None` means the caller
    /// supplied no paths at all and discovery should run instead
    fn explicit_paths(&self) -> Option<ProbePaths> {
        let flat = [
            &self.health_path,
            &self.metrics_path,
            &self.logs_path,
            &self.config_path,
        ]
        .iter()
        .any(|path| path.is_some());

        if self.paths.is_none() && !flat {
            return None;
        }

        let mut paths = self.paths.clone().unwrap_or_default();
        if let Some(path) = &self.health_path {
            paths.health = path.clone();
        }
        if let Some(path) = &self.metrics_path {
            paths.metrics = path.clone();
        }
        if let Some(path) = &self.logs_path {
            paths.logs = path.clone();
        }
        if let Some(path) = &self.config_path {
            paths.loggers = path.clone();
        }
        Some(paths)
    }
}

/// Errors from the registration intake
#[derive(Debug, PartialEq, Eq)]
pub enum RegistrationError {
    Validation(String),
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::Validation(msg) => write!(f, "invalid registration: {}", msg),
        }
    }
}

impl std::error::Error for RegistrationError {}

/// Handle a direct registration request
///
/// Validates eagerly (nothing is applied on failure), derives the instance
/// name from the probe URL host when absent and finishes with endpoint
/// discovery. Calling twice with the same `externalId` updates the existing
/// record instead of duplicating it.
pub async fn register_direct(
    registry: &Registry,
    probe: &dyn EndpointProbe,
    request: RegistrationRequest,
) -> Result<ManagedService, RegistrationError> {
    if request.name.trim().is_empty() {
        return Err(RegistrationError::Validation(
            "name must not be empty".to_string(),
        ));
    }
    if request.probe_base_url.trim().is_empty() {
        return Err(RegistrationError::Validation(
            "probeBaseUrl must not be empty".to_string(),
        ));
    }

    let explicit_paths = request.explicit_paths();
    let instance_name = host_and_port(&request.probe_base_url);
    let source = if request.auto_register == Some(false) {
        RegistrationSource::Manual
    } else {
        RegistrationSource::Direct
    };

    let candidate = ServiceCandidate {
        external_id: request.external_id,
        name: request.name,
        namespace: None,
        version: request.version,
        instance_name,
        probe_base_url: request.probe_base_url,
        registration_source: source,
        poll_interval_seconds: request.poll_interval_seconds,
    };

    let service = registry.upsert_service(candidate).await;
    info!("registered service {} ({})", service.name, service.id);

    // Explicit paths win over hypermedia discovery
    if let Some(paths) = explicit_paths {
        let endpoints = endpoints_from_paths(&service.probe_base_url, &paths);
        if let Err(e) = registry.set_endpoints(service.id, endpoints).await {
            warn!("failed to store endpoints for {}: {}", service.id, e);
        }
    } else {
        discover_endpoints(registry, probe, &service).await;
    }

    // Return the stored record including any discovered endpoints
    registry
        .get_service(service.id)
        .await
        .map_err(|e| RegistrationError::Validation(e.to_string()))
}

/// Build endpoint descriptors from explicit per-capability paths
///
/// Paths are rooted at the URL origin, not at the probe base path.
fn endpoints_from_paths(probe_base_url: &str, paths: &ProbePaths) -> Vec<EndpointDescriptor> {
    let origin = origin_of(probe_base_url);
    let mut endpoints: Vec<EndpointDescriptor> = [
        (EndpointType::Health, &paths.health),
        (EndpointType::Metrics, &paths.metrics),
        (EndpointType::Logs, &paths.logs),
        (EndpointType::LoggerConfig, &paths.loggers),
    ]
    .into_iter()
    .map(|(endpoint_type, path)| EndpointDescriptor {
        endpoint_type,
        href: format!("{origin}{path}"),
        enabled: true,
    })
    .collect();
    endpoints.sort_by_key(|descriptor| descriptor.endpoint_type);
    endpoints
}

/// `scheme://host:port` without any path component
fn origin_of(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let authority = rest.split('/').next().unwrap_or(rest);
            format!("{scheme}://{authority}")
        }
        None => url.split('/').next().unwrap_or(url).to_string(),
    }
}

/// Derive `host:port` from a URL, used as the fallback instance name
fn host_and_port(url: &str) -> Option<String> {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = without_scheme.split('/').next()?;
    if authority.is_empty() {
        None
    } else {
        Some(authority.to_string())
    }
}

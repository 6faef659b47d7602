//! In-memory service registry
//!
//! The registry is the only shared mutable state in the hub. It owns the
//! managed services, their bounded metric/log history and their config
//! properties. It is constructed once at startup and handed to every other
//! component by clone (all clones share the same inner store).
//!
//! ## Concurrency
//!
//! All mutations are atomic at the level of one record: a single upsert,
//! one metric append, one log batch append, one status change. Readers
//! observe either the pre- or post-mutation state, never a partial record.
//!
//! ## Status change events
//!
//! `set_status` publishes a [`StatusEvent`] on a broadcast channel whenever
//! the status actually changes. Repeated identical statuses are a no-op and
//! emit nothing. The channel may lag or drop events for slow subscribers -
//! status is continuously re-derived, so gaps are acceptable.

pub mod error;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, trace};

use crate::model::{
    ConfigProperty, LogLine, LogRecord, ManagedService, MetricSample, PropertyKind,
    RegistrationSource, ServiceStatus,
};

use error::{RegistryError, RegistryResult};

/// Event published when a service's status changes
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub service_id: u64,
    pub service_name: String,
    pub previous: ServiceStatus,
    pub current: ServiceStatus,
    pub timestamp: DateTime<Utc>,
}

/// Candidate produced by a discovery source, input to [`Registry::upsert_service`]
#[derive(Debug, Clone)]
pub struct ServiceCandidate {
    /// Idempotency key; a key is generated when absent
    pub external_id: Option<String>,
    pub name: String,
    pub namespace: Option<String>,
    pub version: Option<String>,
    pub instance_name: Option<String>,
    pub probe_base_url: String,
    pub registration_source: RegistrationSource,
    pub poll_interval_seconds: Option<u64>,
}

/// Input for creating or updating a config property
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PropertyDraft {
    pub key: String,
    pub value: String,
    #[serde(default = "default_property_kind")]
    pub kind: PropertyKind,
    pub source: Option<String>,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_property_kind() -> PropertyKind {
    PropertyKind::String
}

fn default_true() -> bool {
    true
}

/// History bounds, taken from the hub config
#[derive(Debug, Clone, Copy)]
pub struct RegistryLimits {
    pub recent_metric_limit: usize,
    pub recent_log_limit: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            recent_metric_limit: 500,
            recent_log_limit: 300,
        }
    }
}

struct ServiceEntry {
    service: ManagedService,
    metrics: VecDeque<MetricSample>,
    logs: VecDeque<LogRecord>,
}

struct Inner {
    services: HashMap<u64, ServiceEntry>,
    properties: HashMap<u64, ConfigProperty>,
    next_service_id: u64,
    next_log_id: u64,
    next_property_id: u64,
}

/// Thread-safe in-memory store of managed services
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RwLock<Inner>>,
    limits: RegistryLimits,
    status_tx: broadcast::Sender<StatusEvent>,
}

impl Registry {
    pub fn new(limits: RegistryLimits) -> Self {
        let (status_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(RwLock::new(Inner {
                services: HashMap::new(),
                properties: HashMap::new(),
                next_service_id: 1,
                next_log_id: 1,
                next_property_id: 1,
            })),
            limits,
            status_tx,
        }
    }

    /// Subscribe to status change events
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.status_tx.subscribe()
    }

    /// Create or update a managed service
    ///
    /// Matches by `external_id` first, then by `instance_name`. On a match
    /// the caller-supplied fields are merged into the existing record and
    /// `last_updated` is refreshed; status and history are kept. On no match
    /// a new id is assigned, status defaults to `Unknown` and history starts
    /// empty. A service is never duplicated for the same external identity.
    pub async fn upsert_service(&self, candidate: ServiceCandidate) -> ManagedService {
        let mut inner = self.inner.write().await;
        let now = Utc::now();

        let existing_id = inner
            .services
            .values()
            .find(|entry| {
                if let Some(ext) = &candidate.external_id {
                    entry.service.external_id == *ext
                } else {
                    false
                }
            })
            .or_else(|| {
                inner.services.values().find(|entry| {
                    candidate.instance_name.is_some()
                        && entry.service.instance_name == candidate.instance_name
                })
            })
            .map(|entry| entry.service.id);

        if let Some(id) = existing_id {
            let entry = inner
                .services
                .get_mut(&id)
                .expect("entry disappeared while holding the write lock");
            let service = &mut entry.service;

            service.name = candidate.name;
            service.probe_base_url = candidate.probe_base_url;
            if let Some(ext) = candidate.external_id {
                service.external_id = ext;
            }
            if candidate.namespace.is_some() {
                service.namespace = candidate.namespace;
            }
            if candidate.version.is_some() {
                service.version = candidate.version;
            }
            if candidate.instance_name.is_some() {
                service.instance_name = candidate.instance_name;
            }
            if candidate.poll_interval_seconds.is_some() {
                service.poll_interval_seconds = candidate.poll_interval_seconds;
            }
            service.last_updated = now;

            trace!("updated service {} ({})", service.name, id);
            return service.clone();
        }

        let id = inner.next_service_id;
        inner.next_service_id += 1;

        let external_id = candidate
            .external_id
            .unwrap_or_else(|| generate_external_id(&candidate.name, now));

        let service = ManagedService {
            id,
            external_id,
            name: candidate.name,
            namespace: candidate.namespace,
            version: candidate.version,
            instance_name: candidate.instance_name,
            probe_base_url: candidate.probe_base_url,
            registration_source: candidate.registration_source,
            status: ServiceStatus::Unknown,
            last_updated: now,
            last_seen: None,
            poll_interval_seconds: candidate.poll_interval_seconds,
            endpoints: Vec::new(),
        };

        debug!("registered service {} ({})", service.name, id);

        inner.services.insert(
            id,
            ServiceEntry {
                service: service.clone(),
                metrics: VecDeque::new(),
                logs: VecDeque::new(),
            },
        );

        service
    }

    pub async fn get_service(&self, id: u64) -> RegistryResult<ManagedService> {
        let inner = self.inner.read().await;
        inner
            .services
            .get(&id)
            .map(|entry| entry.service.clone())
            .ok_or(RegistryError::ServiceNotFound(id))
    }

    /// All services, ordered by id
    pub async fn list_services(&self) -> Vec<ManagedService> {
        let inner = self.inner.read().await;
        let mut services: Vec<_> = inner
            .services
            .values()
            .map(|entry| entry.service.clone())
            .collect();
        services.sort_by_key(|service| service.id);
        services
    }

    /// Replace the discovered endpoints of a service
    pub async fn set_endpoints(
        &self,
        id: u64,
        endpoints: Vec<crate::model::EndpointDescriptor>,
    ) -> RegistryResult<()> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .services
            .get_mut(&id)
            .ok_or(RegistryError::ServiceNotFound(id))?;
        entry.service.endpoints = endpoints;
        entry.service.last_updated = Utc::now();
        Ok(())
    }

    /// Update a service's status
    ///
    /// Returns `true` if the status actually changed. Setting the current
    /// value is a no-op and emits no event.
    pub async fn set_status(&self, id: u64, status: ServiceStatus) -> RegistryResult<bool> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .services
            .get_mut(&id)
            .ok_or(RegistryError::ServiceNotFound(id))?;

        if entry.service.status == status {
            return Ok(false);
        }

        let previous = entry.service.status;
        entry.service.status = status;
        entry.service.last_updated = Utc::now();

        let event = StatusEvent {
            service_id: id,
            service_name: entry.service.name.clone(),
            previous,
            current: status,
            timestamp: entry.service.last_updated,
        };

        debug!(
            "service {} ({}) transitioned {} -> {}",
            event.service_name, id, previous, status
        );

        // It's OK if there are no subscribers
        let _ = self.status_tx.send(event);

        Ok(true)
    }

    /// Record that a collection pass touched this service at `when`
    pub async fn mark_seen(&self, id: u64, when: DateTime<Utc>) -> RegistryResult<()> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .services
            .get_mut(&id)
            .ok_or(RegistryError::ServiceNotFound(id))?;
        entry.service.last_seen = Some(when);
        Ok(())
    }

    pub async fn touch_seen(&self, id: u64) -> RegistryResult<()> {
        self.mark_seen(id, Utc::now()).await
    }

    /// Services due for a collection pass
    ///
    /// A service is due when it has never been seen, or its age exceeds the
    /// per-service interval override (falling back to `max_age_seconds`).
    /// Services known DOWN use `down_backoff_seconds` instead, so a dead
    /// endpoint is not hammered on every tick.
    pub async fn list_due_for_polling(
        &self,
        max_age_seconds: u64,
        down_backoff_seconds: u64,
    ) -> Vec<ManagedService> {
        let now = Utc::now();
        let inner = self.inner.read().await;

        inner
            .services
            .values()
            .filter(|entry| {
                let service = &entry.service;
                let Some(seen) = service.last_seen else {
                    return true;
                };
                let age = (now - seen).num_seconds().max(0) as u64;
                if service.status == ServiceStatus::Down {
                    age >= down_backoff_seconds
                } else {
                    age >= service.poll_interval_seconds.unwrap_or(max_age_seconds)
                }
            })
            .map(|entry| entry.service.clone())
            .collect()
    }

    /// Append one metric sample (bounded ring buffer)
    pub async fn record_metric(&self, sample: MetricSample) -> RegistryResult<()> {
        let limit = self.limits.recent_metric_limit;
        let mut inner = self.inner.write().await;
        let entry = inner
            .services
            .get_mut(&sample.service_id)
            .ok_or(RegistryError::ServiceNotFound(sample.service_id))?;

        entry.metrics.push_back(sample);
        while entry.metrics.len() > limit {
            entry.metrics.pop_front();
        }
        Ok(())
    }

    /// Append a batch of parsed log lines, assigning registry log ids
    ///
    /// Returns exactly the appended records, in input order, so the caller
    /// can hand them to the broadcaster.
    pub async fn record_logs(
        &self,
        service_id: u64,
        lines: Vec<LogLine>,
    ) -> RegistryResult<Vec<LogRecord>> {
        let limit = self.limits.recent_log_limit;
        let mut inner = self.inner.write().await;
        if !inner.services.contains_key(&service_id) {
            return Err(RegistryError::ServiceNotFound(service_id));
        }

        let mut appended = Vec::with_capacity(lines.len());
        for line in lines {
            let id = inner.next_log_id;
            inner.next_log_id += 1;
            appended.push(LogRecord {
                id,
                service_id,
                timestamp: line.timestamp,
                level: line.level,
                message: line.message,
            });
        }

        let entry = inner
            .services
            .get_mut(&service_id)
            .expect("entry disappeared while holding the write lock");
        for record in &appended {
            entry.logs.push_back(record.clone());
        }
        while entry.logs.len() > limit {
            entry.logs.pop_front();
        }

        Ok(appended)
    }

    /// The newest `limit` metric samples, oldest first
    pub async fn recent_metrics(
        &self,
        service_id: u64,
        limit: usize,
    ) -> RegistryResult<Vec<MetricSample>> {
        let inner = self.inner.read().await;
        let entry = inner
            .services
            .get(&service_id)
            .ok_or(RegistryError::ServiceNotFound(service_id))?;

        let skip = entry.metrics.len().saturating_sub(limit);
        Ok(entry.metrics.iter().skip(skip).cloned().collect())
    }

    /// The single newest metric sample, if any
    pub async fn latest_metric(&self, service_id: u64) -> RegistryResult<Option<MetricSample>> {
        let inner = self.inner.read().await;
        let entry = inner
            .services
            .get(&service_id)
            .ok_or(RegistryError::ServiceNotFound(service_id))?;
        Ok(entry.metrics.back().cloned())
    }

    /// The newest `limit` log records, newest first
    pub async fn recent_logs(
        &self,
        service_id: u64,
        limit: usize,
    ) -> RegistryResult<Vec<LogRecord>> {
        let inner = self.inner.read().await;
        let entry = inner
            .services
            .get(&service_id)
            .ok_or(RegistryError::ServiceNotFound(service_id))?;
        Ok(entry.logs.iter().rev().take(limit).cloned().collect())
    }

    // ========================================================================
    // Config property CRUD
    // ========================================================================

    pub async fn create_property(
        &self,
        service_id: u64,
        draft: PropertyDraft,
    ) -> RegistryResult<ConfigProperty> {
        validate_draft(&draft)?;

        let mut inner = self.inner.write().await;
        if !inner.services.contains_key(&service_id) {
            return Err(RegistryError::ServiceNotFound(service_id));
        }

        let id = inner.next_property_id;
        inner.next_property_id += 1;

        let property = ConfigProperty {
            id,
            service_id,
            key: draft.key,
            value: draft.value,
            kind: draft.kind,
            source: draft.source,
            description: draft.description,
            is_active: draft.is_active,
            last_updated: Utc::now(),
        };

        inner.properties.insert(id, property.clone());
        Ok(property)
    }

    pub async fn list_properties(&self, service_id: u64) -> RegistryResult<Vec<ConfigProperty>> {
        let inner = self.inner.read().await;
        if !inner.services.contains_key(&service_id) {
            return Err(RegistryError::ServiceNotFound(service_id));
        }

        let mut properties: Vec<_> = inner
            .properties
            .values()
            .filter(|property| property.service_id == service_id)
            .cloned()
            .collect();
        properties.sort_by_key(|property| property.id);
        Ok(properties)
    }

    pub async fn update_property(
        &self,
        property_id: u64,
        draft: PropertyDraft,
    ) -> RegistryResult<ConfigProperty> {
        validate_draft(&draft)?;

        let mut inner = self.inner.write().await;
        let property = inner
            .properties
            .get_mut(&property_id)
            .ok_or(RegistryError::PropertyNotFound(property_id))?;

        property.key = draft.key;
        property.value = draft.value;
        property.kind = draft.kind;
        property.source = draft.source;
        property.description = draft.description;
        property.is_active = draft.is_active;
        property.last_updated = Utc::now();

        Ok(property.clone())
    }

    pub async fn delete_property(&self, property_id: u64) -> RegistryResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .properties
            .remove(&property_id)
            .map(|_| ())
            .ok_or(RegistryError::PropertyNotFound(property_id))
    }
}

fn validate_draft(draft: &PropertyDraft) -> RegistryResult<()> {
    if draft.key.trim().is_empty() {
        return Err(RegistryError::Validation(
            "property key must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn generate_external_id(name: &str, now: DateTime<Utc>) -> String {
    format!("{}-{:x}", name, now.timestamp_nanos_opt().unwrap_or(0))
}

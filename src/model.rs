//! Core domain types shared across the hub
//!
//! Everything in here is plain data: the registry owns the authoritative
//! copies, collectors and the API layer work on clones. All types are
//! serializable so they can cross the REST/WebSocket boundary unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health status of a managed service
///
/// A service starts out as `Unknown` and moves between states based on
/// collector outcomes. There is no terminal state - a service can flap
/// between `Up` and `Down` indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Up,
    Down,
    /// Partial health - only reachable via an explicit "out of service"
    /// report from the health endpoint
    Warning,
    Unknown,
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceStatus::Up => "UP",
            ServiceStatus::Down => "DOWN",
            ServiceStatus::Warning => "WARNING",
            ServiceStatus::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// How a service ended up in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationSource {
    /// Found by the orchestrator inventory scan
    Orchestrator,
    /// Self-registered via the registration intake
    Direct,
    /// Seeded from the config file or registered with auto_register off
    Manual,
}

/// Category of introspection endpoint a collector knows how to handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointType {
    Health,
    Metrics,
    Logs,
    LoggerConfig,
}

impl EndpointType {
    /// Map a hypermedia link name to an endpoint type
    ///
    /// Returns `None` for link names no collector handles (the dispatcher
    /// skips those).
    pub fn from_link(name: &str) -> Option<Self> {
        match name {
            "health" => Some(EndpointType::Health),
            "metrics" => Some(EndpointType::Metrics),
            "logfile" | "logs" => Some(EndpointType::Logs),
            "loggers" => Some(EndpointType::LoggerConfig),
            _ => None,
        }
    }
}

impl std::fmt::Display for EndpointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EndpointType::Health => "health",
            EndpointType::Metrics => "metrics",
            EndpointType::Logs => "logs",
            EndpointType::LoggerConfig => "loggers",
        };
        write!(f, "{s}")
    }
}

/// One discovered introspection endpoint of a managed service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub endpoint_type: EndpointType,
    /// Absolute URL as advertised by the service's links document
    pub href: String,
    pub enabled: bool,
}

/// One monitored application instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedService {
    /// Registry-assigned id, stable for the process lifetime, never reused
    pub id: u64,
    /// Caller-supplied idempotency key (generated if absent)
    pub external_id: String,
    pub name: String,
    pub namespace: Option<String>,
    pub version: Option<String>,
    /// Pod or instance name, used as the secondary match key on upsert
    pub instance_name: Option<String>,
    /// Base URL of the introspection surface
    pub probe_base_url: String,
    pub registration_source: RegistrationSource,
    pub status: ServiceStatus,
    pub last_updated: DateTime<Utc>,
    /// Set after every collection pass, successful or not
    pub last_seen: Option<DateTime<Utc>>,
    /// Per-service override of the collection interval
    pub poll_interval_seconds: Option<u64>,
    /// Endpoints found by hypermedia discovery, sorted by endpoint type
    pub endpoints: Vec<EndpointDescriptor>,
}

/// One point-in-time resource reading for a service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub service_id: u64,
    pub timestamp: DateTime<Utc>,
    pub memory_used_mb: f64,
    pub memory_max_mb: f64,
    /// 0.0 - 1.0
    pub cpu_utilization: f64,
    /// Errors observed since the previous sample
    pub error_count: u64,
    /// Opaque collector payload (raw gauge values, counter totals)
    pub raw_payload: serde_json::Value,
}

/// Severity of a log line
///
/// Free-form input levels are normalized via [`LogLevel::normalize`];
/// anything unrecognized becomes `Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ERROR" | "FATAL" | "SEVERE" => LogLevel::Error,
            "WARN" | "WARNING" => LogLevel::Warning,
            "INFO" => LogLevel::Info,
            "DEBUG" | "FINE" => LogLevel::Debug,
            "TRACE" | "FINEST" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        };
        write!(f, "{s}")
    }
}

/// A parsed log line that has not been assigned a registry id yet
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// One stored log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Monotonic per registry
    pub id: u64,
    pub service_id: u64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Value shape of a configuration property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyKind {
    String,
    Number,
    Boolean,
    Array,
    Map,
    Json,
    Yaml,
}

/// One introspected or user-entered configuration setting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigProperty {
    pub id: u64,
    pub service_id: u64,
    pub key: String,
    pub value: String,
    pub kind: PropertyKind,
    /// Originating file or profile name
    pub source: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub last_updated: DateTime<Utc>,
}

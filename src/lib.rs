//! Fleetwatch monitoring hub
//!
//! A central hub that discovers, polls and aggregates the health,
//! metrics and logs of a fleet of managed services exposing
//! actuator-style HTTP probe endpoints.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   upserts   ┌──────────┐   status events   ┌─────────┐
//! │ Discovery │ ──────────> │ Registry │ ────────────────> │ clients │
//! └───────────┘             └──────────┘                   └─────────┘
//!       ▲                      ▲    ▲
//!       │ ticks                │    │ samples / logs
//! ┌───────────┐   collects  ┌────────────┐   new logs   ┌─────────────┐
//! │ Scheduler │ ──────────> │ Dispatcher │ ───────────> │ Broadcaster │
//! └───────────┘             └────────────┘              └─────────────┘
//! ```
//!
//! The [`registry::Registry`] is the single source of truth. The
//! [`scheduler`] drives periodic discovery and collection, the
//! [`collectors`] turn probe responses into registry updates, and the
//! [`broadcast`] module fans newly ingested log records out to
//! subscribed connections.

pub mod api;
pub mod broadcast;
pub mod collectors;
pub mod config;
pub mod discovery;
pub mod model;
pub mod probe;
pub mod registry;
pub mod scheduler;
pub mod status;
pub mod util;

pub use model::{
    EndpointDescriptor, EndpointType, LogLevel, LogLine, LogRecord, ManagedService, MetricSample,
    RegistrationSource, ServiceStatus,
};
pub use registry::{Registry, RegistryLimits, StatusEvent};

//! API shared state

use std::sync::Arc;

use crate::broadcast::LogBroadcaster;
use crate::collectors::Dispatcher;
use crate::collectors::logger_config::LoggerConfigCollector;
use crate::discovery::Inventory;
use crate::probe::EndpointProbe;
use crate::registry::Registry;
use crate::scheduler::SchedulerHandle;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// The service registry (shared with the scheduler and collectors)
    pub registry: Registry,

    /// Handle to the scheduler for immediate collection triggers
    pub scheduler: SchedulerHandle,

    /// Dispatcher for endpoint-scoped collection triggers
    pub dispatcher: Arc<Dispatcher>,

    /// Log fan-out hub backing the WebSocket stream
    pub broadcaster: LogBroadcaster,

    /// Probe used for registration-time endpoint discovery
    pub probe: Arc<dyn EndpointProbe>,

    /// Logger level read/write proxy
    pub loggers: Arc<LoggerConfigCollector>,

    /// Orchestration collaborator, used by the restart action
    pub inventory: Arc<dyn Inventory>,
}

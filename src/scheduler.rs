//! Scheduler - drives periodic discovery and collection
//!
//! The scheduler is an actor running two independent tickers:
//!
//! - **Discovery tick**: spawns an orchestrator inventory scan. Scans run
//!   as detached tasks so a slow inventory never blocks collection.
//! - **Collection tick**: asks the registry which services are due and
//!   spawns one collection task per due service into a `JoinSet`.
//!
//! Per-service collection is the unit of concurrency: different services
//! collect fully in parallel, while an in-flight set guarantees the same
//! service is never polled twice concurrently - a slow poll simply makes
//! the service non-due until it finishes. A small stagger offset derived
//! from the service id spreads tick load across many services.
//!
//! ```text
//! Discovery tick → OrchestratorScan → Registry upserts
//! Collection tick → list_due_for_polling → [collect task per service] → Dispatcher
//!     ↑
//!     └─── Commands (DiscoverNow, CollectNow, Shutdown)
//! ```

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::interval;
use tracing::{debug, error, instrument, trace, warn};

use crate::collectors::Dispatcher;
use crate::discovery::{self, OrchestratorScan};
use crate::model::ManagedService;
use crate::probe::EndpointProbe;
use crate::registry::Registry;
use crate::registry::error::RegistryResult;

/// Scheduling knobs, taken from the hub config
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub discovery_interval: Duration,
    pub collection_interval: Duration,
    pub max_age_seconds: u64,
    pub down_backoff_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            discovery_interval: Duration::from_secs(60),
            collection_interval: Duration::from_secs(30),
            max_age_seconds: 60,
            down_backoff_seconds: 120,
        }
    }
}

/// Commands that can be sent to the scheduler actor
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run an inventory scan immediately
    DiscoverNow { respond_to: oneshot::Sender<()> },

    /// Run a collection pass for one service immediately
    ///
    /// A no-op if a pass for that service is already in flight.
    CollectNow {
        service_id: u64,
        respond_to: oneshot::Sender<RegistryResult<()>>,
    },

    /// Gracefully shut down; in-flight passes are drained
    Shutdown,
}

/// Actor driving the periodic loops
pub struct SchedulerActor {
    registry: Registry,
    dispatcher: Arc<Dispatcher>,
    scan: Option<Arc<OrchestratorScan>>,
    probe: Arc<dyn EndpointProbe>,
    config: SchedulerConfig,
    command_rx: mpsc::Receiver<SchedulerCommand>,

    /// Service ids with a collection pass currently in flight
    in_flight: HashSet<u64>,
    tasks: JoinSet<u64>,
}

impl SchedulerActor {
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting scheduler actor");

        let mut discovery_tick = interval(self.config.discovery_interval);
        let mut collection_tick = interval(self.config.collection_interval);

        loop {
            tokio::select! {
                _ = discovery_tick.tick() => {
                    if let Some(scan) = &self.scan {
                        let scan = Arc::clone(scan);
                        tokio::spawn(async move { scan.run_once().await });
                    }
                }

                _ = collection_tick.tick() => {
                    self.collect_due().await;
                }

                Some(finished) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    match finished {
                        Ok(service_id) => {
                            self.in_flight.remove(&service_id);
                        }
                        Err(e) => {
                            // Tasks catch panics and always return their
                            // service id, so this only fires on runtime
                            // shutdown cancelling the task
                            error!("collection task failed: {e}");
                        }
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SchedulerCommand::DiscoverNow { respond_to } => {
                            debug!("received DiscoverNow command");
                            if let Some(scan) = &self.scan {
                                scan.run_once().await;
                            }
                            let _ = respond_to.send(());
                        }

                        SchedulerCommand::CollectNow { service_id, respond_to } => {
                            debug!("received CollectNow for service {service_id}");
                            match self.registry.get_service(service_id).await {
                                Ok(service) if self.in_flight.contains(&service_id) => {
                                    trace!("service {} already collecting", service.id);
                                    let _ = respond_to.send(Ok(()));
                                }
                                Ok(service) => {
                                    self.spawn_collection(service, Some(respond_to), false);
                                }
                                Err(e) => {
                                    let _ = respond_to.send(Err(e));
                                }
                            }
                        }

                        SchedulerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        // Let in-flight passes finish; registry writes are atomic per
        // record, so abandoning here would also be safe
        while self.tasks.join_next().await.is_some() {}

        debug!("scheduler actor stopped");
    }

    /// Spawn collection tasks for every due service not already in flight
    async fn collect_due(&mut self) {
        let due = self
            .registry
            .list_due_for_polling(self.config.max_age_seconds, self.config.down_backoff_seconds)
            .await;

        trace!("{} services due for polling", due.len());

        for service in due {
            if self.in_flight.contains(&service.id) {
                trace!("service {} still collecting, skipping", service.id);
                continue;
            }
            self.spawn_collection(service, None, true);
        }
    }

    fn spawn_collection(
        &mut self,
        service: ManagedService,
        respond_to: Option<oneshot::Sender<RegistryResult<()>>>,
        stagger: bool,
    ) {
        self.in_flight.insert(service.id);

        let registry = self.registry.clone();
        let dispatcher = Arc::clone(&self.dispatcher);
        let probe = Arc::clone(&self.probe);

        self.tasks.spawn(async move {
            let service_id = service.id;

            if stagger {
                // Spread simultaneous-due services across the tick
                let offset = Duration::from_millis((service_id % 8) * 125);
                tokio::time::sleep(offset).await;
            }

            // A service without endpoints cannot be collected; retry
            // hypermedia discovery before the pass
            if service.endpoints.is_empty() {
                discovery::discover_endpoints(&registry, probe.as_ref(), &service).await;
            }

            // The pass must never panic out of this task: a lost panic would
            // leave the service id in the in-flight set and starve the
            // service from all future polling
            let result = match AssertUnwindSafe(dispatcher.collect_service(service_id))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(_) => {
                    error!("collection pass for service {service_id} panicked");
                    Ok(())
                }
            };
            if let Err(e) = &result {
                warn!("collection pass for service {service_id} failed: {e}");
            }

            if let Some(respond_to) = respond_to {
                let _ = respond_to.send(result);
            }

            service_id
        });
    }
}

/// Handle for controlling the scheduler actor
///
/// Can be cloned and shared across threads.
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Spawn the scheduler as a tokio task and return a handle
    pub fn spawn(
        registry: Registry,
        dispatcher: Arc<Dispatcher>,
        scan: Option<Arc<OrchestratorScan>>,
        probe: Arc<dyn EndpointProbe>,
        config: SchedulerConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = SchedulerActor {
            registry,
            dispatcher,
            scan,
            probe,
            config,
            command_rx: cmd_rx,
            in_flight: HashSet::new(),
            tasks: JoinSet::new(),
        };

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run an inventory scan immediately
    pub async fn discover_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::DiscoverNow { respond_to: tx })
            .await
            .context("failed to send DiscoverNow command")?;
        rx.await.context("failed to receive response")?;
        Ok(())
    }

    /// Run a collection pass for one service immediately
    pub async fn collect_now(&self, service_id: u64) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::CollectNow {
                service_id,
                respond_to: tx,
            })
            .await
            .context("failed to send CollectNow command")?;

        rx.await.context("failed to receive response")??;
        Ok(())
    }

    /// Gracefully shut down the scheduler
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SchedulerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}

//! Log fan-out broadcaster
//!
//! Keeps a mapping from live subscriber connection to its set of subscribed
//! service ids and pushes newly collected log records to every interested
//! connection. Delivery is at-most-once, best effort: a broken sink is
//! skipped and pruned, and `publish` never fails.
//!
//! The broadcaster is connection-agnostic - the WebSocket layer and tests
//! both plug in via the [`LogSink`] trait.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::model::LogRecord;

/// Identifier of one live subscriber connection
pub type ConnectionId = u64;

/// Error pushing to a subscriber sink
#[derive(Debug)]
pub enum SinkError {
    /// The underlying transport is gone; the connection will be pruned
    Closed,
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Closed => write!(f, "subscriber connection closed"),
        }
    }
}

impl std::error::Error for SinkError {}

/// Outbound half of a subscriber connection
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn send_logs(&self, service_id: u64, records: &[LogRecord]) -> Result<(), SinkError>;
}

/// Control message a subscriber sends over its connection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Subscribe {
        #[serde(rename = "serviceId")]
        service_id: u64,
    },
    Unsubscribe {
        #[serde(rename = "serviceId")]
        service_id: u64,
    },
}

/// Push message sent to subscribers
#[derive(Debug, Clone, Serialize)]
pub struct LogPush<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(rename = "serviceId")]
    pub service_id: u64,
    pub logs: &'a [LogRecord],
}

impl<'a> LogPush<'a> {
    pub fn new(service_id: u64, logs: &'a [LogRecord]) -> Self {
        Self {
            kind: "logs",
            service_id,
            logs,
        }
    }
}

struct Subscriber {
    sink: Arc<dyn LogSink>,
    interests: HashSet<u64>,
}

/// Fan-out hub for newly collected log records
#[derive(Clone)]
pub struct LogBroadcaster {
    subscribers: Arc<RwLock<HashMap<ConnectionId, Subscriber>>>,
    next_id: Arc<AtomicU64>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a new connection with an empty interest set
    pub async fn register(&self, sink: Arc<dyn LogSink>) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().await.insert(
            id,
            Subscriber {
                sink,
                interests: HashSet::new(),
            },
        );
        debug!("connection {id} registered");
        id
    }

    /// Add a service to a connection's interest set (idempotent)
    pub async fn subscribe(&self, connection: ConnectionId, service_id: u64) {
        if let Some(subscriber) = self.subscribers.write().await.get_mut(&connection) {
            subscriber.interests.insert(service_id);
            trace!("connection {connection} subscribed to service {service_id}");
        }
    }

    /// Remove a service from a connection's interest set (idempotent)
    pub async fn unsubscribe(&self, connection: ConnectionId, service_id: u64) {
        if let Some(subscriber) = self.subscribers.write().await.get_mut(&connection) {
            subscriber.interests.remove(&service_id);
            trace!("connection {connection} unsubscribed from service {service_id}");
        }
    }

    /// Drop a connection and its interest set entirely
    pub async fn on_connection_closed(&self, connection: ConnectionId) {
        self.subscribers.write().await.remove(&connection);
        debug!("connection {connection} closed");
    }

    /// Apply a parsed control message to a connection
    pub async fn handle_control(&self, connection: ConnectionId, message: ControlMessage) {
        match message {
            ControlMessage::Subscribe { service_id } => {
                self.subscribe(connection, service_id).await
            }
            ControlMessage::Unsubscribe { service_id } => {
                self.unsubscribe(connection, service_id).await
            }
        }
    }

    /// Push a batch of records to every connection interested in the service
    ///
    /// Broken connections are skipped and pruned. Returns the number of
    /// connections the batch was delivered to.
    pub async fn publish(&self, service_id: u64, records: &[LogRecord]) -> usize {
        if records.is_empty() {
            return 0;
        }

        let interested: Vec<(ConnectionId, Arc<dyn LogSink>)> = {
            let subscribers = self.subscribers.read().await;
            subscribers
                .iter()
                .filter(|(_, subscriber)| subscriber.interests.contains(&service_id))
                .map(|(id, subscriber)| (*id, Arc::clone(&subscriber.sink)))
                .collect()
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (connection, sink) in interested {
            match sink.send_logs(service_id, records).await {
                Ok(()) => delivered += 1,
                Err(SinkError::Closed) => {
                    debug!("pruning dead connection {connection}");
                    dead.push(connection);
                }
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for connection in dead {
                subscribers.remove(&connection);
            }
        }

        delivered
    }

    /// Number of live connections (for stats and tests)
    pub async fn connection_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

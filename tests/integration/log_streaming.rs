//! Log ingestion and fan-out tests
//!
//! Drives the logs collector against a mocked log window and asserts that
//! subscribed sinks receive exactly the newly appended records.

use std::sync::Arc;

use async_trait::async_trait;
use fleetwatch::broadcast::{LogSink, SinkError};
use fleetwatch::model::LogRecord;
use tokio::sync::Mutex;
use wiremock::MockServer;

use crate::helpers::*;

/// Sink that remembers everything it was sent
#[derive(Default)]
struct CollectingSink {
    received: Mutex<Vec<LogRecord>>,
}

#[async_trait]
impl LogSink for CollectingSink {
    async fn send_logs(&self, _service_id: u64, records: &[LogRecord]) -> Result<(), SinkError> {
        self.received.lock().await.extend_from_slice(records);
        Ok(())
    }
}

#[tokio::test]
async fn test_subscribed_sink_receives_new_records_only() {
    let server = MockServer::start().await;
    mount_links(&server, &["logfile"]).await;
    mount_log_window(
        &server,
        "2025-05-03 10:00:00 INFO first\n2025-05-03 10:00:01 INFO second\n",
    )
    .await;

    let stack = test_stack();
    let service = register_against(&stack, &server, "orders").await;

    let sink = Arc::new(CollectingSink::default());
    let connection = stack.broadcaster.register(sink.clone()).await;
    stack.broadcaster.subscribe(connection, service.id).await;

    stack.dispatcher.collect_service(service.id).await.unwrap();
    assert_eq!(sink.received.lock().await.len(), 2);

    // The next window overlaps: one old line, one new
    server.reset().await;
    mount_log_window(
        &server,
        "2025-05-03 10:00:01 INFO second\n2025-05-03 10:00:02 WARN third\n",
    )
    .await;

    stack.dispatcher.collect_service(service.id).await.unwrap();

    let received = sink.received.lock().await;
    assert_eq!(received.len(), 3);
    assert_eq!(received[2].message, "third");
}

#[tokio::test]
async fn test_unsubscribed_connection_receives_nothing() {
    let server = MockServer::start().await;
    mount_links(&server, &["logfile"]).await;
    mount_log_window(&server, "2025-05-03 10:00:00 INFO hello\n").await;

    let stack = test_stack();
    let service = register_against(&stack, &server, "orders").await;

    let sink = Arc::new(CollectingSink::default());
    let connection = stack.broadcaster.register(sink.clone()).await;
    // Subscribed to a different service
    stack.broadcaster.subscribe(connection, service.id + 1).await;

    stack.dispatcher.collect_service(service.id).await.unwrap();

    assert!(sink.received.lock().await.is_empty());
}

#[tokio::test]
async fn test_records_carry_monotonic_ids() {
    let server = MockServer::start().await;
    mount_links(&server, &["logfile"]).await;
    mount_log_window(
        &server,
        "2025-05-03 10:00:00 INFO a\n2025-05-03 10:00:01 INFO b\n2025-05-03 10:00:02 INFO c\n",
    )
    .await;

    let stack = test_stack();
    let service = register_against(&stack, &server, "orders").await;

    let sink = Arc::new(CollectingSink::default());
    let connection = stack.broadcaster.register(sink.clone()).await;
    stack.broadcaster.subscribe(connection, service.id).await;

    stack.dispatcher.collect_service(service.id).await.unwrap();

    let received = sink.received.lock().await;
    let ids: Vec<u64> = received.iter().map(|record| record.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(ids, sorted);
}

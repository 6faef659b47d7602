//! End-to-end collection tests against a mocked managed service
//!
//! These tests run the real HTTP probe, collectors and dispatcher against
//! wiremock and assert on what lands in the registry.

use fleetwatch::model::{EndpointType, ServiceStatus};
use wiremock::MockServer;

use crate::helpers::*;

#[tokio::test]
async fn test_full_collection_pass() {
    let server = MockServer::start().await;
    mount_links(&server, &["health", "metrics", "logfile"]).await;
    mount_health(&server, "UP").await;
    mount_empty_metrics(&server).await;
    mount_log_window(
        &server,
        "2025-05-03 10:15:32.789 INFO  [main] started\n2025-05-03 10:15:33.001 ERROR [main] boom\n",
    )
    .await;

    let stack = test_stack();
    let service = register_against(&stack, &server, "orders").await;
    assert_eq!(service.endpoints.len(), 3);

    stack.dispatcher.collect_service(service.id).await.unwrap();

    let service = stack.registry.get_service(service.id).await.unwrap();
    assert_eq!(service.status, ServiceStatus::Up);
    assert!(service.last_seen.is_some());

    let sample = stack.registry.latest_metric(service.id).await.unwrap();
    assert!(sample.is_some());

    let logs = stack.registry.recent_logs(service.id, 10).await.unwrap();
    assert_eq!(logs.len(), 2);
    // Newest first
    assert_eq!(logs[0].message, "[main] boom");
}

#[tokio::test]
async fn test_status_event_emitted_on_transition() {
    let server = MockServer::start().await;
    mount_links(&server, &["health"]).await;
    mount_health(&server, "UP").await;

    let stack = test_stack();
    let service = register_against(&stack, &server, "orders").await;

    let mut events = stack.registry.subscribe_status();
    stack.dispatcher.collect_service(service.id).await.unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.service_id, service.id);
    assert_eq!(event.previous, ServiceStatus::Unknown);
    assert_eq!(event.current, ServiceStatus::Up);

    // A second identical pass must not emit another event
    stack.dispatcher.collect_service(service.id).await.unwrap();
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_out_of_service_maps_to_warning() {
    let server = MockServer::start().await;
    mount_links(&server, &["health"]).await;
    mount_health(&server, "OUT_OF_SERVICE").await;

    let stack = test_stack();
    let service = register_against(&stack, &server, "orders").await;

    stack.dispatcher.collect_service(service.id).await.unwrap();

    let service = stack.registry.get_service(service.id).await.unwrap();
    assert_eq!(service.status, ServiceStatus::Warning);
}

#[tokio::test]
async fn test_collect_single_endpoint() {
    let server = MockServer::start().await;
    mount_links(&server, &["health", "metrics"]).await;
    mount_health(&server, "UP").await;
    mount_empty_metrics(&server).await;

    let stack = test_stack();
    let service = register_against(&stack, &server, "orders").await;

    stack
        .dispatcher
        .collect_endpoint(service.id, EndpointType::Health)
        .await
        .unwrap();

    let service = stack.registry.get_service(service.id).await.unwrap();
    assert_eq!(service.status, ServiceStatus::Up);
    // Only the health endpoint ran
    assert!(
        stack
            .registry
            .latest_metric(service.id)
            .await
            .unwrap()
            .is_none()
    );
}

//! Failure and recovery tests
//!
//! These tests verify that probe failures degrade the service status
//! without crashing the pipeline, and that recovery is observed on the
//! next pass.

use fleetwatch::model::ServiceStatus;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_health_failure_marks_down() {
    let server = MockServer::start().await;
    mount_links(&server, &["health"]).await;
    Mock::given(method("GET"))
        .and(path("/actuator/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let stack = test_stack();
    let service = register_against(&stack, &server, "orders").await;

    stack.dispatcher.collect_service(service.id).await.unwrap();

    let service = stack.registry.get_service(service.id).await.unwrap();
    assert_eq!(service.status, ServiceStatus::Down);
}

#[tokio::test]
async fn test_recovery_after_down() {
    let server = MockServer::start().await;
    mount_links(&server, &["health"]).await;
    Mock::given(method("GET"))
        .and(path("/actuator/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let stack = test_stack();
    let service = register_against(&stack, &server, "orders").await;

    stack.dispatcher.collect_service(service.id).await.unwrap();
    assert_eq!(
        stack.registry.get_service(service.id).await.unwrap().status,
        ServiceStatus::Down
    );

    // The service comes back
    server.reset().await;
    mount_health(&server, "UP").await;

    stack.dispatcher.collect_service(service.id).await.unwrap();
    assert_eq!(
        stack.registry.get_service(service.id).await.unwrap().status,
        ServiceStatus::Up
    );
}

#[tokio::test]
async fn test_one_endpoint_failure_does_not_abort_the_pass() {
    let server = MockServer::start().await;
    mount_links(&server, &["health", "logfile"]).await;
    mount_health(&server, "UP").await;
    // The log endpoint is broken
    Mock::given(method("GET"))
        .and(path("/actuator/logfile"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let stack = test_stack();
    let service = register_against(&stack, &server, "orders").await;

    stack.dispatcher.collect_service(service.id).await.unwrap();

    // The log failure wins the status argument, but the pass completed
    // and last_seen advanced
    let service = stack.registry.get_service(service.id).await.unwrap();
    assert_eq!(service.status, ServiceStatus::Down);
    assert!(service.last_seen.is_some());
}

#[tokio::test]
async fn test_logger_config_failure_has_no_status_effect() {
    let server = MockServer::start().await;
    mount_links(&server, &["loggers"]).await;
    Mock::given(method("GET"))
        .and(path("/actuator/loggers"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let stack = test_stack();
    let service = register_against(&stack, &server, "orders").await;

    stack.dispatcher.collect_service(service.id).await.unwrap();

    let service = stack.registry.get_service(service.id).await.unwrap();
    assert_eq!(service.status, ServiceStatus::Unknown);
}

#[tokio::test]
async fn test_unreachable_service_marks_down() {
    let server = MockServer::start().await;
    mount_links(&server, &["health"]).await;

    let stack = test_stack();
    let service = register_against(&stack, &server, "orders").await;

    // Shut the mock down so the probe hits a dead port
    drop(server);

    stack.dispatcher.collect_service(service.id).await.unwrap();

    let service = stack.registry.get_service(service.id).await.unwrap();
    assert_eq!(service.status, ServiceStatus::Down);
}

//! Registration intake tests

use fleetwatch::config::ProbePaths;
use fleetwatch::discovery::{RegistrationError, RegistrationRequest, register_direct};
use fleetwatch::model::{EndpointType, RegistrationSource, ServiceStatus};
use wiremock::MockServer;

use crate::helpers::*;

#[tokio::test]
async fn test_registration_discovers_endpoints() {
    let server = MockServer::start().await;
    mount_links(&server, &["health", "metrics", "logfile", "loggers"]).await;

    let stack = test_stack();
    let service = register_against(&stack, &server, "orders").await;

    assert_eq!(service.status, ServiceStatus::Unknown);
    assert_eq!(service.registration_source, RegistrationSource::Direct);
    assert_eq!(service.endpoints.len(), 4);

    let types: Vec<EndpointType> = service
        .endpoints
        .iter()
        .map(|endpoint| endpoint.endpoint_type)
        .collect();
    assert_eq!(
        types,
        vec![
            EndpointType::Health,
            EndpointType::Metrics,
            EndpointType::Logs,
            EndpointType::LoggerConfig,
        ]
    );
}

#[tokio::test]
async fn test_reregistration_is_idempotent() {
    let server = MockServer::start().await;
    mount_links(&server, &["health"]).await;

    let stack = test_stack();
    let first = register_against(&stack, &server, "orders").await;
    let second = register_against(&stack, &server, "orders").await;

    // Same instance (same host and port) resolves to the same entry
    assert_eq!(first.id, second.id);
    assert_eq!(stack.registry.list_services().await.len(), 1);
}

#[tokio::test]
async fn test_registration_survives_unreachable_probe() {
    // No mocks mounted - endpoint discovery will fail
    let server = MockServer::start().await;
    drop(server);

    let stack = test_stack();
    let result = register_direct(
        &stack.registry,
        stack.probe.as_ref(),
        RegistrationRequest {
            name: "orders".to_string(),
            probe_base_url: "http://127.0.0.1:1/actuator".to_string(),
            ..RegistrationRequest::default()
        },
    )
    .await;

    // The service is still registered, just without endpoints
    let service = result.expect("registration must not depend on the probe");
    assert!(service.endpoints.is_empty());
}

#[tokio::test]
async fn test_explicit_paths_skip_discovery() {
    // No link document mounted - discovery would find nothing
    let stack = test_stack();
    let service = register_direct(
        &stack.registry,
        stack.probe.as_ref(),
        RegistrationRequest {
            name: "orders".to_string(),
            probe_base_url: "http://orders:8080/actuator".to_string(),
            paths: Some(ProbePaths {
                health: "/manage/health".to_string(),
                ..ProbePaths::default()
            }),
            ..RegistrationRequest::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(service.endpoints.len(), 4);
    let health = service
        .endpoints
        .iter()
        .find(|endpoint| endpoint.endpoint_type == EndpointType::Health)
        .unwrap();
    assert_eq!(health.href, "http://orders:8080/manage/health");
}

#[tokio::test]
async fn test_flat_path_fields_build_endpoints() {
    let stack = test_stack();
    let service = register_direct(
        &stack.registry,
        stack.probe.as_ref(),
        RegistrationRequest {
            name: "orders".to_string(),
            probe_base_url: "http://orders:8080/actuator".to_string(),
            logs_path: Some("/manage/logfile".to_string()),
            ..RegistrationRequest::default()
        },
    )
    .await
    .unwrap();

    // One flat key is enough to switch to explicit paths; the rest default
    assert_eq!(service.endpoints.len(), 4);
    let logs = service
        .endpoints
        .iter()
        .find(|endpoint| endpoint.endpoint_type == EndpointType::Logs)
        .unwrap();
    assert_eq!(logs.href, "http://orders:8080/manage/logfile");
    let health = service
        .endpoints
        .iter()
        .find(|endpoint| endpoint.endpoint_type == EndpointType::Health)
        .unwrap();
    assert_eq!(health.href, "http://orders:8080/actuator/health");
}

#[tokio::test]
async fn test_registration_rejects_blank_name() {
    let stack = test_stack();
    let result = register_direct(
        &stack.registry,
        stack.probe.as_ref(),
        RegistrationRequest {
            name: "  ".to_string(),
            probe_base_url: "http://orders:8080/actuator".to_string(),
            ..RegistrationRequest::default()
        },
    )
    .await;

    assert!(matches!(result, Err(RegistrationError::Validation(_))));
}

#[tokio::test]
async fn test_opted_out_service_is_manual() {
    let server = MockServer::start().await;
    mount_links(&server, &["health"]).await;

    let stack = test_stack();
    let service = register_direct(
        &stack.registry,
        stack.probe.as_ref(),
        RegistrationRequest {
            name: "legacy".to_string(),
            probe_base_url: format!("{}/actuator", server.uri()),
            poll_interval_seconds: Some(300),
            auto_register: Some(false),
            ..RegistrationRequest::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(service.registration_source, RegistrationSource::Manual);
    assert_eq!(service.poll_interval_seconds, Some(300));
}

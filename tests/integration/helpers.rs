//! Helper functions for integration tests

use std::sync::Arc;
use std::time::Duration;

use fleetwatch::broadcast::LogBroadcaster;
use fleetwatch::collectors::{
    Dispatcher, health::HealthCollector, logger_config::LoggerConfigCollector, logs::LogsCollector,
    metrics::MetricsCollector,
};
use fleetwatch::discovery::{RegistrationRequest, register_direct};
use fleetwatch::model::ManagedService;
use fleetwatch::probe::{EndpointProbe, HttpProbe};
use fleetwatch::registry::{Registry, RegistryLimits};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// The full collection stack wired against a live HTTP probe
pub struct TestStack {
    pub registry: Registry,
    pub probe: Arc<dyn EndpointProbe>,
    pub dispatcher: Arc<Dispatcher>,
    pub broadcaster: LogBroadcaster,
}

pub fn test_stack() -> TestStack {
    let registry = Registry::new(RegistryLimits::default());
    let probe: Arc<dyn EndpointProbe> = Arc::new(HttpProbe::new(Duration::from_secs(2)));
    let broadcaster = LogBroadcaster::new();

    let dispatcher = Arc::new(
        Dispatcher::new(registry.clone())
            .with_collector(Arc::new(HealthCollector::new(probe.clone())))
            .with_collector(Arc::new(MetricsCollector::new(
                probe.clone(),
                registry.clone(),
            )))
            .with_collector(Arc::new(LogsCollector::new(
                probe.clone(),
                registry.clone(),
                broadcaster.clone(),
                100,
            )))
            .with_collector(Arc::new(LoggerConfigCollector::new(probe.clone()))),
    );

    TestStack {
        registry,
        probe,
        dispatcher,
        broadcaster,
    }
}

/// Register a service whose probe base URL points at the mock server
pub async fn register_against(
    stack: &TestStack,
    server: &MockServer,
    name: &str,
) -> ManagedService {
    register_direct(
        &stack.registry,
        stack.probe.as_ref(),
        RegistrationRequest {
            name: name.to_string(),
            probe_base_url: format!("{}/actuator", server.uri()),
            ..RegistrationRequest::default()
        },
    )
    .await
    .expect("registration should succeed")
}

/// Mount the actuator link document advertising the given endpoints
pub async fn mount_links(server: &MockServer, names: &[&str]) {
    let mut links = serde_json::Map::new();
    links.insert(
        "self".to_string(),
        serde_json::json!({ "href": format!("{}/actuator", server.uri()) }),
    );
    for name in names {
        links.insert(
            name.to_string(),
            serde_json::json!({ "href": format!("{}/actuator/{name}", server.uri()) }),
        );
    }

    Mock::given(method("GET"))
        .and(path("/actuator"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "_links": links })),
        )
        .mount(server)
        .await;
}

pub async fn mount_health(server: &MockServer, status: &str) {
    Mock::given(method("GET"))
        .and(path("/actuator/health"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": status })),
        )
        .mount(server)
        .await;
}

/// Empty metric catalog - the metrics collector records an all-zero sample
pub async fn mount_empty_metrics(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/actuator/metrics"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "names": [] })),
        )
        .mount(server)
        .await;
}

pub async fn mount_log_window(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/actuator/logfile"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
        .mount(server)
        .await;
}

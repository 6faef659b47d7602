//! Concurrency tests for the shared registry

use fleetwatch::model::{LogLevel, LogLine, RegistrationSource};
use fleetwatch::registry::{Registry, RegistryLimits, ServiceCandidate};

fn candidate(name: &str) -> ServiceCandidate {
    ServiceCandidate {
        external_id: Some(format!("ext-{name}")),
        name: name.to_string(),
        namespace: None,
        version: None,
        instance_name: None,
        probe_base_url: format!("http://{name}:8080/actuator"),
        registration_source: RegistrationSource::Direct,
        poll_interval_seconds: None,
    }
}

#[tokio::test]
async fn test_concurrent_upserts_get_unique_ids() {
    let registry = Registry::new(RegistryLimits::default());

    let mut handles = vec![];
    for i in 0..16 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry.upsert_service(candidate(&format!("svc-{i}"))).await
        }));
    }

    let mut ids = vec![];
    for handle in handles {
        ids.push(handle.await.unwrap().id);
    }

    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 16);
    assert_eq!(registry.list_services().await.len(), 16);
}

#[tokio::test]
async fn test_concurrent_upserts_of_same_service_dedupe() {
    let registry = Registry::new(RegistryLimits::default());

    let mut handles = vec![];
    for _ in 0..8 {
        let registry = registry.clone();
        handles.push(tokio::spawn(
            async move { registry.upsert_service(candidate("svc")).await },
        ));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(registry.list_services().await.len(), 1);
}

#[tokio::test]
async fn test_concurrent_log_appends_keep_ids_unique() {
    let registry = Registry::new(RegistryLimits::default());
    let service = registry.upsert_service(candidate("svc")).await;

    let mut handles = vec![];
    for batch in 0..8 {
        let registry = registry.clone();
        let service_id = service.id;
        handles.push(tokio::spawn(async move {
            let lines: Vec<LogLine> = (0..10)
                .map(|i| LogLine {
                    timestamp: chrono::Utc::now(),
                    level: LogLevel::Info,
                    message: format!("batch {batch} line {i}"),
                })
                .collect();
            registry.record_logs(service_id, lines).await.unwrap()
        }));
    }

    let mut ids = vec![];
    for handle in handles {
        for record in handle.await.unwrap() {
            ids.push(record.id);
        }
    }

    let count = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), count);
    assert_eq!(count, 80);
}

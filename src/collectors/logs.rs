//! Logs collector
//!
//! Fetches the service's log window as plain text, parses it line by line
//! and appends the new records to the registry, then hands exactly the new
//! batch to the broadcaster.
//!
//! ## Cursor
//!
//! The fetched window overlaps between polls (it's a tail of the same log
//! file), so the collector keeps a per-service cursor: the raw text of the
//! last ingested line. On the next poll only lines after the cursor are
//! ingested. If the cursor line is no longer in the window (rotation, long
//! gap) the collector falls back to the most recent `limit` lines.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use tokio::sync::RwLock;
use tracing::trace;

use crate::broadcast::LogBroadcaster;
use crate::model::{EndpointDescriptor, EndpointType, LogLevel, LogLine, ManagedService};
use crate::probe::EndpointProbe;
use crate::registry::Registry;

use super::{Collector, CollectorOutcome};

/// `TIMESTAMP LEVEL rest-of-line`
pub const LINE_PATTERN: &str =
    r"^(\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}(?:\.\d{1,9})?)\s+([A-Za-z]+)\s+(.*)$";

/// Parse one log line
///
/// Unmatched lines are not an error: they become INFO records carrying the
/// raw line as message, stamped with the current time.
pub fn parse_log_line(pattern: &Regex, raw: &str) -> LogLine {
    if let Some(captures) = pattern.captures(raw) {
        let timestamp = parse_timestamp(&captures[1]);
        let level = LogLevel::normalize(&captures[2]);
        let message = captures[3].to_string();

        if let Some(timestamp) = timestamp {
            return LogLine {
                timestamp,
                level,
                message,
            };
        }
    }

    LogLine {
        timestamp: Utc::now(),
        level: LogLevel::Info,
        message: raw.to_string(),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = raw.replacen('T', " ", 1);
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub struct LogsCollector {
    probe: Arc<dyn EndpointProbe>,
    registry: Registry,
    broadcaster: LogBroadcaster,
    /// Maximum lines ingested from one fetched window
    limit: usize,
    pattern: Regex,
    /// Raw text of the last ingested line, per service
    cursors: RwLock<HashMap<u64, String>>,
}

impl LogsCollector {
    pub fn new(
        probe: Arc<dyn EndpointProbe>,
        registry: Registry,
        broadcaster: LogBroadcaster,
        limit: usize,
    ) -> Self {
        Self {
            probe,
            registry,
            broadcaster,
            limit,
            pattern: Regex::new(LINE_PATTERN).expect("log line pattern must compile"),
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Slice the fetched window down to lines not yet ingested
    fn new_lines<'a>(&self, cursor: Option<&str>, lines: &[&'a str]) -> Vec<&'a str> {
        let fresh: Vec<&str> = match cursor {
            Some(cursor_line) => {
                match lines.iter().rposition(|line| *line == cursor_line) {
                    Some(position) => lines[position + 1..].to_vec(),
                    // Cursor fell out of the window - treat as a fresh tail
                    None => lines.to_vec(),
                }
            }
            None => lines.to_vec(),
        };

        let skip = fresh.len().saturating_sub(self.limit);
        fresh[skip..].to_vec()
    }
}

#[async_trait]
impl Collector for LogsCollector {
    fn endpoint_type(&self) -> EndpointType {
        EndpointType::Logs
    }

    async fn collect(
        &self,
        service: &ManagedService,
        descriptor: &EndpointDescriptor,
    ) -> anyhow::Result<CollectorOutcome> {
        let window = self.probe.fetch_log_window(&descriptor.href).await?;

        let lines: Vec<&str> = window.lines().filter(|line| !line.is_empty()).collect();
        if lines.is_empty() {
            // A quiet log is ambiguous - never a status signal
            return Ok(CollectorOutcome::NoChange);
        }

        let cursor = self.cursors.read().await.get(&service.id).cloned();
        let fresh = self.new_lines(cursor.as_deref(), &lines);
        if fresh.is_empty() {
            return Ok(CollectorOutcome::NoChange);
        }

        let parsed: Vec<LogLine> = fresh
            .iter()
            .map(|raw| parse_log_line(&self.pattern, raw))
            .collect();

        let appended = self.registry.record_logs(service.id, parsed).await?;

        trace!(
            "ingested {} log lines for {} ({})",
            appended.len(),
            service.name,
            service.id
        );

        if let Some(last) = fresh.last() {
            self.cursors
                .write()
                .await
                .insert(service.id, (*last).to_string());
        }

        // Push exactly the newly appended records, never the full history
        self.broadcaster.publish(service.id, &appended).await;

        Ok(CollectorOutcome::NoChange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RegistrationSource, ServiceStatus};
    use crate::probe::HttpProbe;
    use crate::registry::{RegistryLimits, ServiceCandidate};
    use chrono::TimeZone;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pattern() -> Regex {
        Regex::new(LINE_PATTERN).unwrap()
    }

    #[test]
    fn test_parse_well_formed_line() {
        let line = parse_log_line(&pattern(), "2025-05-03 10:15:32.789 INFO  [main] started");

        assert_eq!(line.level, LogLevel::Info);
        assert_eq!(line.message, "[main] started");
        assert_eq!(
            line.timestamp,
            Utc.with_ymd_and_hms(2025, 5, 3, 10, 15, 32).unwrap()
                + chrono::Duration::milliseconds(789)
        );
    }

    #[test]
    fn test_parse_garbage_line() {
        let line = parse_log_line(&pattern(), "garbage line");
        assert_eq!(line.level, LogLevel::Info);
        assert_eq!(line.message, "garbage line");
    }

    #[test]
    fn test_parse_level_variants() {
        let warn = parse_log_line(&pattern(), "2025-05-03T10:15:32 WARN [worker-2] low disk");
        assert_eq!(warn.level, LogLevel::Warning);
        assert_eq!(warn.message, "[worker-2] low disk");

        let odd = parse_log_line(&pattern(), "2025-05-03 10:15:32 NOTICE [main] odd level");
        assert_eq!(odd.level, LogLevel::Info);
    }

    async fn setup(
        server_uri: &str,
        limit: usize,
    ) -> (Registry, LogBroadcaster, LogsCollector, ManagedService) {
        let registry = Registry::new(RegistryLimits::default());
        let broadcaster = LogBroadcaster::new();
        let service = registry
            .upsert_service(ServiceCandidate {
                external_id: Some("svc-ext".to_string()),
                name: "svc".to_string(),
                namespace: None,
                version: None,
                instance_name: None,
                probe_base_url: server_uri.to_string(),
                registration_source: RegistrationSource::Direct,
                poll_interval_seconds: None,
            })
            .await;

        let collector = LogsCollector::new(
            Arc::new(HttpProbe::new(Duration::from_secs(2))),
            registry.clone(),
            broadcaster.clone(),
            limit,
        );

        (registry, broadcaster, collector, service)
    }

    fn descriptor(href: String) -> EndpointDescriptor {
        EndpointDescriptor {
            endpoint_type: EndpointType::Logs,
            href,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_overlapping_windows_are_not_reingested() {
        let server = MockServer::start().await;
        let window_one = "2025-05-03 10:00:00 INFO [main] one\n2025-05-03 10:00:01 INFO [main] two\n";
        Mock::given(method("GET"))
            .and(path("/actuator/logfile"))
            .respond_with(ResponseTemplate::new(200).set_body_string(window_one))
            .mount(&server)
            .await;

        let (registry, _broadcaster, collector, service) = setup(&server.uri(), 100).await;
        let href = format!("{}/actuator/logfile", server.uri());

        collector
            .collect(&service, &descriptor(href.clone()))
            .await
            .unwrap();
        assert_eq!(registry.recent_logs(service.id, 10).await.unwrap().len(), 2);

        // Same tail plus one new line
        server.reset().await;
        let window_two = format!("{window_one}2025-05-03 10:00:02 INFO [main] three\n");
        Mock::given(method("GET"))
            .and(path("/actuator/logfile"))
            .respond_with(ResponseTemplate::new(200).set_body_string(window_two))
            .mount(&server)
            .await;

        let outcome = collector
            .collect(&service, &descriptor(href.clone()))
            .await
            .unwrap();
        assert_eq!(outcome, CollectorOutcome::NoChange);

        let logs = registry.recent_logs(service.id, 10).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].message, "[main] three");

        // Unchanged window: nothing new
        collector
            .collect(&service, &descriptor(href))
            .await
            .unwrap();
        assert_eq!(registry.recent_logs(service.id, 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_window_is_bounded_to_limit() {
        let server = MockServer::start().await;
        let window: String = (0..10)
            .map(|i| format!("2025-05-03 10:00:{i:02} INFO [main] line {i}\n"))
            .collect();
        Mock::given(method("GET"))
            .and(path("/actuator/logfile"))
            .respond_with(ResponseTemplate::new(200).set_body_string(window))
            .mount(&server)
            .await;

        let (registry, _broadcaster, collector, service) = setup(&server.uri(), 3).await;

        collector
            .collect(
                &service,
                &descriptor(format!("{}/actuator/logfile", server.uri())),
            )
            .await
            .unwrap();

        let logs = registry.recent_logs(service.id, 10).await.unwrap();
        assert_eq!(logs.len(), 3);
        // The most recent lines of the window survive
        assert_eq!(logs[0].message, "[main] line 9");
    }

    #[tokio::test]
    async fn test_new_records_are_broadcast() {
        use crate::broadcast::{LogSink, SinkError};
        use crate::model::LogRecord;
        use std::sync::Mutex;

        struct CountingSink(Mutex<Vec<usize>>);

        #[async_trait]
        impl LogSink for CountingSink {
            async fn send_logs(
                &self,
                _service_id: u64,
                records: &[LogRecord],
            ) -> Result<(), SinkError> {
                self.0.lock().unwrap().push(records.len());
                Ok(())
            }
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/actuator/logfile"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("2025-05-03 10:00:00 ERROR [main] boom\n"),
            )
            .mount(&server)
            .await;

        let (_registry, broadcaster, collector, service) = setup(&server.uri(), 100).await;

        let sink = Arc::new(CountingSink(Mutex::new(Vec::new())));
        let connection = broadcaster.register(sink.clone()).await;
        broadcaster.subscribe(connection, service.id).await;

        collector
            .collect(
                &service,
                &descriptor(format!("{}/actuator/logfile", server.uri())),
            )
            .await
            .unwrap();

        assert_eq!(*sink.0.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_empty_window_is_no_change() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/actuator/logfile"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;

        let (registry, _broadcaster, collector, service) = setup(&server.uri(), 100).await;

        let outcome = collector
            .collect(
                &service,
                &descriptor(format!("{}/actuator/logfile", server.uri())),
            )
            .await
            .unwrap();

        assert_eq!(outcome, CollectorOutcome::NoChange);
        let stored = registry.get_service(service.id).await.unwrap();
        assert_eq!(stored.status, ServiceStatus::Unknown);
    }

    #[tokio::test]
    async fn test_http_failure_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/actuator/logfile"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (_registry, _broadcaster, collector, service) = setup(&server.uri(), 100).await;

        let result = collector
            .collect(
                &service,
                &descriptor(format!("{}/actuator/logfile", server.uri())),
            )
            .await;

        assert!(result.is_err());
    }
}

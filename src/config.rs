use tracing::trace;

/// Default relative paths of the introspection endpoints
///
/// Used when a discovered instance carries no path annotation and a direct
/// registration supplies no explicit paths.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProbePaths {
    #[serde(default = "default_health_path")]
    pub health: String,
    #[serde(default = "default_metrics_path")]
    pub metrics: String,
    #[serde(default = "default_logs_path")]
    pub logs: String,
    #[serde(default = "default_loggers_path")]
    pub loggers: String,
}

impl Default for ProbePaths {
    fn default() -> Self {
        Self {
            health: default_health_path(),
            metrics: default_metrics_path(),
            logs: default_logs_path(),
            loggers: default_loggers_path(),
        }
    }
}

fn default_health_path() -> String {
    "/actuator/health".to_string()
}

fn default_metrics_path() -> String {
    "/actuator/metrics".to_string()
}

fn default_logs_path() -> String {
    "/actuator/logfile".to_string()
}

fn default_loggers_path() -> String {
    "/actuator/loggers".to_string()
}

/// Optional per-capability probe timeouts, in seconds
///
/// Each unset field falls back to `probe_timeout_seconds`.
#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
pub struct ProbeTimeoutsConfig {
    pub health: Option<u64>,
    pub metrics: Option<u64>,
    pub logs: Option<u64>,
    pub loggers: Option<u64>,
}

impl ProbeTimeoutsConfig {
    pub fn durations(&self) -> crate::probe::ProbeTimeouts {
        crate::probe::ProbeTimeouts {
            health: self.health.map(std::time::Duration::from_secs),
            metrics: self.metrics.map(std::time::Duration::from_secs),
            logs: self.logs.map(std::time::Duration::from_secs),
            loggers: self.loggers.map(std::time::Duration::from_secs),
        }
    }
}

/// A service seeded from the config file (registered as Manual at startup)
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SeedServiceConfig {
    pub name: String,
    pub probe_base_url: String,
    pub external_id: Option<String>,
    pub poll_interval_seconds: Option<u64>,
    /// Explicit endpoint paths; hypermedia discovery when absent
    pub paths: Option<ProbePaths>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Seconds between orchestrator inventory scans
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_seconds: u64,

    /// Seconds between collection ticks
    #[serde(default = "default_collection_interval")]
    pub collection_interval_seconds: u64,

    /// Timeout applied to every probe fetch unless overridden per capability
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,

    /// Per-capability overrides of `probe_timeout_seconds`
    #[serde(default)]
    pub probe_timeouts: ProbeTimeoutsConfig,

    /// A service is due for polling once its last_seen is older than this
    #[serde(default = "default_max_poll_age")]
    pub max_poll_age_seconds: u64,

    /// Services known DOWN are not re-polled before this window elapses
    #[serde(default = "default_down_backoff")]
    pub down_backoff_seconds: u64,

    /// Metric samples retained per service (ring buffer)
    #[serde(default = "default_recent_metric_limit")]
    pub recent_metric_limit: usize,

    /// Log records retained per service (ring buffer), also the maximum
    /// number of lines ingested from one fetched log window
    #[serde(default = "default_recent_log_limit")]
    pub recent_log_limit: usize,

    /// Probe port used when a discovered instance has no port annotation
    #[serde(default = "default_probe_port")]
    pub default_probe_port: u16,

    #[serde(default)]
    pub paths: ProbePaths,

    /// Services to register at startup
    pub services: Option<Vec<SeedServiceConfig>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_interval_seconds: default_discovery_interval(),
            collection_interval_seconds: default_collection_interval(),
            probe_timeout_seconds: default_probe_timeout(),
            probe_timeouts: ProbeTimeoutsConfig::default(),
            max_poll_age_seconds: default_max_poll_age(),
            down_backoff_seconds: default_down_backoff(),
            recent_metric_limit: default_recent_metric_limit(),
            recent_log_limit: default_recent_log_limit(),
            default_probe_port: default_probe_port(),
            paths: ProbePaths::default(),
            services: None,
        }
    }
}

fn default_discovery_interval() -> u64 {
    60
}

fn default_collection_interval() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_max_poll_age() -> u64 {
    60
}

fn default_down_backoff() -> u64 {
    120
}

fn default_recent_metric_limit() -> usize {
    500
}

fn default_recent_log_limit() -> usize {
    300
}

fn default_probe_port() -> u16 {
    8080
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

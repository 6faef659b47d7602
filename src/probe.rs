//! Outbound introspection probes
//!
//! [`EndpointProbe`] is the capability the collectors and discovery use to
//! talk to a managed service. The live implementation ([`HttpProbe`]) wraps
//! a single reqwest client with a bounded timeout; tests substitute their
//! own implementation or point the live one at a wiremock server.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

/// Result type alias for probe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors talking to a managed service
///
/// A timeout is deliberately indistinguishable from any other transport
/// failure for status derivation purposes; it only gets its own variant so
/// logs can tell the two apart.
#[derive(Debug)]
pub enum ProbeError {
    /// Connection refused, DNS failure, broken pipe, ...
    Transport(String),

    /// The bounded per-fetch timeout elapsed
    Timeout,

    /// Non-2xx response
    Status(u16),

    /// Response body was not what we expected
    Parse(String),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Transport(msg) => write!(f, "probe transport failure: {}", msg),
            ProbeError::Timeout => write!(f, "probe timed out"),
            ProbeError::Status(code) => write!(f, "probe returned HTTP {}", code),
            ProbeError::Parse(msg) => write!(f, "probe response unparseable: {}", msg),
        }
    }
}

impl std::error::Error for ProbeError {}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::Timeout
        } else if err.is_decode() {
            ProbeError::Parse(err.to_string())
        } else {
            ProbeError::Transport(err.to_string())
        }
    }
}

/// Capability for fetching introspection data from a managed service
#[async_trait]
pub trait EndpointProbe: Send + Sync {
    /// GET the probe base URL and return the advertised links
    /// (`{"_links": {name: {"href": ...}}}`), minus the self link
    async fn fetch_links(&self, base_url: &str) -> ProbeResult<HashMap<String, String>>;

    /// GET the health document
    async fn fetch_health(&self, url: &str) -> ProbeResult<Value>;

    /// GET the metric catalog (`{"names": [...]}`)
    async fn fetch_metric_names(&self, url: &str) -> ProbeResult<Vec<String>>;

    /// GET one named metric; `selector` may carry a query string
    /// (e.g. `jvm.memory.used` or `http.server.requests?tag=status:500`)
    async fn fetch_metric(&self, url: &str, selector: &str) -> ProbeResult<Value>;

    /// GET the current log window as plain text
    async fn fetch_log_window(&self, url: &str) -> ProbeResult<String>;

    /// GET the logger configuration document
    async fn fetch_loggers(&self, url: &str) -> ProbeResult<Value>;

    /// POST a level change for one logger
    async fn set_logger_level(&self, url: &str, logger: &str, level: &str) -> ProbeResult<()>;
}

/// Per-capability timeout overrides
///
/// An unset field falls back to the client-wide timeout. Log windows tend to
/// need a looser bound than a health ping; this is where that goes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeTimeouts {
    pub health: Option<Duration>,
    pub metrics: Option<Duration>,
    pub logs: Option<Duration>,
    pub loggers: Option<Duration>,
}

/// Live HTTP probe
///
/// The client is reused across requests; every fetch carries the configured
/// timeout (per capability where overridden), and a timeout maps to
/// [`ProbeError::Timeout`].
pub struct HttpProbe {
    client: reqwest::Client,
    timeouts: ProbeTimeouts,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self::with_timeouts(timeout, ProbeTimeouts::default())
    }

    pub fn with_timeouts(default_timeout: Duration, timeouts: ProbeTimeouts) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(default_timeout)
                .build()
                .expect("Failed to build HTTP client"),
            timeouts,
        }
    }

    async fn get_json(&self, url: &str, timeout: Option<Duration>) -> ProbeResult<Value> {
        trace!("GET {url}");
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ProbeError::Parse(e.to_string()))
    }
}

#[async_trait]
impl EndpointProbe for HttpProbe {
    async fn fetch_links(&self, base_url: &str) -> ProbeResult<HashMap<String, String>> {
        let document = self.get_json(base_url, None).await?;

        let links = document
            .get("_links")
            .and_then(|value| value.as_object())
            .ok_or_else(|| ProbeError::Parse("missing _links object".to_string()))?;

        let mut resolved = HashMap::new();
        for (name, link) in links {
            if name == "self" {
                continue;
            }
            if let Some(href) = link.get("href").and_then(|value| value.as_str()) {
                resolved.insert(name.clone(), href.to_string());
            }
        }

        Ok(resolved)
    }

    async fn fetch_health(&self, url: &str) -> ProbeResult<Value> {
        self.get_json(url, self.timeouts.health).await
    }

    async fn fetch_metric_names(&self, url: &str) -> ProbeResult<Vec<String>> {
        let document = self.get_json(url, self.timeouts.metrics).await?;

        let names = document
            .get("names")
            .and_then(|value| value.as_array())
            .ok_or_else(|| ProbeError::Parse("missing names array".to_string()))?;

        Ok(names
            .iter()
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect())
    }

    async fn fetch_metric(&self, url: &str, selector: &str) -> ProbeResult<Value> {
        self.get_json(&format!("{url}/{selector}"), self.timeouts.metrics)
            .await
    }

    async fn fetch_log_window(&self, url: &str) -> ProbeResult<String> {
        trace!("GET {url}");
        let mut request = self.client.get(url);
        if let Some(timeout) = self.timeouts.logs {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }

    async fn fetch_loggers(&self, url: &str) -> ProbeResult<Value> {
        self.get_json(url, self.timeouts.loggers).await
    }

    async fn set_logger_level(&self, url: &str, logger: &str, level: &str) -> ProbeResult<()> {
        let target = format!("{url}/{logger}");
        trace!("POST {target}");

        let mut request = self
            .client
            .post(&target)
            .json(&serde_json::json!({ "configuredLevel": level }));
        if let Some(timeout) = self.timeouts.loggers {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        Ok(())
    }
}

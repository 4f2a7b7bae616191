use std::time::Duration;

use quarry_api::Error;
use serde::Deserialize;

use crate::backoff::Backoff;

/// Client configuration, parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the REST API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Project that owns submitted jobs.
    pub project_id: String,

    /// Default job location (e.g. `US`, `europe-west1`).
    #[serde(default)]
    pub location: Option<String>,

    /// OAuth bearer token. Obtaining and refreshing it is up to the caller.
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Job status polling.
    #[serde(default)]
    pub poll: PollConfig,

    /// How long the service may hold a fast-path query before answering
    /// with a job reference instead of results.
    #[serde(default = "default_fast_path_timeout_ms")]
    pub fast_path_timeout_ms: u64,

    /// Rows per result page. The service default applies when unset.
    #[serde(default)]
    pub page_size: Option<u32>,

    /// Rows per streaming insert request.
    #[serde(default = "default_max_rows_per_request")]
    pub max_rows_per_request: usize,
}

fn default_endpoint() -> String {
    "https://bigquery.googleapis.com/bigquery/v2".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_fast_path_timeout_ms() -> u64 {
    10_000
}

fn default_max_rows_per_request() -> usize {
    500
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_initial_interval_ms() -> u64 {
    1_000
}

fn default_max_interval_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.5
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl PollConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            initial: Duration::from_millis(self.initial_interval_ms),
            max: Duration::from_millis(self.max_interval_ms),
            multiplier: self.multiplier,
            jitter: self.jitter,
        }
    }
}

/// Runtime knobs of a [`Client`](crate::Client), independent of transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    pub backoff: Backoff,
    pub fast_path_timeout: Duration,
    pub page_size: Option<u32>,
    pub max_rows_per_request: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            fast_path_timeout: Duration::from_millis(default_fast_path_timeout_ms()),
            page_size: None,
            max_rows_per_request: default_max_rows_per_request(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, Error> {
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::Config(format!("{path}: {e}")))?;
        Self::parse(&content).map_err(|e| e.with_context(path))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(toml_str).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.project_id.is_empty() {
            return Err(Error::Config("project_id must not be empty".into()));
        }
        if self.max_rows_per_request == 0 {
            return Err(Error::Config("max_rows_per_request must be positive".into()));
        }
        if self.poll.initial_interval_ms > self.poll.max_interval_ms {
            return Err(Error::Config(
                "poll.initial_interval_ms exceeds poll.max_interval_ms".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.poll.jitter) {
            return Err(Error::Config("poll.jitter must be within [0, 1]".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn options(&self) -> ClientOptions {
        ClientOptions {
            backoff: self.poll.backoff(),
            fast_path_timeout: Duration::from_millis(self.fast_path_timeout_ms),
            page_size: self.page_size,
            max_rows_per_request: self.max_rows_per_request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn minimal_config_takes_defaults() {
        let config = ClientConfig::parse(r#"project_id = "acme""#).unwrap();
        assert_eq!(config.endpoint, "https://bigquery.googleapis.com/bigquery/v2");
        assert_eq!(config.location, None);
        assert_eq!(config.poll, PollConfig::default());
        assert_eq!(config.options(), ClientOptions::default());
    }

    #[test]
    fn full_config() {
        let config = ClientConfig::parse(
            r#"
            endpoint = "http://localhost:9050"
            project_id = "acme"
            location = "EU"
            access_token = "t0ken"
            request_timeout_secs = 5
            accept_invalid_certs = true
            fast_path_timeout_ms = 2500
            page_size = 1000
            max_rows_per_request = 50

            [poll]
            initial_interval_ms = 100
            max_interval_ms = 800
            multiplier = 1.5
            jitter = 0.0
            "#,
        )
        .unwrap();

        let options = config.options();
        assert_eq!(config.location.as_deref(), Some("EU"));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(options.backoff.initial, Duration::from_millis(100));
        assert_eq!(options.backoff.max, Duration::from_millis(800));
        assert_eq!(options.fast_path_timeout, Duration::from_millis(2500));
        assert_eq!(options.page_size, Some(1000));
        assert_eq!(options.max_rows_per_request, 50);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(matches!(ClientConfig::parse(""), Err(Error::Config(_))));
        assert!(matches!(
            ClientConfig::parse("project_id = \"a\"\nmax_rows_per_request = 0"),
            Err(Error::Config(msg)) if msg.contains("max_rows_per_request")
        ));
        assert!(matches!(
            ClientConfig::parse("project_id = \"a\"\n[poll]\njitter = 2.0"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn load_reports_the_path() {
        let err = ClientConfig::load("/nonexistent/quarry.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/quarry.toml"));
    }
}

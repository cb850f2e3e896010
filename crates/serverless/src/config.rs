use common::{ConfigError, Environment, optional_var, parse_var};
use std::env;
use std::time::Duration;

pub const DEFAULT_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_FETCH_TIMEOUT_SECS: f64 = 10.0;
pub const DEFAULT_FETCH_MAX_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerlessConfig {
    pub environment: Environment,
    pub addr: String,
    pub fetch_timeout: Duration,
    pub fetch_max_bytes: usize,
    pub otel_endpoint: Option<String>,
}

impl ServerlessConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let environment = optional_var(&lookup, "ENVIRONMENT")
            .map(|v| Environment::parse(&v))
            .unwrap_or(Environment::Development);

        let addr =
            optional_var(&lookup, "SERVERLESS_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());

        let timeout_secs: f64 =
            parse_var(&lookup, "IMAGE_FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?;
        let fetch_timeout =
            Duration::try_from_secs_f64(timeout_secs).map_err(|e| ConfigError::InvalidValue {
                key: "IMAGE_FETCH_TIMEOUT_SECS",
                value: timeout_secs.to_string(),
                reason: e.to_string(),
            })?;

        let fetch_max_bytes =
            parse_var(&lookup, "IMAGE_FETCH_MAX_BYTES", DEFAULT_FETCH_MAX_BYTES)?;

        let otel_endpoint = optional_var(&lookup, "OTEL_EXPORTER_OTLP_ENDPOINT");

        Ok(Self {
            environment,
            addr,
            fetch_timeout,
            fetch_max_bytes,
            otel_endpoint,
        })
    }
}

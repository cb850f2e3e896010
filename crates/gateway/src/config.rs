use common::{ConfigError, Environment, optional_var, parse_var};
use std::env;

pub const DEFAULT_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub environment: Environment,
    pub addr: String,
    pub max_upload_bytes: usize,
    pub otel_endpoint: Option<String>,
}

impl GatewayConfig {
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

        let addr = optional_var(&lookup, "GATEWAY_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());

        let max_upload_bytes =
            parse_var(&lookup, "GATEWAY_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;

        let otel_endpoint = optional_var(&lookup, "OTEL_EXPORTER_OTLP_ENDPOINT");

        Ok(Self {
            environment,
            addr,
            max_upload_bytes,
            otel_endpoint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.addr, "0.0.0.0:8000");
        assert_eq!(config.max_upload_bytes, 20 * 1024 * 1024);
        assert!(config.otel_endpoint.is_none());
    }

    #[test]
    fn test_overrides_and_bad_numbers() {
        let config = GatewayConfig::from_lookup(|key| match key {
            "ENVIRONMENT" => Some("prod".into()),
            "GATEWAY_ADDR" => Some("127.0.0.1:9000".into()),
            "OTEL_EXPORTER_OTLP_ENDPOINT" => Some("http://collector:4317".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.addr, "127.0.0.1:9000");
        assert_eq!(config.otel_endpoint.as_deref(), Some("http://collector:4317"));

        let err = GatewayConfig::from_lookup(|key| {
            (key == "GATEWAY_MAX_UPLOAD_BYTES").then(|| "20MB".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("GATEWAY_MAX_UPLOAD_BYTES"));
    }
}

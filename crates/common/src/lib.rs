pub mod config;
pub mod logging;
pub mod telemetry;

pub use config::{ConfigError, Environment, optional_var, parse_var};
pub use logging::setup_logging;
pub use telemetry::TelemetryGuard;

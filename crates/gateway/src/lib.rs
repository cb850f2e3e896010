pub mod config;
pub mod errors;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use errors::ApiError;
pub use routes::create_app;
pub use state::AppState;

pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::PredictError;
pub use routes::{PredictResponse, router};
pub use state::AppState;

//! HTTP prediction service for the penguin species classifier
//!
//! Loads a validated model once at startup and serves it read-only to every
//! request handler.

pub mod config;
pub mod errors;
pub mod metrics;
pub mod server;
pub mod startup;

pub use config::{ConfigManager, Environment, PredictionSettings, ServerSettings, ServiceConfig};
pub use errors::ServiceError;
pub use metrics::{MetricsCollector, MetricsSnapshot, RequestOutcome};
pub use server::{build_router, AppState, ErrorResponse, HealthResponse, PredictResponse};
pub use startup::{bind_listener, load_model, prepare_state, run};

pub mod account;
pub mod algorithms;
pub mod clock;
pub mod config;
pub mod config_validator;
pub mod directory;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod health;
pub mod key_generator;
pub mod metrics;
pub mod middleware;
pub mod redis;
pub mod response;
pub mod server;
pub mod service;
pub mod usage;
pub mod validation;

pub use config::Config;
pub use error::{KeygateError, Result};
pub use gate::{AuthorizationDecision, AuthorizationGate, GateConfig};
pub use server::{build_components, create_app};
pub use service::RateLimitedService;

//! # Engrama HTTP service
//!
//! The request surface over the memory engine and channel manager.
//!
//! Every request traverses a fixed admission chain: public-path bypass →
//! sliding-window rate limit → admin-token gate (channel management) or
//! API-key authentication (memory operations) → scope resolution. Only
//! then does a handler run, and it only ever sees the resolved scope.

pub mod config;
pub mod error;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod state;

pub use config::EngramaConfig;
pub use error::ApiError;
pub use rate_limit::{LimiterDecision, RateLimiter};
pub use server::build_app;
pub use state::AppState;

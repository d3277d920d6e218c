//! Shared application state

use std::sync::Arc;

use engrama_memory::MemoryEngine;
use engrama_tenancy::ChannelManager;

use crate::config::EngramaConfig;
use crate::rate_limit::RateLimiter;

/// State threaded through every handler and the admission middleware.
#[derive(Clone)]
pub struct AppState {
    /// Dual-store memory engine
    pub engine: Arc<MemoryEngine>,
    /// Tenant / project / key lifecycle
    pub channels: Arc<ChannelManager>,
    /// Sliding-window limiter
    pub limiter: Arc<RateLimiter>,
    /// Read-only process configuration
    pub config: Arc<EngramaConfig>,
}

//! # Core types for Engrama
//!
//! Domain model shared by every Engrama crate:
//! - **Channel identity**: [`Tenant`] → [`Project`] → [`ApiKey`] (optionally
//!   bound to an end user)
//! - **Memory**: [`MemoryFragment`] with its [`MemoryType`] / [`Role`] labels
//! - **Scoping**: the [`MemoryScope`] triple and the key/request
//!   [`scope::resolve_user_id`] fusion rule
//! - **Errors**: the [`EngramaError`] taxonomy every surface maps from
//!
//! All memory operations are bound to a `(tenant_id, project_id, user_id)`
//! triple; no operation may cross it.

pub mod error;
pub mod limits;
pub mod scope;
pub mod types;

// Re-exports for convenience
pub use error::{EngramaError, Result};
pub use scope::MemoryScope;
pub use types::{
    ApiKey, ApiKeyListing, MemoryFragment, MemoryType, MintedApiKey, Project, Role, Tenant,
};

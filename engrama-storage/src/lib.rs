//! # Storage backends for Engrama
//!
//! Two stores, two roles:
//! - [`meta`]: the authoritative relational record of tenants, projects,
//!   API keys, and memory fragments (SQLite behind the [`meta::MetaStore`]
//!   trait).
//! - [`vector`]: the approximate-nearest-neighbor index keyed by fragment
//!   id, holding only what filtering and ranking need (Qdrant behind the
//!   [`vector::VectorIndex`] trait, plus an in-memory backend for tests).
//!
//! The memory engine keeps the two in sync; for every id retrievable from
//! the vector index, the matching row must exist in the metadata store.

pub mod meta;
pub mod vector;

// Re-exports for convenience
pub use meta::{FragmentPatch, MetaStore, SqliteMetaStore, UserStats};
pub use vector::{
    InMemoryIndex, PointFilter, PointPayload, QdrantIndex, ScoredPoint, StoredPoint, VectorIndex,
    VectorPoint,
};

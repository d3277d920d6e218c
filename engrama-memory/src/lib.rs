//! # Memory engine for Engrama
//!
//! The dual-store protocol lives here. Writes go to the authoritative
//! metadata store first, then to the vector index; a secondary failure is
//! compensated by deleting the metadata row, and queries tolerate orphan
//! vector points by dropping anything the metadata store cannot hydrate.
//! The steady state converges to the invariant: vector contents ⊆ metadata
//! contents.
//!
//! ```text
//! MemoryEngine
//! ├── MetaStore      (authoritative rows, counters, stats)
//! ├── VectorIndex    (ranking and filtered enumeration)
//! └── EmbeddingProvider (text → fixed-dimension vector)
//! ```

pub mod embeddings;
pub mod engine;

// Re-exports for convenience
pub use embeddings::{EmbeddingProvider, HttpEmbeddingProvider, MockEmbeddingProvider};
pub use engine::{ChatMessage, MemoryEngine, NewFragment, ScoredFragment, UpdateFields};

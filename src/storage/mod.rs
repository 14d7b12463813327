//! Storage backends
//!
//! The graph store and vector index are separate traits so each side of the
//! dual store can be swapped independently: in-memory for tests, SQLite for
//! persistence, sqlite-vec for KNN search with the `embeddings` feature.

mod memory;
mod sqlite;
mod sqlite_vec;
mod sqlite_vectors;
mod traits;

pub use memory::{InMemoryGraphStore, InMemoryVectorIndex};
pub use sqlite::SqliteGraphStore;
pub use sqlite_vectors::SqliteVectorIndex;
pub use traits::{
    GraphStore, OpenStore, StorageError, StorageResult, VectorFilter, VectorIndex, VectorMatch,
    VectorMetadata,
};

#[cfg(feature = "embeddings")]
pub use sqlite_vec::SqliteVecIndex;

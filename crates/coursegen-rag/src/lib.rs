//! RAG Context Builder: for a lesson spec, fetch top-K chunks per
//! section from the vector store, merge and de-duplicate by chunk id,
//! rank by relevance with an explicit tie-break, and trim to the
//! section's `expected_chunks`.

mod builder;
mod error;
mod memory;
mod merge;
#[cfg(feature = "database")]
mod postgres;
mod port;

pub use builder::RagContextBuilder;
pub use error::RagError;
pub use memory::MemoryVectorStore;
pub use merge::merge_and_rank;
#[cfg(feature = "database")]
pub use postgres::{PgVectorStore, QueryEmbedder};
pub use port::VectorStore;

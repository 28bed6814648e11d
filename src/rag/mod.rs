//! Retrieval over the configured vector indexes.
//!
//! - `Embedder`: turns the search query into a dense vector
//! - `MultiSourceRetriever`: parallel, per-source isolated similarity search
//! - `ContextAssembler`: labels matches and renders prompt context blocks

pub mod context_builder;
pub mod embedder;
pub mod index;
pub mod retriever;
pub mod types;

pub use context_builder::{ContextAssembler, ContextBuilderConfig, RenderedContext, NO_CONTEXT_MARKER};
pub use embedder::Embedder;
pub use index::{PineconeIndex, VectorIndex};
pub use retriever::{MultiSourceRetriever, SourceBinding};
pub use types::{ContextBundle, RawMatch, RetrievedChunk, SourceName};

//! Retrieval-augmented generation building blocks.
//!
//! - `splitter`: recursive character chunking
//! - `embedding`: embedding providers
//! - `index`: flat L2 vector index
//! - `rewrite`: standalone-question rewriting
//! - `reranker`: cross-encoder re-ranking
//! - `prompts`: prompt templates

pub mod embedding;
pub mod index;
pub mod prompts;
pub mod reranker;
pub mod rewrite;
pub mod splitter;

pub use embedding::{build_embedder, EmbeddingProvider, HashingEmbedder, OpenAiEmbeddings};
pub use index::{IndexSnapshot, SearchHit, VectorIndex};
pub use reranker::{
    build_reranker, select_top, CrossEncoder, HttpCrossEncoder, LexicalCrossEncoder, RankedChunk,
};
pub use rewrite::rewrite_query;
pub use splitter::{SplitterConfig, TextSplitter};

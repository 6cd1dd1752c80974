//! Knowledge layer for ragchart.
//!
//! Documents live in a vector collection (SQLite or in-memory). A question is
//! answered by retrieving the nearest documents above a similarity floor,
//! formatting them into a bounded context, and asking the model for a grounded
//! answer:
//!
//! ```text
//! question -> Retriever -> ContextAssembler -> AnswerSynthesizer -> answer
//! ```
//!
//! [`AnswerPipeline`] wires the three together and applies the refusal policy.

pub mod context;
pub mod document;
pub mod embeddings;
pub mod loader;
pub mod memory_index;
pub mod pipeline;
pub mod progress;
pub mod retriever;
pub mod sqlite_index;
pub mod synthesizer;
pub mod vector_index;

#[cfg(test)]
mod testing;

pub use context::ContextAssembler;
pub use document::{Document, ScoredDocument};
pub use embeddings::{create_provider, EmbeddingProvider};
pub use loader::{load_documents, load_file, LoadOptions, LoadStats};
pub use memory_index::MemoryIndex;
pub use pipeline::{AnswerPipeline, AskOutcome};
pub use progress::{ProgressEvent, ProgressReporter};
pub use retriever::Retriever;
pub use sqlite_index::SqliteIndex;
pub use synthesizer::{Answer, AnswerSynthesizer};
pub use vector_index::{open_index, IndexStats, VectorIndex};

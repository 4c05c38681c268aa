pub mod cache;
pub mod chunking;
pub mod clock;
pub mod composer;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod rate_limit;

pub use cache::BoundedCache;
pub use chunking::{
    chunk_words, normalize_whitespace, Chunk, Chunker, ChunkingConfig, RegexTokenizer, Tokenizer,
    WhitespaceTokenizer,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use composer::ResponseComposer;
pub use embeddings::{
    Embedder, HashedNgramEmbedder, HttpEmbedder, HttpEmbedderConfig, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{ComposeError, EmbedError, ErrorKind, IndexError, IngestError, PipelineError};
pub use index::{cosine_similarity, VectorIndex};
pub use loader::{load_document, DocumentFormat, LoadedDocument};
pub use models::{
    AnswerPayload, AnswerStatus, ChunkMetadata, ComposedResponse, DocumentInfo, IngestionReport,
    PipelineConfig, SearchHit, SearchParams, INVALID_QUERY_EMBEDDING, NO_RELEVANT_DOCUMENTS,
};
pub use pipeline::Pipeline;
pub use rate_limit::RateLimiter;

use std::time::Duration;
use thiserror::Error;

/// Coarse failure categories shared by every component error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Capacity,
    Mismatch,
    NotFound,
    Internal,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File '{0}' not found.")]
    FileNotFound(String),

    #[error("Unsupported file format. Use TXT or PDF.")]
    UnsupportedFormat(String),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("{0}")]
    EmptyContent(String),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileNotFound(_) => ErrorKind::NotFound,
            Self::Io(_) | Self::Tokenization(_) => ErrorKind::Internal,
            Self::UnsupportedFormat(_)
            | Self::PdfParse(_)
            | Self::EmptyContent(_)
            | Self::InvalidChunkConfig(_) => ErrorKind::Validation,
        }
    }
}

impl From<regex::Error> for IngestError {
    fn from(value: regex::Error) -> Self {
        Self::Tokenization(value.to_string())
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Embeddings and metadata cannot be empty.")]
    EmptyBatch,

    #[error("The number of embeddings ({vectors}) must match the number of metadata entries ({metadata}).")]
    CountMismatch { vectors: usize, metadata: usize },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid query embedding: {0}")]
    InvalidQuery(String),

    #[error("No embeddings found in the vector index.")]
    EmptyIndex,

    #[error("No relevant documents found.")]
    NoMatches,
}

impl IndexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyBatch | Self::InvalidQuery(_) => ErrorKind::Validation,
            Self::CountMismatch { .. } | Self::DimensionMismatch { .. } => ErrorKind::Mismatch,
            Self::EmptyIndex | Self::NoMatches => ErrorKind::NotFound,
        }
    }
}

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Query cannot be empty.")]
    EmptyPrompt,

    #[error("No relevant context found.")]
    EmptyContext,

    #[error("Rate limit exceeded. Please wait {:.2} seconds.", .remaining.as_secs_f64())]
    RateLimited { remaining: Duration },

    #[error("An internal error occurred while generating the response.")]
    Internal,
}

impl ComposeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyPrompt | Self::EmptyContext => ErrorKind::Validation,
            Self::RateLimited { .. } => ErrorKind::Capacity,
            Self::Internal => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("embedder returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("invalid embedder config: {0}")]
    InvalidConfig(String),
}

impl EmbedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CountMismatch { .. } => ErrorKind::Mismatch,
            Self::InvalidConfig(_) => ErrorKind::Validation,
            Self::Http(_) | Self::Url(_) | Self::BackendResponse { .. } => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No document uploaded. Please upload a document first.")]
    NoDocument,

    #[error("Query cannot be empty.")]
    EmptyQuery,

    #[error("Failed to generate query embedding.")]
    QueryEmbedding(#[source] EmbedError),

    #[error("Failed to generate document embeddings: {0}")]
    DocumentEmbedding(#[source] EmbedError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Compose(#[from] ComposeError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoDocument | Self::EmptyQuery => ErrorKind::Validation,
            Self::QueryEmbedding(_) => ErrorKind::Internal,
            Self::DocumentEmbedding(error) => error.kind(),
            Self::Ingest(error) => error.kind(),
            Self::Index(error) => error.kind(),
            Self::Compose(error) => error.kind(),
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_message_uses_two_decimals() {
        let error = ComposeError::RateLimited {
            remaining: Duration::from_millis(12_500),
        };
        assert_eq!(
            error.to_string(),
            "Rate limit exceeded. Please wait 12.50 seconds."
        );
        assert_eq!(error.kind(), ErrorKind::Capacity);
    }

    #[test]
    fn pipeline_errors_inherit_component_kind() {
        let error = PipelineError::from(IndexError::CountMismatch {
            vectors: 2,
            metadata: 1,
        });
        assert_eq!(error.kind(), ErrorKind::Mismatch);

        let error = PipelineError::from(ComposeError::EmptyContext);
        assert_eq!(error.to_string(), "No relevant context found.");
        assert_eq!(error.kind(), ErrorKind::Validation);
    }
}

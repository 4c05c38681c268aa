use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::chunking::ChunkingConfig;
use crate::error::ComposeError;

pub const NO_RELEVANT_DOCUMENTS: &str = "No relevant documents found.";
pub const INVALID_QUERY_EMBEDDING: &str = "Invalid query embedding.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentInfo {
    pub document_id: String,
    pub title: String,
    pub source_path: String,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub chunk: String,
    pub chunk_index: usize,
    pub source: Option<String>,
}

impl ChunkMetadata {
    pub fn new(chunk: impl Into<String>, chunk_index: usize) -> Self {
        Self {
            chunk: chunk.into(),
            chunk_index,
            source: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub chunk: String,
    pub score: f32,
}

impl SearchHit {
    pub fn sentinel(message: &str) -> Self {
        Self {
            chunk: message.to_string(),
            score: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub k: usize,
    pub threshold: f32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            k: 5,
            threshold: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionReport {
    pub document: DocumentInfo,
    pub total_chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedResponse {
    pub response: String,
}

/// Wire form of a composition outcome: `{response | error, status}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: AnswerStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    Success,
    Failed,
}

impl AnswerPayload {
    pub fn success(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            error: None,
            status: AnswerStatus::Success,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            response: None,
            error: Some(error.into()),
            status: AnswerStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AnswerStatus::Success
    }
}

impl<E: std::fmt::Display> From<Result<ComposedResponse, E>> for AnswerPayload {
    fn from(value: Result<ComposedResponse, E>) -> Self {
        match value {
            Ok(composed) => Self::success(composed.response),
            Err(error) => Self::failed(error.to_string()),
        }
    }
}

impl From<ComposeError> for AnswerPayload {
    fn from(value: ComposeError) -> Self {
        Self::failed(value.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunking: ChunkingConfig,
    pub search: SearchParams,
    pub rate_limit: u32,
    pub rate_window: Duration,
    pub search_cache_capacity: usize,
    pub response_cache_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            search: SearchParams::default(),
            rate_limit: 10,
            rate_window: Duration::from_secs(60),
            search_cache_capacity: 50,
            response_cache_capacity: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_payload_omits_response_field() -> Result<(), serde_json::Error> {
        let payload = AnswerPayload::from(ComposeError::EmptyPrompt);
        let json = serde_json::to_value(&payload)?;
        assert_eq!(
            json,
            serde_json::json!({ "error": "Query cannot be empty.", "status": "failed" })
        );
        Ok(())
    }

    #[test]
    fn successful_result_becomes_success_payload() {
        let outcome: Result<ComposedResponse, ComposeError> = Ok(ComposedResponse {
            response: "answer".to_string(),
        });
        let payload = AnswerPayload::from(outcome);
        assert!(payload.is_success());
        assert_eq!(payload.response.as_deref(), Some("answer"));
    }
}

use crate::chunking::Chunker;
use crate::clock::{Clock, SystemClock};
use crate::composer::ResponseComposer;
use crate::embeddings::Embedder;
use crate::error::{EmbedError, PipelineError};
use crate::index::VectorIndex;
use crate::loader::{hex_digest, load_document};
use crate::models::{
    AnswerPayload, ChunkMetadata, ComposedResponse, DocumentInfo, IngestionReport, PipelineConfig,
    SearchHit,
};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// One session: a single document's index plus the composer answering over it.
pub struct Pipeline<E: Embedder> {
    config: PipelineConfig,
    chunker: Chunker,
    embedder: E,
    index: VectorIndex,
    composer: ResponseComposer,
    document: Option<DocumentInfo>,
}

impl<E: Embedder> std::fmt::Debug for Pipeline<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("indexed_chunks", &self.index.len())
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

impl<E: Embedder> Pipeline<E> {
    pub fn new(embedder: E, config: PipelineConfig) -> Self {
        Self::with_clock(embedder, config, Arc::new(SystemClock))
    }

    pub fn with_clock(embedder: E, config: PipelineConfig, clock: Arc<dyn Clock>) -> Self {
        let composer = ResponseComposer::with_clock(
            config.rate_limit,
            config.rate_window,
            config.response_cache_capacity,
            clock,
        );
        Self {
            chunker: Chunker::new(config.chunking),
            index: VectorIndex::with_cache_capacity(config.search_cache_capacity),
            embedder,
            composer,
            document: None,
            config,
        }
    }

    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn document(&self) -> Option<&DocumentInfo> {
        self.document.as_ref()
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn composer(&self) -> &ResponseComposer {
        &self.composer
    }

    pub fn ingest_path(&mut self, path: &Path) -> Result<IngestionReport, PipelineError> {
        let loaded = load_document(path)?;
        self.ingest_document(loaded.info, &loaded.text)
    }

    pub fn ingest_text(&mut self, text: &str, source: &str) -> Result<IngestionReport, PipelineError> {
        let info = DocumentInfo {
            document_id: hex_digest(source.as_bytes()),
            title: source.to_string(),
            source_path: source.to_string(),
            checksum: hex_digest(text.as_bytes()),
            ingested_at: Utc::now(),
        };
        self.ingest_document(info, text)
    }

    /// Replaces the current document. The new index is built aside and only
    /// swapped in once every step succeeded.
    fn ingest_document(
        &mut self,
        info: DocumentInfo,
        text: &str,
    ) -> Result<IngestionReport, PipelineError> {
        let chunks = self.chunker.chunk(text)?;
        let texts: Vec<String> = chunks.into_iter().map(|chunk| chunk.text).collect();

        let vectors = self
            .embedder
            .embed(&texts)
            .map_err(PipelineError::DocumentEmbedding)?;
        if vectors.len() != texts.len() {
            return Err(PipelineError::DocumentEmbedding(EmbedError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            }));
        }

        let metadata = texts
            .into_iter()
            .enumerate()
            .map(|(chunk_index, chunk)| ChunkMetadata {
                chunk,
                chunk_index,
                source: Some(info.source_path.clone()),
            })
            .collect();

        let mut index = VectorIndex::with_cache_capacity(self.config.search_cache_capacity);
        let total_chunks = index.add(vectors, metadata)?;

        self.index = index;
        self.document = Some(info.clone());
        info!(
            source = %info.source_path,
            total_chunks,
            "document processed successfully"
        );

        Ok(IngestionReport {
            document: info,
            total_chunks,
        })
    }

    fn query_vector(&self, query: &str) -> Result<Vec<f32>, PipelineError> {
        if self.document.is_none() {
            warn!("query received but no document uploaded");
            return Err(PipelineError::NoDocument);
        }
        if query.trim().is_empty() {
            warn!("received an empty query");
            return Err(PipelineError::EmptyQuery);
        }
        self.embedder
            .embed_one(query)
            .map_err(PipelineError::QueryEmbedding)
    }

    /// Ranked hits for `query`, with the index's sentinel when nothing matches.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>, PipelineError> {
        let vector = self.query_vector(query)?;
        Ok(self.index.search(&vector, self.config.search))
    }

    pub fn answer(&self, query: &str) -> Result<ComposedResponse, PipelineError> {
        let vector = self.query_vector(query)?;

        let context: Vec<String> = match self.index.try_search(&vector, self.config.search) {
            Ok(hits) => hits.into_iter().map(|hit| hit.chunk).collect(),
            Err(error) if error.kind() == crate::error::ErrorKind::NotFound => {
                warn!(query, "no relevant documents found");
                Vec::new()
            }
            Err(error) => return Err(error.into()),
        };

        Ok(self.composer.compose(query, &context)?)
    }

    pub fn answer_payload(&self, query: &str) -> AnswerPayload {
        AnswerPayload::from(self.answer(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{ChunkingConfig, WhitespaceTokenizer};
    use crate::clock::ManualClock;
    use crate::embeddings::HashedNgramEmbedder;
    use crate::error::{ComposeError, ErrorKind, IndexError};
    use crate::models::{AnswerStatus, SearchParams, NO_RELEVANT_DOCUMENTS};
    use std::time::Duration;

    /// Two-dimensional embedding: "pump" texts point one way, "valve" texts the other.
    struct FakeEmbedder {
        fail: bool,
        drop_one: bool,
    }

    impl FakeEmbedder {
        fn working() -> Self {
            Self {
                fail: false,
                drop_one: false,
            }
        }
    }

    impl Embedder for FakeEmbedder {
        fn dimensions(&self) -> usize {
            2
        }

        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            if self.fail {
                return Err(EmbedError::BackendResponse {
                    backend: "fake".to_string(),
                    details: "offline".to_string(),
                });
            }
            let mut vectors: Vec<Vec<f32>> = texts
                .iter()
                .map(|text| {
                    let pump = text.matches("pump").count() as f32;
                    let valve = text.matches("valve").count() as f32;
                    vec![pump, valve]
                })
                .collect();
            if self.drop_one {
                vectors.pop();
            }
            Ok(vectors)
        }
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            chunking: ChunkingConfig {
                chunk_size: 3,
                overlap: 0,
            },
            search: SearchParams::default(),
            rate_limit: 2,
            ..PipelineConfig::default()
        }
    }

    fn pipeline(embedder: FakeEmbedder) -> (Pipeline<FakeEmbedder>, ManualClock) {
        let clock = ManualClock::new();
        let pipeline = Pipeline::with_clock(embedder, small_config(), Arc::new(clock.clone()))
            .with_chunker(Chunker::new(small_config().chunking).with_tokenizer(WhitespaceTokenizer));
        (pipeline, clock)
    }

    const DOCUMENT: &str = "pump pump pump valve valve valve pump seal ring";

    #[test]
    fn answers_with_ranked_chunks() {
        let (mut pipeline, _clock) = pipeline(FakeEmbedder::working());
        let report = pipeline
            .ingest_text(DOCUMENT, "manual.txt")
            .expect("ingest should succeed");
        assert_eq!(report.total_chunks, 3);
        assert_eq!(pipeline.index().len(), 3);

        let composed = pipeline.answer("pump").expect("answer should succeed");
        assert!(composed
            .response
            .contains("1. pump pump pump\n2. pump seal ring"));
        assert!(composed.response.ends_with("question:pump"));
    }

    #[test]
    fn query_before_upload_is_rejected() {
        let (pipeline, _clock) = pipeline(FakeEmbedder::working());
        let error = pipeline.answer("pump").unwrap_err();
        assert!(matches!(error, PipelineError::NoDocument));

        let payload = pipeline.answer_payload("pump");
        assert_eq!(payload.status, AnswerStatus::Failed);
        assert_eq!(
            payload.error.as_deref(),
            Some("No document uploaded. Please upload a document first.")
        );
    }

    #[test]
    fn empty_query_is_rejected() {
        let (mut pipeline, _clock) = pipeline(FakeEmbedder::working());
        pipeline
            .ingest_text(DOCUMENT, "manual.txt")
            .expect("ingest should succeed");
        assert!(matches!(pipeline.answer("  "), Err(PipelineError::EmptyQuery)));
    }

    #[test]
    fn unmatched_query_reports_missing_context() {
        let (mut pipeline, _clock) = pipeline(FakeEmbedder::working());
        pipeline
            .ingest_text(DOCUMENT, "manual.txt")
            .expect("ingest should succeed");

        let error = pipeline.answer("gasket").unwrap_err();
        assert!(matches!(error, PipelineError::Compose(ComposeError::EmptyContext)));

        let hits = pipeline.search("gasket").expect("search never fails on a loaded index");
        assert_eq!(hits, vec![SearchHit::sentinel(NO_RELEVANT_DOCUMENTS)]);
    }

    #[test]
    fn embedding_failure_is_reported() {
        let (mut pipeline, _clock) = pipeline(FakeEmbedder {
            fail: true,
            drop_one: false,
        });
        let error = pipeline.ingest_text(DOCUMENT, "manual.txt").unwrap_err();
        assert!(matches!(error, PipelineError::DocumentEmbedding(_)));
        assert!(pipeline.document().is_none());
    }

    #[test]
    fn short_embedding_batch_keeps_previous_document() {
        let (mut pipeline, _clock) = pipeline(FakeEmbedder::working());
        pipeline
            .ingest_text(DOCUMENT, "manual.txt")
            .expect("ingest should succeed");

        pipeline.embedder.drop_one = true;
        let error = pipeline.ingest_text("valve valve", "other.txt").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Mismatch);
        assert_eq!(pipeline.index().len(), 3);
        assert_eq!(
            pipeline.document().map(|doc| doc.source_path.as_str()),
            Some("manual.txt")
        );
    }

    #[test]
    fn reingest_replaces_previous_document() {
        let (mut pipeline, _clock) = pipeline(FakeEmbedder::working());
        pipeline
            .ingest_text(DOCUMENT, "manual.txt")
            .expect("ingest should succeed");
        let report = pipeline
            .ingest_text("valve valve", "valves.txt")
            .expect("ingest should succeed");
        assert_eq!(report.total_chunks, 1);
        assert_eq!(pipeline.index().len(), 1);
        assert!(matches!(
            pipeline.answer("pump"),
            Err(PipelineError::Compose(ComposeError::EmptyContext))
        ));
    }

    #[test]
    fn repeated_question_survives_rate_limit() {
        let (mut pipeline, clock) = pipeline(FakeEmbedder::working());
        pipeline
            .ingest_text(DOCUMENT, "manual.txt")
            .expect("ingest should succeed");

        let first = pipeline.answer("pump").expect("first answer");
        assert!(pipeline.answer("valve").is_ok());
        let blocked = pipeline.answer("pump valve").unwrap_err();
        assert_eq!(blocked.kind(), ErrorKind::Capacity);

        assert_eq!(pipeline.answer("pump").expect("cached answer"), first);

        clock.advance(Duration::from_secs(60));
        assert!(pipeline.answer("pump valve").is_ok());
        assert_eq!(pipeline.composer().request_count(), 1);
    }

    #[test]
    fn empty_document_is_rejected() {
        let (mut pipeline, _clock) = pipeline(FakeEmbedder::working());
        let error = pipeline.ingest_text("   ", "blank.txt").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);
    }

    #[test]
    fn invalid_query_dimension_is_an_index_error() {
        let mut pipeline = Pipeline::new(HashedNgramEmbedder { dimensions: 16 }, PipelineConfig::default());
        pipeline
            .ingest_text("hydraulic pump pressure", "pumps.txt")
            .expect("ingest should succeed");
        pipeline.embedder = HashedNgramEmbedder { dimensions: 8 };
        assert!(matches!(
            pipeline.answer("hydraulic pump"),
            Err(PipelineError::Index(IndexError::InvalidQuery(_)))
        ));
    }

    #[test]
    fn ingests_text_file_from_disk() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("guide.txt");
        std::fs::write(&path, "Hydraulic pump maintenance.\nCheck the pump pressure weekly.")?;

        let mut pipeline = Pipeline::new(HashedNgramEmbedder::default(), PipelineConfig::default());
        let report = pipeline.ingest_path(&path)?;
        assert_eq!(report.total_chunks, 1);
        assert_eq!(report.document.title, "guide.txt");

        let payload = pipeline.answer_payload("hydraulic pump pressure");
        assert!(payload.is_success());
        Ok(())
    }
}

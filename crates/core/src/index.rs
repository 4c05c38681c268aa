//! In-memory brute-force vector index.
//!
//! Vectors and their metadata live in two parallel sequences that always have
//! the same length; position `i` in one describes position `i` in the other.
//! Searches are memoized per `(query vector, k, threshold)` and the memo is
//! dropped whenever the contents change.

use crate::cache::BoundedCache;
use crate::error::IndexError;
use crate::models::{
    ChunkMetadata, SearchHit, SearchParams, INVALID_QUERY_EMBEDDING, NO_RELEVANT_DOCUMENTS,
};
use tracing::{debug, error, info, warn};

pub const DEFAULT_SEARCH_CACHE_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SearchKey {
    vector: Vec<u32>,
    k: usize,
    threshold: u32,
}

impl SearchKey {
    fn new(query: &[f32], params: SearchParams) -> Self {
        Self {
            vector: query.iter().map(|value| value.to_bits()).collect(),
            k: params.k,
            threshold: params.threshold.to_bits(),
        }
    }
}

#[derive(Debug)]
pub struct VectorIndex {
    vectors: Vec<Vec<f32>>,
    metadata: Vec<ChunkMetadata>,
    dimensions: Option<usize>,
    cache: BoundedCache<SearchKey, Vec<SearchHit>>,
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_SEARCH_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            vectors: Vec::new(),
            metadata: Vec::new(),
            dimensions: None,
            cache: BoundedCache::new(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Width of the stored vectors, fixed by the first successful `add`.
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub fn metadata(&self) -> &[ChunkMetadata] {
        &self.metadata
    }

    pub fn cached_searches(&self) -> usize {
        self.cache.len()
    }

    /// Appends a batch. Either every pair is stored or none is.
    pub fn add(
        &mut self,
        vectors: Vec<Vec<f32>>,
        metadata: Vec<ChunkMetadata>,
    ) -> Result<usize, IndexError> {
        let dimensions = match self.validate_batch(&vectors, &metadata) {
            Ok(dimensions) => dimensions,
            Err(error) => {
                error!(%error, "failed to add embeddings");
                return Err(error);
            }
        };

        let added = vectors.len();
        self.vectors.extend(vectors);
        self.metadata.extend(metadata);
        self.dimensions = Some(dimensions);
        self.cache.clear();

        info!(added, total = self.vectors.len(), "added embeddings to the vector index");
        Ok(added)
    }

    fn validate_batch(
        &self,
        vectors: &[Vec<f32>],
        metadata: &[ChunkMetadata],
    ) -> Result<usize, IndexError> {
        if vectors.is_empty() || metadata.is_empty() {
            return Err(IndexError::EmptyBatch);
        }
        if vectors.len() != metadata.len() {
            return Err(IndexError::CountMismatch {
                vectors: vectors.len(),
                metadata: metadata.len(),
            });
        }

        let expected = self.dimensions.unwrap_or(vectors[0].len());
        for vector in vectors {
            if vector.is_empty() || vector.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        Ok(expected)
    }

    pub fn clear(&mut self) {
        self.vectors.clear();
        self.metadata.clear();
        self.dimensions = None;
        self.cache.clear();
    }

    /// Ranked hits, or a single sentinel hit when nothing can be returned.
    /// Never fails.
    pub fn search(&self, query: &[f32], params: SearchParams) -> Vec<SearchHit> {
        match self.try_search(query, params) {
            Ok(hits) => hits,
            Err(IndexError::InvalidQuery(reason)) => {
                error!(%reason, "invalid query embedding");
                vec![SearchHit::sentinel(INVALID_QUERY_EMBEDDING)]
            }
            Err(error) => {
                warn!(%error, "search returned no results");
                vec![SearchHit::sentinel(NO_RELEVANT_DOCUMENTS)]
            }
        }
    }

    pub fn try_search(
        &self,
        query: &[f32],
        params: SearchParams,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let Some(dimensions) = self.dimensions.filter(|_| !self.vectors.is_empty()) else {
            return Err(IndexError::EmptyIndex);
        };
        validate_query(query, dimensions)?;

        let key = SearchKey::new(query, params);
        let ranked = match self.cache.get(&key) {
            Some(cached) => {
                debug!(k = params.k, "search cache hit");
                cached
            }
            None => {
                let ranked = self.rank(query, params);
                self.cache.put(key, ranked.clone());
                ranked
            }
        };

        if ranked.is_empty() {
            Err(IndexError::NoMatches)
        } else {
            Ok(ranked)
        }
    }

    fn rank(&self, query: &[f32], params: SearchParams) -> Vec<SearchHit> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| (position, cosine_similarity(query, vector)))
            .filter(|(_, score)| *score > params.threshold)
            .collect();

        // stable: equal scores keep insertion order
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));
        scored.truncate(params.k);

        scored
            .into_iter()
            .map(|(position, score)| SearchHit {
                chunk: self.metadata[position].chunk.clone(),
                score,
            })
            .collect()
    }
}

fn validate_query(query: &[f32], dimensions: usize) -> Result<(), IndexError> {
    if query.is_empty() {
        return Err(IndexError::InvalidQuery("query embedding is empty".to_string()));
    }
    if query.len() != dimensions {
        return Err(IndexError::InvalidQuery(format!(
            "query has {} dimensions, index has {}",
            query.len(),
            dimensions
        )));
    }
    if query.iter().any(|value| !value.is_finite()) {
        return Err(IndexError::InvalidQuery(
            "query embedding contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// Cosine similarity; zero when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

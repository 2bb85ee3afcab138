//! Similarity Index
//!
//! The lookahead collaborator: earlier user responses are indexed per session
//! and queried against the canonical text of an upcoming question to detect
//! that it was already substantively answered.
//!
//! The index is strictly an optimization. Backends are infallible from the
//! caller's perspective: failures are logged and degrade to "no similarity
//! evidence" so the rest of the pipeline proceeds unchanged.

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

/// Contract for storing and searching prior responses, scoped per session.
/// Cross-session leakage is a correctness bug, not a tuning concern.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Stores `text` for later similarity search within this session.
    async fn index(&self, session_id: &str, text: &str);

    /// Returns up to `k` previously stored texts for this session, ranked by
    /// semantic closeness to `query_text`. Empty on any backend failure.
    async fn query(&self, session_id: &str, query_text: &str, k: usize) -> Vec<String>;
}

/// An index that never stores and never finds anything, for deployments
/// without an embedding backend.
pub struct NoopIndex;

#[async_trait]
impl SimilarityIndex for NoopIndex {
    async fn index(&self, _session_id: &str, _text: &str) {}

    async fn query(&self, _session_id: &str, _query_text: &str, _k: usize) -> Vec<String> {
        Vec::new()
    }
}

struct IndexedResponse {
    session_id: String,
    text: String,
    embedding: Vec<f32>,
}

/// An in-memory vector index backed by an OpenAI-compatible embedding model.
pub struct EmbeddingIndex {
    client: Client<OpenAIConfig>,
    model: String,
    store: RwLock<Vec<IndexedResponse>>,
}

impl EmbeddingIndex {
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            store: RwLock::new(Vec::new()),
        }
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .ok()?;
        match self.client.embeddings().create(request).await {
            Ok(response) => response.data.into_iter().next().map(|d| d.embedding),
            Err(e) => {
                warn!(error = %e, "Embedding call failed; similarity evidence skipped");
                None
            }
        }
    }
}

#[async_trait]
impl SimilarityIndex for EmbeddingIndex {
    async fn index(&self, session_id: &str, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let Some(embedding) = self.embed(text).await else {
            return;
        };
        self.store.write().await.push(IndexedResponse {
            session_id: session_id.to_string(),
            text: text.to_string(),
            embedding,
        });
    }

    async fn query(&self, session_id: &str, query_text: &str, k: usize) -> Vec<String> {
        let Some(query_embedding) = self.embed(query_text).await else {
            return Vec::new();
        };
        let store = self.store.read().await;
        let mut scored: Vec<(f32, &IndexedResponse)> = store
            .iter()
            .filter(|doc| doc.session_id == session_id)
            .map(|doc| (cosine_similarity(&query_embedding, &doc.embedding), doc))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored
            .into_iter()
            .take(k)
            .map(|(_, doc)| doc.text.clone())
            .collect()
    }
}

/// Cosine similarity of two vectors; 0.0 when either has no magnitude or the
/// dimensions disagree.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, -0.2, 0.9];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn noop_index_always_returns_empty() {
        let index = NoopIndex;
        index.index("s1", "some text").await;
        assert!(index.query("s1", "some text", 5).await.is_empty());
    }
}

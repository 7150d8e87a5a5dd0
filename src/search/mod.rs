//! Free-text search over the index. Lexical (FTS5/BM25) always; semantic
//! nearest-neighbor when an embedding provider is configured; the two ranked
//! lists are fused with Reciprocal Rank Fusion.

use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::storage::notes::Note;
use crate::storage::Storage;

/// Small constant damping the head of each ranked list, the usual RRF k.
const RRF_K: f32 = 60.0;

/// Produces embedding vectors for note content and queries. Implementations
/// live outside this crate (local model, remote API); tests use a
/// deterministic stand-in.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn dimension(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchType {
    Keyword,
    Semantic,
    Both,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub note: Note,
    pub score: f32,
    pub match_type: MatchType,
}

pub struct HybridSearch<'a> {
    storage: &'a Storage,
    provider: Option<&'a dyn EmbeddingProvider>,
}

impl<'a> HybridSearch<'a> {
    pub fn new(storage: &'a Storage, provider: Option<&'a dyn EmbeddingProvider>) -> Self {
        Self { storage, provider }
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let Some(match_expr) = fts_match_expr(query) else {
            return Ok(Vec::new());
        };
        // Rank from a pool deeper than the requested page so fusion has
        // something to reorder.
        let pool = (limit * 4).max(40);

        let lexical: Vec<i64> = self
            .storage
            .fts_search(&match_expr, pool)?
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        let semantic: Vec<i64> = match self.provider {
            Some(provider) => self.semantic_ranked(provider, query, pool)?,
            None => Vec::new(),
        };

        let fused = rrf_fuse(&lexical, &semantic);

        let mut results = Vec::new();
        for (note_id, score, match_type) in fused.into_iter().take(limit) {
            // A note deleted between ranking and lookup is simply absent.
            if let Some(note) = self.storage.get_note(note_id)? {
                results.push(SearchResult {
                    note,
                    score,
                    match_type,
                });
            }
        }
        Ok(results)
    }

    /// Nearest-neighbor ranking by cosine similarity. Notes missing from the
    /// vector index are backfilled from their indexed content first; a note
    /// that still has no vector just doesn't contribute to this list.
    fn semantic_ranked(
        &self,
        provider: &dyn EmbeddingProvider,
        query: &str,
        pool: usize,
    ) -> Result<Vec<i64>> {
        self.backfill_embeddings(provider)?;

        let query_vec = provider.embed(query)?;
        let mut scored: Vec<(i64, f32)> = self
            .storage
            .all_embeddings()?
            .into_iter()
            .map(|(id, vec)| (id, cosine_similarity(&query_vec, &vec)))
            .filter(|(_, sim)| *sim > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(pool);
        Ok(scored.into_iter().map(|(id, _)| id).collect())
    }

    fn backfill_embeddings(&self, provider: &dyn EmbeddingProvider) -> Result<()> {
        for note in self.storage.list_notes()? {
            if self.storage.embedding_for(note.id)?.is_some() {
                continue;
            }
            let Some(content) = self.storage.fts_content(note.id)? else {
                continue;
            };
            match provider.embed(&content) {
                Ok(vector) => self.storage.upsert_embedding(note.id, &vector)?,
                // Stale embeddings are tolerated; this note sits the
                // semantic list out until a later backfill succeeds.
                Err(e) => debug!("embedding backfill failed for note {}: {e}", note.id),
            }
        }
        Ok(())
    }
}

/// Fuses ranked id lists: `score = Σ 1/(k + rank + 1)` over the lists an id
/// appears in, sorted by fused score descending (ties by id for
/// determinism). Ids absent from one list simply earn no contribution
/// from it.
fn rrf_fuse(lexical: &[i64], semantic: &[i64]) -> Vec<(i64, f32, MatchType)> {
    let mut fused: Vec<(i64, f32, MatchType)> = Vec::new();

    for (rank, id) in lexical.iter().enumerate() {
        fused.push((*id, 1.0 / (RRF_K + rank as f32 + 1.0), MatchType::Keyword));
    }
    for (rank, id) in semantic.iter().enumerate() {
        let contribution = 1.0 / (RRF_K + rank as f32 + 1.0);
        match fused.iter_mut().find(|(fid, _, _)| fid == id) {
            Some((_, score, match_type)) => {
                *score += contribution;
                *match_type = MatchType::Both;
            }
            None => fused.push((*id, contribution, MatchType::Semantic)),
        }
    }

    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    fused
}

/// Reduces free text to a safe FTS5 MATCH expression: bare terms OR-joined.
/// Returns None when nothing lexical remains.
fn fts_match_expr(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

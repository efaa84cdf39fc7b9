//! Vector similarity search with post-hoc filtering.
//!
//! The vector table supports only pure k-nearest-neighbor lookups, not
//! compound filter+similarity queries, so the engine overfetches: it
//! pulls `limit × overfetch_multiplier` neighbors, applies the filter
//! predicates and `min_score` to that candidate set, then truncates to
//! `limit`. If filters are highly selective relative to the overfetch
//! size, true matches ranked below the cutoff are missed — an accepted
//! approximation; raising the multiplier trades compute for recall.

use sqlx::{Row, SqlitePool};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::embedding::{blob_to_vec, cosine_similarity, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::{SearchFilters, SearchHit};
use crate::registry::ConnectionRegistry;
use crate::scope::{self, Scope};
use crate::store::{row_to_document, validate_limit};

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: i64,
    /// Minimum cosine similarity, within `[-1, 1]`.
    pub min_score: Option<f64>,
    pub filters: SearchFilters,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            min_score: None,
            filters: SearchFilters::default(),
        }
    }
}

impl SearchOptions {
    pub fn validate(&self) -> Result<()> {
        validate_limit(self.limit)?;
        if let Some(score) = self.min_score {
            if !(-1.0..=1.0).contains(&score) {
                return Err(Error::Validation(format!(
                    "min_score must be within [-1, 1], got {score}"
                )));
            }
        }
        self.filters.validate()
    }
}

/// Scope-aware similarity search: embeds the query once, fans out over
/// the targeted databases, and merges per-database results by document
/// identity.
pub struct SearchEngine {
    registry: Arc<ConnectionRegistry>,
    embedder: Arc<dyn EmbeddingProvider>,
    overfetch: i64,
}

impl SearchEngine {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &Config,
    ) -> Self {
        Self {
            registry,
            embedder,
            overfetch: config.search.overfetch_multiplier,
        }
    }

    pub async fn search(
        &self,
        reference: Option<&str>,
        scope: Scope,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        opts.validate()?;
        let query_vec = self.embedder.embed(query).await?;
        self.search_with_vector(reference, scope, &query_vec, opts)
            .await
    }

    /// Search with an already-computed query vector. Used by the context
    /// assembler, which embeds its angles concurrently up front.
    pub async fn search_with_vector(
        &self,
        reference: Option<&str>,
        scope: Scope,
        query_vec: &[f32],
        opts: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        opts.validate()?;
        let targets = scope::target_databases(&self.registry, reference, scope);
        let mut per_database = Vec::with_capacity(targets.len());
        for path in &targets {
            let pool = self.registry.open(path).await?;
            per_database.push(search_database(&pool, query_vec, opts, self.overfetch).await?);
        }
        Ok(scope::merge_hits(per_database, opts.limit))
    }
}

/// Run an overfetched nearest-neighbor query against one database and
/// apply the post-filters.
pub async fn search_database(
    pool: &SqlitePool,
    query_vec: &[f32],
    opts: &SearchOptions,
    overfetch: i64,
) -> Result<Vec<SearchHit>> {
    let candidate_k = opts.limit.saturating_mul(overfetch.max(1));

    // Pure kNN stage: score every stored vector, keep the top candidates.
    // Filters are deliberately NOT applied here; see the module docs.
    let rows = sqlx::query(
        r#"
        SELECT d.*, dv.embedding
        FROM document_vectors dv
        JOIN documents d ON d.id = dv.doc_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut candidates: Vec<SearchHit> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let stored = blob_to_vec(&blob);
            let score = cosine_similarity(query_vec, &stored) as f64;
            SearchHit {
                document: row_to_document(row),
                score,
            }
        })
        .collect();

    sort_hits(&mut candidates);
    candidates.truncate(candidate_k as usize);
    let overfetched = candidates.len();

    // Post-filter stage.
    candidates.retain(|hit| opts.filters.matches(&hit.document));
    if let Some(min_score) = opts.min_score {
        candidates.retain(|hit| hit.score >= min_score);
    }
    candidates.truncate(opts.limit as usize);

    debug!(
        overfetched,
        returned = candidates.len(),
        limit = opts.limit,
        "vector search"
    );
    Ok(candidates)
}

/// Deterministic result order: score descending, then recency, then id.
pub(crate) fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(b.document.created_at.cmp(&a.document.created_at))
            .then(a.document.id.cmp(&b.document.id))
    });
}

//! Token-budgeted multi-angle context assembly.
//!
//! A topic fans out across several query angles. Each angle is embedded
//! and searched concurrently — the embedding round trip dominates
//! per-call cost, so total latency is bounded by the slowest angle, not
//! the sum. Per-angle results merge by document identity keeping the
//! best score seen for each document, and the highest-scoring distinct
//! documents are greedily packed into the token budget.
//!
//! A failed angle is dropped with a warning; the whole call fails only
//! when every angle fails.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::models::{AssembledContext, SearchFilters, SearchHit};
use crate::scope::{self, Scope};
use crate::search::{SearchEngine, SearchOptions};
use crate::store::validate_limit;

#[derive(Debug, Clone)]
pub struct ContextRequest {
    /// The primary query angle.
    pub query: String,
    /// Additional independent angles on the same topic.
    pub extra_queries: Vec<String>,
    /// Maximum total of included documents' stored token counts.
    pub token_budget: i64,
    /// Search limit applied per angle, per database.
    pub limit_per_query: i64,
    pub min_score: Option<f64>,
    pub filters: SearchFilters,
    pub scope: Scope,
    pub reference: Option<String>,
    /// Overall bound on the fan-out; angles unfinished at expiry count
    /// as failed angles.
    pub deadline: Option<Duration>,
}

pub struct ContextAssembler {
    engine: Arc<SearchEngine>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl ContextAssembler {
    pub fn new(engine: Arc<SearchEngine>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { engine, embedder }
    }

    pub async fn assemble(&self, req: &ContextRequest) -> Result<AssembledContext> {
        if req.token_budget < 0 {
            return Err(Error::Validation(format!(
                "token_budget must be >= 0, got {}",
                req.token_budget
            )));
        }
        validate_limit(req.limit_per_query)?;

        let opts = SearchOptions {
            limit: req.limit_per_query,
            min_score: req.min_score,
            filters: req.filters.clone(),
        };
        opts.validate()?;

        let mut angles: Vec<&str> = vec![req.query.as_str()];
        angles.extend(req.extra_queries.iter().map(String::as_str));
        let total = angles.len();

        let settled = join_all(angles.iter().map(|&angle| {
            let opts = &opts;
            async move {
                let fut = self.run_angle(angle, req, opts);
                match req.deadline {
                    Some(deadline) => match tokio::time::timeout(deadline, fut).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::DeadlineExpired),
                    },
                    None => fut.await,
                }
            }
        }))
        .await;

        let mut per_angle: Vec<Vec<SearchHit>> = Vec::with_capacity(total);
        let mut failed = 0usize;
        for (angle, result) in angles.iter().zip(settled) {
            match result {
                Ok(hits) => per_angle.push(hits),
                Err(e) => {
                    warn!(angle, error = %e, "dropping failed query angle");
                    failed += 1;
                }
            }
        }
        if failed == total {
            return Err(Error::AllAnglesFailed { total });
        }
        if failed > 0 {
            warn!(failed, total, "assembling from surviving angles only");
        }

        // Merge keeps the maximum score per document across angles: a low
        // rank on one angle never penalizes a document another angle
        // found highly relevant.
        let merged = scope::merge_hits(per_angle, i64::MAX);
        let assembled = pack(&merged, req.token_budget);
        debug!(
            candidates = merged.len(),
            included = assembled.doc_count,
            tokens = assembled.token_count,
            truncated = assembled.truncated,
            "assembled context"
        );
        Ok(assembled)
    }

    async fn run_angle(
        &self,
        angle: &str,
        req: &ContextRequest,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let query_vec = self.embedder.embed(angle).await?;
        self.engine
            .search_with_vector(req.reference.as_deref(), req.scope, &query_vec, opts)
            .await
    }
}

/// Greedily pack score-ordered candidates into the budget, accumulating
/// each document's pre-stored token count. Packing stops at the first
/// document that would push the total over the budget; `truncated` is
/// true iff any candidate was left out.
fn pack(candidates: &[SearchHit], token_budget: i64) -> AssembledContext {
    let mut content = String::new();
    let mut token_count = 0i64;
    let mut doc_count = 0usize;
    let mut truncated = false;

    for hit in candidates {
        if token_count + hit.document.token_count > token_budget {
            truncated = true;
            break;
        }
        push_block(&mut content, hit);
        token_count += hit.document.token_count;
        doc_count += 1;
    }

    AssembledContext {
        content,
        token_count,
        doc_count,
        truncated,
    }
}

fn push_block(out: &mut String, hit: &SearchHit) {
    let doc = &hit.document;
    if !out.is_empty() {
        out.push('\n');
    }
    let heading = match &doc.title {
        Some(title) => title.clone(),
        None => content_prefix(&doc.content),
    };
    out.push_str(&format!("## {heading} (score: {:.2})\n", hit.score));
    if !doc.tags.is_empty() {
        out.push_str(&format!("tags: {}\n", doc.tags.join(", ")));
    }
    out.push('\n');
    out.push_str(&doc.content);
    out.push('\n');
}

fn content_prefix(content: &str) -> String {
    let prefix: String = content
        .lines()
        .next()
        .unwrap_or("")
        .chars()
        .take(60)
        .collect();
    if prefix.is_empty() {
        "(untitled)".to_string()
    } else {
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;

    fn hit(id: &str, title: Option<&str>, tags: &[&str], token_count: i64, score: f64) -> SearchHit {
        SearchHit {
            document: Document {
                id: id.to_string(),
                content: format!("content of {id}"),
                title: title.map(str::to_string),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                metadata: serde_json::Map::new(),
                token_count,
                created_at: 0,
                updated_at: 0,
            },
            score,
        }
    }

    #[test]
    fn budget_stops_before_overflow() {
        let candidates = vec![
            hit("a", None, &[], 100, 0.9),
            hit("b", None, &[], 200, 0.8),
            hit("c", None, &[], 300, 0.7),
        ];
        let out = pack(&candidates, 250);
        assert_eq!(out.doc_count, 1);
        assert_eq!(out.token_count, 100);
        assert!(out.truncated);
    }

    #[test]
    fn everything_fits_means_not_truncated() {
        let candidates = vec![hit("a", None, &[], 100, 0.9), hit("b", None, &[], 100, 0.8)];
        let out = pack(&candidates, 500);
        assert_eq!(out.doc_count, 2);
        assert_eq!(out.token_count, 200);
        assert!(!out.truncated);
    }

    #[test]
    fn no_candidates_is_empty_not_truncated() {
        let out = pack(&[], 1000);
        assert_eq!(out.doc_count, 0);
        assert_eq!(out.token_count, 0);
        assert!(out.content.is_empty());
        assert!(!out.truncated);
    }

    #[test]
    fn oversized_first_candidate_truncates_to_zero() {
        let candidates = vec![hit("a", None, &[], 400, 0.9)];
        let out = pack(&candidates, 250);
        assert_eq!(out.doc_count, 0);
        assert!(out.truncated);
        assert!(out.content.is_empty());
    }

    #[test]
    fn block_shows_title_tags_and_content() {
        let candidates = vec![hit("a", Some("Deploy Notes"), &["ops", "k8s"], 10, 0.87)];
        let out = pack(&candidates, 100);
        assert!(out.content.contains("## Deploy Notes (score: 0.87)"));
        assert!(out.content.contains("tags: ops, k8s"));
        assert!(out.content.contains("content of a"));
    }

    #[test]
    fn untitled_block_uses_content_prefix() {
        let candidates = vec![hit("a", None, &[], 10, 0.5)];
        let out = pack(&candidates, 100);
        assert!(out.content.contains("## content of a (score: 0.50)"));
    }
}

//! Core data models for the memo engine.
//!
//! These types represent the documents, search hits, and assembled context
//! blocks that flow through the storage and retrieval pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A stored document with its derived bookkeeping fields.
///
/// `token_count` is always consistent with the current `content`; the
/// embedding vector lives in a parallel table keyed by `id` and is
/// recomputed together with `token_count` on every content change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// UUID assigned at creation, immutable.
    pub id: String,
    pub content: String,
    pub title: Option<String>,
    /// Insertion order preserved for display; irrelevant to search.
    pub tags: Vec<String>,
    /// Opaque to the engine, serialized only at the storage boundary.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Derived from `content` via the configured tokenizer.
    pub token_count: i64,
    /// Unix seconds, immutable.
    pub created_at: i64,
    /// Unix seconds, bumped on every mutation.
    pub updated_at: i64,
}

/// Fields supplied when creating a document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDocument {
    pub content: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Partial update: only supplied fields change. A `content` change
/// cascades to `token_count` and the embedding vector.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDocument {
    pub content: Option<String>,
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// A document paired with its cosine similarity to a query vector.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document: Document,
    pub score: f64,
}

/// Post-hoc filters applied to candidates after the nearest-neighbor
/// overfetch. All bounds are inclusive; `tags` is any-match.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub tags: Vec<String>,
    pub after: Option<i64>,
    pub before: Option<i64>,
    pub min_tokens: Option<i64>,
    pub max_tokens: Option<i64>,
}

impl SearchFilters {
    pub fn validate(&self) -> Result<()> {
        if let (Some(after), Some(before)) = (self.after, self.before) {
            if after > before {
                return Err(Error::Validation(format!(
                    "after ({after}) must not exceed before ({before})"
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.min_tokens, self.max_tokens) {
            if min > max {
                return Err(Error::Validation(format!(
                    "min_tokens ({min}) must not exceed max_tokens ({max})"
                )));
            }
        }
        Ok(())
    }

    /// Whether a document passes every filter predicate.
    pub fn matches(&self, doc: &Document) -> bool {
        if !self.tags.is_empty() && !self.tags.iter().any(|t| doc.tags.contains(t)) {
            return false;
        }
        if let Some(after) = self.after {
            if doc.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.before {
            if doc.created_at > before {
                return false;
            }
        }
        if let Some(min) = self.min_tokens {
            if doc.token_count < min {
                return false;
            }
        }
        if let Some(max) = self.max_tokens {
            if doc.token_count > max {
                return false;
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
            && self.after.is_none()
            && self.before.is_none()
            && self.min_tokens.is_none()
            && self.max_tokens.is_none()
    }
}

/// The output of context assembly: a formatted block of the highest
/// scoring distinct documents that fit the token budget.
#[derive(Debug, Clone, Serialize)]
pub struct AssembledContext {
    pub content: String,
    /// Sum of the included documents' stored token counts.
    pub token_count: i64,
    pub doc_count: usize,
    /// True iff at least one candidate existed beyond what fit.
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(tags: &[&str], created_at: i64, token_count: i64) -> Document {
        Document {
            id: "d1".to_string(),
            content: "body".to_string(),
            title: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            metadata: serde_json::Map::new(),
            token_count,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn empty_filters_match_everything() {
        let f = SearchFilters::default();
        assert!(f.is_empty());
        assert!(f.matches(&doc(&[], 0, 0)));
    }

    #[test]
    fn tags_are_any_match() {
        let f = SearchFilters {
            tags: vec!["rust".to_string(), "notes".to_string()],
            ..Default::default()
        };
        assert!(f.matches(&doc(&["notes"], 0, 0)));
        assert!(!f.matches(&doc(&["python"], 0, 0)));
        assert!(!f.matches(&doc(&[], 0, 0)));
    }

    #[test]
    fn time_and_token_bounds_are_inclusive() {
        let f = SearchFilters {
            after: Some(100),
            before: Some(200),
            min_tokens: Some(10),
            max_tokens: Some(20),
            ..Default::default()
        };
        assert!(f.matches(&doc(&[], 100, 10)));
        assert!(f.matches(&doc(&[], 200, 20)));
        assert!(!f.matches(&doc(&[], 99, 15)));
        assert!(!f.matches(&doc(&[], 201, 15)));
        assert!(!f.matches(&doc(&[], 150, 9)));
        assert!(!f.matches(&doc(&[], 150, 21)));
    }

    #[test]
    fn inverted_ranges_fail_validation() {
        let f = SearchFilters {
            after: Some(200),
            before: Some(100),
            ..Default::default()
        };
        assert!(f.validate().is_err());

        let f = SearchFilters {
            min_tokens: Some(20),
            max_tokens: Some(10),
            ..Default::default()
        };
        assert!(f.validate().is_err());
    }
}

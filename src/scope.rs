//! Which database(s) a request targets, and how per-database result
//! sets combine.
//!
//! Two databases never share identifiers implicitly: the same id in a
//! local and the global store is two logical documents until
//! [`merge_hits`] picks the higher-scoring one.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::Error;
use crate::models::SearchHit;
use crate::registry::ConnectionRegistry;
use crate::search::sort_hits;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// The database resolved from the reference (default database when
    /// the reference is omitted).
    #[default]
    Local,
    /// The default database only; the reference is ignored.
    Global,
    /// The local-resolved database and the default database, deduplicated.
    All,
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "local" => Ok(Scope::Local),
            "global" => Ok(Scope::Global),
            "all" => Ok(Scope::All),
            other => Err(Error::Validation(format!(
                "unknown scope: '{other}' (expected local, global, or all)"
            ))),
        }
    }
}

/// The ordered set of canonical database paths a scope targets.
pub fn target_databases(
    registry: &ConnectionRegistry,
    reference: Option<&str>,
    scope: Scope,
) -> Vec<PathBuf> {
    let global = registry.resolve(None);
    match scope {
        Scope::Local => vec![registry.resolve(reference)],
        Scope::Global => vec![global],
        Scope::All => {
            let local = registry.resolve(reference);
            if local == global {
                vec![global]
            } else {
                vec![local, global]
            }
        }
    }
}

/// Combine result lists from each targeted database. When the same
/// document id appears in more than one list, the higher-scoring entry
/// wins; the combined set is sorted by score descending and truncated.
pub fn merge_hits(per_database: Vec<Vec<SearchHit>>, limit: i64) -> Vec<SearchHit> {
    let mut best: HashMap<String, SearchHit> = HashMap::new();
    for hits in per_database {
        for hit in hits {
            match best.get(&hit.document.id) {
                Some(existing) if existing.score >= hit.score => {}
                _ => {
                    best.insert(hit.document.id.clone(), hit);
                }
            }
        }
    }
    let mut merged: Vec<SearchHit> = best.into_values().collect();
    sort_hits(&mut merged);
    if limit >= 0 {
        merged.truncate(limit as usize);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;

    fn hit(id: &str, score: f64) -> SearchHit {
        SearchHit {
            document: Document {
                id: id.to_string(),
                content: String::new(),
                title: None,
                tags: Vec::new(),
                metadata: serde_json::Map::new(),
                token_count: 0,
                created_at: 0,
                updated_at: 0,
            },
            score,
        }
    }

    #[test]
    fn scope_parses_known_values() {
        assert_eq!("local".parse::<Scope>().unwrap(), Scope::Local);
        assert_eq!("global".parse::<Scope>().unwrap(), Scope::Global);
        assert_eq!("all".parse::<Scope>().unwrap(), Scope::All);
        assert!("everything".parse::<Scope>().is_err());
    }

    #[test]
    fn duplicate_id_keeps_higher_score() {
        let local = vec![hit("a", 0.4), hit("b", 0.9)];
        let global = vec![hit("a", 0.7), hit("c", 0.5)];
        let merged = merge_hits(vec![local, global], 10);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].document.id, "b");
        assert_eq!(merged[1].document.id, "a");
        assert!((merged[1].score - 0.7).abs() < 1e-9);
        assert_eq!(merged[2].document.id, "c");
    }

    #[test]
    fn merge_truncates_to_limit() {
        let merged = merge_hits(vec![vec![hit("a", 0.9), hit("b", 0.8), hit("c", 0.7)]], 2);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].document.id, "a");
        assert_eq!(merged[1].document.id, "b");
    }

    #[test]
    fn merge_of_nothing_is_empty() {
        assert!(merge_hits(Vec::new(), 10).is_empty());
        assert!(merge_hits(vec![Vec::new(), Vec::new()], 10).is_empty());
    }
}

//! Connection lifecycle management.
//!
//! A [`ConnectionRegistry`] resolves logical database references to
//! canonical file paths and owns a process-wide cache of open,
//! schema-initialized [`SqlitePool`]s. It is constructed explicitly and
//! injected into the store/search/context components; there is no ambient
//! global, and [`shutdown`](ConnectionRegistry::shutdown) closes every
//! pool it opened.

use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};

/// References ending in one of these are treated as explicit database
/// files and used verbatim.
const DB_SUFFIXES: &[&str] = &[".db", ".sqlite"];

pub struct ConnectionRegistry {
    default_db_path: PathBuf,
    data_dir: PathBuf,
    pools: Mutex<HashMap<PathBuf, SqlitePool>>,
}

impl ConnectionRegistry {
    pub fn new(config: &Config) -> Self {
        Self {
            default_db_path: config.storage.default_db_path.clone(),
            data_dir: config.storage.data_dir.clone(),
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// The canonical path of the global (default) database.
    pub fn default_path(&self) -> &Path {
        &self.default_db_path
    }

    /// Resolve a logical reference to a canonical file path.
    ///
    /// - `None` → the configured default database.
    /// - A reference with a recognized database-file suffix → used verbatim.
    /// - Anything else is directory-like and maps deterministically to a
    ///   derived filename under the data directory; the same reference
    ///   yields the same path across process restarts.
    pub fn resolve(&self, reference: Option<&str>) -> PathBuf {
        let reference = match reference {
            Some(r) if !r.trim().is_empty() => r,
            _ => return self.default_db_path.clone(),
        };
        if DB_SUFFIXES.iter().any(|s| reference.ends_with(s)) {
            return PathBuf::from(reference);
        }
        self.data_dir.join(derived_file_name(reference))
    }

    /// Resolve and open in one step.
    pub async fn open_ref(&self, reference: Option<&str>) -> Result<SqlitePool> {
        let path = self.resolve(reference);
        self.open(&path).await
    }

    /// Return the cached pool for `path`, or create the file and schema,
    /// open it, and cache it. The cache lock is held across first-open so
    /// concurrent first access has a single winning initializer and no
    /// caller ever observes a partial schema.
    pub async fn open(&self, path: &Path) -> Result<SqlitePool> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(path) {
            return Ok(pool.clone());
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Connection(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| Error::Connection(format!("bad path {}: {e}", path.display())))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::Connection(format!("cannot open {}: {e}", path.display())))?;

        init_schema(&pool).await?;
        debug!(path = %path.display(), "opened database");

        pools.insert(path.to_path_buf(), pool.clone());
        Ok(pool)
    }

    /// Close every cached pool. Further `open` calls re-open from scratch.
    pub async fn shutdown(&self) {
        let mut pools = self.pools.lock().await;
        for (path, pool) in pools.drain() {
            debug!(path = %path.display(), "closing database");
            pool.close().await;
        }
    }
}

async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id          TEXT PRIMARY KEY,
            content     TEXT NOT NULL,
            title       TEXT,
            tags        TEXT NOT NULL DEFAULT '[]',
            metadata    TEXT NOT NULL DEFAULT '{}',
            token_count INTEGER NOT NULL,
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_vectors (
            doc_id    TEXT PRIMARY KEY,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Map a directory-like reference to a stable filename: a sanitized form
/// for readability plus a digest prefix so distinct references that
/// sanitize identically still get distinct files.
fn derived_file_name(reference: &str) -> String {
    let trimmed = reference.trim().trim_end_matches(['/', '\\']);
    let mut sanitized = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            sanitized.push(c);
        } else {
            sanitized.push('_');
        }
    }
    let sanitized = sanitized.trim_matches('_');
    let stem = if sanitized.is_empty() { "memo" } else { sanitized };

    let digest = Sha256::digest(reference.as_bytes());
    let short: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();

    format!("{stem}-{short}.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, StorageConfig};

    fn registry() -> ConnectionRegistry {
        let config = Config {
            storage: StorageConfig {
                default_db_path: PathBuf::from("/data/memo/global.db"),
                data_dir: PathBuf::from("/data/memo"),
            },
            embedding: Default::default(),
            search: Default::default(),
            context: Default::default(),
        };
        ConnectionRegistry::new(&config)
    }

    #[test]
    fn none_resolves_to_default() {
        let r = registry();
        assert_eq!(r.resolve(None), PathBuf::from("/data/memo/global.db"));
        assert_eq!(r.resolve(Some("  ")), PathBuf::from("/data/memo/global.db"));
    }

    #[test]
    fn explicit_file_used_verbatim() {
        let r = registry();
        assert_eq!(
            r.resolve(Some("/somewhere/else/notes.db")),
            PathBuf::from("/somewhere/else/notes.db")
        );
        assert_eq!(
            r.resolve(Some("/srv/ctx.sqlite")),
            PathBuf::from("/srv/ctx.sqlite")
        );
    }

    #[test]
    fn directory_reference_is_deterministic() {
        let r = registry();
        let a = r.resolve(Some("/home/alice/project"));
        let b = r.resolve(Some("/home/alice/project"));
        assert_eq!(a, b);
        assert!(a.starts_with("/data/memo"));
        assert!(a.to_string_lossy().ends_with(".db"));
    }

    #[test]
    fn distinct_references_get_distinct_files() {
        let r = registry();
        // These sanitize to the same stem; the digest keeps them apart.
        let a = r.resolve(Some("/home/a/b"));
        let b = r.resolve(Some("/home/a_b"));
        assert_ne!(a, b);
    }

    #[test]
    fn derived_name_keeps_a_readable_stem() {
        let name = derived_file_name("/home/alice/project/");
        assert!(name.starts_with("home_alice_project-"));
        assert!(name.ends_with(".db"));
    }
}

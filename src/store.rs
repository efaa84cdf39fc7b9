//! Document CRUD with embedding and token bookkeeping.
//!
//! Every write touches two rows — the document and its vector-index
//! entry — inside a single transaction, so readers never observe one
//! without the other. A `content` change synchronously recomputes
//! `token_count` and the embedding before the write commits.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::embedding::{blob_to_vec, vec_to_blob, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::{Document, NewDocument, SearchFilters, UpdateDocument};
use crate::registry::ConnectionRegistry;
use crate::scope::{self, Scope};
use crate::tokenizer::Tokenizer;

/// Options for [`DocumentStore::list`].
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub filters: SearchFilters,
    pub limit: i64,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            filters: SearchFilters::default(),
            limit: 100,
        }
    }
}

pub struct DocumentStore {
    registry: Arc<ConnectionRegistry>,
    embedder: Arc<dyn EmbeddingProvider>,
    tokenizer: Arc<dyn Tokenizer>,
}

impl DocumentStore {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        embedder: Arc<dyn EmbeddingProvider>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        Self {
            registry,
            embedder,
            tokenizer,
        }
    }

    /// Store a new document, returning its fresh id.
    pub async fn create(&self, reference: Option<&str>, new: NewDocument) -> Result<String> {
        let embedding = self.embedder.embed(&new.content).await?;
        let token_count = self.tokenizer.count(&new.content) as i64;

        let pool = self.registry.open_ref(reference).await?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();

        let mut tx = pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO documents (id, content, title, tags, metadata, token_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.content)
        .bind(&new.title)
        .bind(serde_json::to_string(&new.tags)?)
        .bind(serde_json::to_string(&new.metadata)?)
        .bind(token_count)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO document_vectors (doc_id, embedding) VALUES (?, ?)")
            .bind(&id)
            .bind(vec_to_blob(&embedding))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(%id, token_count, "stored document");
        Ok(id)
    }

    /// Fetch a document by id.
    pub async fn get(&self, reference: Option<&str>, id: &str) -> Result<Document> {
        let pool = self.registry.open_ref(reference).await?;
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&pool)
            .await?;
        match row {
            Some(row) => Ok(row_to_document(&row)),
            None => Err(Error::NotFound { id: id.to_string() }),
        }
    }

    /// Fetch a document's stored embedding vector.
    pub async fn get_embedding(&self, reference: Option<&str>, id: &str) -> Result<Vec<f32>> {
        let pool = self.registry.open_ref(reference).await?;
        let row = sqlx::query("SELECT embedding FROM document_vectors WHERE doc_id = ?")
            .bind(id)
            .fetch_optional(&pool)
            .await?;
        match row {
            Some(row) => {
                let blob: Vec<u8> = row.get("embedding");
                Ok(blob_to_vec(&blob))
            }
            None => Err(Error::NotFound { id: id.to_string() }),
        }
    }

    /// Apply a partial update. Only supplied fields change; a content
    /// change recomputes `token_count` and rewrites the vector row, and
    /// `updated_at` is always bumped.
    pub async fn update(
        &self,
        reference: Option<&str>,
        id: &str,
        patch: UpdateDocument,
    ) -> Result<Document> {
        // Embed outside the transaction: the provider round trip is slow
        // and must not hold a write transaction open.
        let recomputed = match &patch.content {
            Some(content) => {
                let embedding = self.embedder.embed(content).await?;
                let token_count = self.tokenizer.count(content) as i64;
                Some((embedding, token_count))
            }
            None => None,
        };

        let pool = self.registry.open_ref(reference).await?;
        let now = Utc::now().timestamp();

        let mut tx = pool.begin().await?;
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let mut doc = match row {
            Some(row) => row_to_document(&row),
            None => return Err(Error::NotFound { id: id.to_string() }),
        };

        if let Some(content) = patch.content {
            doc.content = content;
        }
        if let Some(title) = patch.title {
            doc.title = Some(title);
        }
        if let Some(tags) = patch.tags {
            doc.tags = tags;
        }
        if let Some(metadata) = patch.metadata {
            doc.metadata = metadata;
        }
        if let Some((_, token_count)) = &recomputed {
            doc.token_count = *token_count;
        }
        doc.updated_at = now;

        sqlx::query(
            r#"
            UPDATE documents
            SET content = ?, title = ?, tags = ?, metadata = ?, token_count = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&doc.content)
        .bind(&doc.title)
        .bind(serde_json::to_string(&doc.tags)?)
        .bind(serde_json::to_string(&doc.metadata)?)
        .bind(doc.token_count)
        .bind(doc.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if let Some((embedding, _)) = &recomputed {
            sqlx::query("UPDATE document_vectors SET embedding = ? WHERE doc_id = ?")
                .bind(vec_to_blob(embedding))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(%id, recomputed = recomputed.is_some(), "updated document");
        Ok(doc)
    }

    /// Delete a document and its vector row. Returns `false` if the id
    /// did not exist; deleting twice is not an error.
    pub async fn delete(&self, reference: Option<&str>, id: &str) -> Result<bool> {
        let pool = self.registry.open_ref(reference).await?;
        let mut tx = pool.begin().await?;
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM document_vectors WHERE doc_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// List documents reverse-chronologically with optional filters.
    pub async fn list(&self, reference: Option<&str>, opts: &ListOptions) -> Result<Vec<Document>> {
        validate_limit(opts.limit)?;
        opts.filters.validate()?;

        let pool = self.registry.open_ref(reference).await?;
        list_database(&pool, opts).await
    }

    /// List across the databases a scope targets, merged newest-first.
    pub async fn list_scoped(
        &self,
        reference: Option<&str>,
        scope: Scope,
        opts: &ListOptions,
    ) -> Result<Vec<Document>> {
        validate_limit(opts.limit)?;
        opts.filters.validate()?;

        let mut merged: Vec<Document> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for path in scope::target_databases(&self.registry, reference, scope) {
            let pool = self.registry.open(&path).await?;
            for doc in list_database(&pool, opts).await? {
                if seen.insert(doc.id.clone()) {
                    merged.push(doc);
                }
            }
        }
        merged.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        merged.truncate(opts.limit as usize);
        Ok(merged)
    }
}

async fn list_database(pool: &SqlitePool, opts: &ListOptions) -> Result<Vec<Document>> {
    // Range filters run in SQL; the tag predicate needs the decoded JSON
    // column, so when tags are present we scan without a LIMIT and
    // truncate after filtering (LIMIT -1 is SQLite for "no limit").
    let sql_limit = if opts.filters.tags.is_empty() {
        opts.limit
    } else {
        -1
    };

    let rows = sqlx::query(
        r#"
        SELECT * FROM documents
        WHERE created_at >= COALESCE(?, created_at)
          AND created_at <= COALESCE(?, created_at)
          AND token_count >= COALESCE(?, token_count)
          AND token_count <= COALESCE(?, token_count)
        ORDER BY created_at DESC, id ASC
        LIMIT ?
        "#,
    )
    .bind(opts.filters.after)
    .bind(opts.filters.before)
    .bind(opts.filters.min_tokens)
    .bind(opts.filters.max_tokens)
    .bind(sql_limit)
    .fetch_all(pool)
    .await?;

    let mut docs = Vec::with_capacity(rows.len().min(opts.limit as usize));
    for row in &rows {
        let doc = row_to_document(row);
        if !opts.filters.matches(&doc) {
            continue;
        }
        docs.push(doc);
        if docs.len() >= opts.limit as usize {
            break;
        }
    }
    Ok(docs)
}

pub(crate) fn validate_limit(limit: i64) -> Result<()> {
    if limit < 1 {
        return Err(Error::Validation(format!("limit must be >= 1, got {limit}")));
    }
    Ok(())
}

/// Decode a `documents` row. Corrupt JSON in the tags/metadata columns
/// degrades to empty collections rather than failing the whole read.
pub(crate) fn row_to_document(row: &SqliteRow) -> Document {
    let tags_json: String = row.get("tags");
    let metadata_json: String = row.get("metadata");
    Document {
        id: row.get("id"),
        content: row.get("content"),
        title: row.get("title"),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        token_count: row.get("token_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

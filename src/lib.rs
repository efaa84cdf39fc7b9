//! # memo-core
//!
//! A semantic memo engine: short text documents stored with vector
//! embeddings in SQLite, retrieved by cosine similarity, scoped across a
//! global database plus any number of per-project databases, and packed
//! into token-budgeted context blocks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │ DocumentStore │──▶│ Connection    │──▶│ SQLite files │
//! │ create/update │   │ Registry      │   │ docs+vectors │
//! └──────────────┘   └───────┬───────┘   └──────────────┘
//!                            │
//!          ┌─────────────────┤
//!          ▼                 ▼
//!    ┌───────────┐    ┌──────────────┐
//!    │ Search    │───▶│ Context      │
//!    │ Engine    │    │ Assembler    │
//!    └───────────┘    └──────────────┘
//! ```
//!
//! HTTP/RPC surfaces and CLIs are external callers of these types; this
//! crate is the storage-and-retrieval engine only.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`registry`] | Database path resolution and pooled connections |
//! | [`store`] | Document CRUD with embedding/token bookkeeping |
//! | [`search`] | Overfetched vector similarity search |
//! | [`scope`] | Multi-database targeting and result merging |
//! | [`context`] | Multi-angle, token-budgeted context assembly |
//! | [`embedding`] | Embedding provider abstraction and vector codecs |
//! | [`tokenizer`] | Deterministic token counting |
//! | [`error`] | Typed error taxonomy |

pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod models;
pub mod registry;
pub mod scope;
pub mod search;
pub mod store;
pub mod tokenizer;

pub use config::{load_config, Config};
pub use context::{ContextAssembler, ContextRequest};
pub use embedding::EmbeddingProvider;
pub use error::{Error, Result};
pub use models::{
    AssembledContext, Document, NewDocument, SearchFilters, SearchHit, UpdateDocument,
};
pub use registry::ConnectionRegistry;
pub use scope::Scope;
pub use search::{SearchEngine, SearchOptions};
pub use store::{DocumentStore, ListOptions};
pub use tokenizer::{HeuristicTokenizer, Tokenizer};

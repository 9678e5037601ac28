//! # roux-core
//!
//! A Rust library that turns a directory of interlinked documents into a
//! queryable graph with bidirectional synchronization between the files on
//! disk and the cache/index that describes them.
//!
//! ## Overview
//!
//! roux-core watches a root directory of plain-text documents (Markdown by
//! default, extensible via [`codec::FormatReader`]), parses their frontmatter
//! and wiki-style links, and maintains:
//!
//! - a durable **Document Cache** ([`cache::DocumentCache`]) of parsed nodes,
//! - an in-memory **Graph Index** ([`graph::GraphIndex`]) of resolved links,
//! - an optional **Vector Index** ([`vector::VectorIndex`]) of embeddings,
//!
//! kept in sync by the [`coordinator::StoreCoordinator`], which serializes
//! every mutation (bulk sync, incremental reconciliation, and direct CRUD)
//! behind a single writer. External callers interact through the
//! [`query::QueryFacade`], a closed set of operations with response-size
//! caps baked in.
//!
//! ## Module Guide
//!
//! - [`codec`] — pluggable [`codec::FormatReader`]s (Markdown by default)
//! - [`cache`] — the Document Cache, a sqlite-backed node store
//! - [`graph`] — the in-memory link graph and its traversal queries
//! - [`vector`] — the embedding store and brute-force cosine search
//! - [`resolver`] — wiki-link resolution, including ghost node bookkeeping
//! - [`scanner`] — one-shot filesystem enumeration for bulk sync
//! - [`watch`] — the debounced filesystem watcher feeding incremental reconciliation
//! - [`embedder`] — the pluggable text embedding capability
//! - [`coordinator`] — the single write authority composing all of the above
//! - [`query`] — the closed, capped query/mutation surface for external callers
//! - [`node`] — the core `Node`/`SourceRef`/`VectorRecord`/`CentralityRecord` types
//! - [`id`] — id generation and the ghost-id scheme
//! - [`config`] — runtime configuration
//! - [`paths`] — path normalization and source-root boundary enforcement
//! - [`error`] — the crate's error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::{path::PathBuf, sync::Arc};
//! use roux_core::{config::Config, coordinator::StoreCoordinator, query::QueryFacade};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = StoreCoordinator::open(PathBuf::from("./vault"), Config::default(), None).await?;
//!     coordinator.sync().await?;
//!     let facade = QueryFacade::new(Arc::new(coordinator));
//!     let (page, total) = facade.list_nodes(&Default::default(), roux_core::cache::Paging { limit: 20, offset: 0 }).await?;
//!     println!("{total} nodes, showing {}", page.len());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod embedder;
pub mod error;
pub mod graph;
pub mod id;
pub mod node;
pub mod paths;
pub mod query;
pub mod resolver;
pub mod scanner;
pub mod vector;
pub mod watch;

pub use error::{ErrorKind, RouxError};

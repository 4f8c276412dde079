//! # basic-memory-core
//!
//! Core engine for Basic Memory, a local-first knowledge base that treats a
//! directory of Markdown files as the source of truth and maintains a
//! derived relational + full-text index over them.
//!
//! This library provides:
//! - A Markdown knowledge parser (frontmatter, observations, relations)
//! - A two-pass synchronizer reconciling files with the index by checksum
//! - A link resolver mapping `[[wiki links]]` to canonical permalinks
//! - An FTS5 search index with structured metadata filters
//! - A memory:// context builder returning bounded subgraphs
//! - A debounced filesystem watcher driving incremental syncs
//!
//! ## Architecture
//!
//! The filesystem is always authoritative; every database row is derived
//! and can be rebuilt from the files. An entity whose `checksum` is NULL is
//! mid-sync: readers treat its relations as in-flight.
//!
//! ## Example
//!
//! ```rust,no_run
//! use basic_memory_core::{ProjectConfig, SyncOptions, SyncService};
//!
//! let config = ProjectConfig::new("/path/to/notes", "sqlite:///path/to/index.db", 1);
//! let sync = SyncService::open(&config, SyncOptions::default()).expect("open engine");
//! let report = sync.sync().expect("sync");
//! println!("{report}");
//! ```

// Re-export commonly used items at the crate root
pub use config::{Config, ProjectConfig, SyncOptions};
pub use context::{ContextBuilder, GraphContext, MemoryUrl};
pub use db::{Database, EntityStore, SqliteStore};
pub use error::{Error, Result};
pub use markdown::{EntityDoc, EntityParser};
pub use resolver::LinkResolver;
pub use search::{SearchBackend, SearchQuery, SearchResult, SqliteSearchIndex};
pub use sync::{SyncReport, SyncService, WatchService};
pub use types::*;

// Public modules
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod fileio;
pub mod ignore;
pub mod logging;
pub mod markdown;
pub mod permalink;
pub mod resolver;
pub mod search;
pub mod sync;
pub mod types;

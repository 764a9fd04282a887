//! BypassMap Core Library
//!
//! This crate provides the capture-and-match engine behind BypassMap: it records
//! the Content-Security-Policy served by each visited domain and cross-references
//! policies against a crowd-sourced dataset of known CSP bypasses.
//!
//! # Architecture
//!
//! Everything that touches the outside world (key/value storage, the network,
//! the browser badge, the clock) is an injected capability trait. The state
//! machines themselves ([`PolicyStore`], [`DatasetCacheEntry`]) are plain
//! synchronous types, so they can be driven from the wasm bindings directly.
//!
//! # Modules
//!
//! - `types`: Shared type definitions
//! - `url`: Hostname extraction without a full URL parser
//! - `dataset`: TSV record parser
//! - `normalize`: Wildcard normalizer for CSP source expressions
//! - `query`: Free-text and directive-scoped search
//! - `cache`: Time-bounded cache for the remote dataset
//! - `policy`: Domain-keyed store of captured policies
//! - `capture`: Header and meta-tag capture channels
//! - `popup`: Popup session (active-tab lookup and search)
//! - `background`: Startup lifecycle and event routing
//! - `storage`: Key/value storage capability
//! - `config`: Configuration with defaults
//! - `error`: Error types

pub mod background;
pub mod cache;
pub mod capture;
pub mod config;
pub mod dataset;
pub mod error;
pub mod normalize;
pub mod policy;
pub mod popup;
pub mod query;
pub mod storage;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use background::Background;
pub use cache::{Clock, DatasetCache, DatasetCacheEntry, DatasetSource, SystemClock};
pub use capture::{BadgeIndicator, CaptureCoordinator, DocumentSource};
pub use config::{CacheConfig, CaptureConfig, Config};
pub use dataset::{parse_dataset, parse_dataset_with_stats, ParseStats};
pub use error::{Error, Result};
pub use normalize::{normalize_directive, normalize_source};
pub use policy::{CaptureOutcome, PolicyStore};
pub use popup::{LookupError, PopupSession};
pub use query::{search, search_domain_only, Query, QueryEngine};
pub use storage::{KeyValueStore, MemoryStore};
pub use types::{BadgeState, CapturePrecedence, CaptureSource, CapturedPolicy, DatasetRecord, RequestType, TabCloseScope, TabId};

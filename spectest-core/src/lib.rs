//! # Spectest Core
//!
//! Core functionality of spectest, an engine that executes declarative HTTP test
//! specifications written in JSON, YAML or XML.
//!
//! This crate provides:
//! - Format resolution, normalization into one canonical tree and validation
//! - Request dispatch and the chain of response checks
//! - A per-target run queue and the engine driving runs through it
//! - Storage, configuration and reporting collaborators
//!
//! ## Architecture (block diagram)
//!
//! ```text
//! +------------------+    +------------------+    +------------------+
//! | raw spec text    | -> | format/normalize | -> | validate         |
//! +------------------+    +------------------+    +------------------+
//!                                                          |
//!                                                          v
//! +------------------+    +------------------+    +------------------+
//! | store (records)  | <- | run task         | <- | queue (per URL)  |
//! +------------------+    | dispatch + check |    +------------------+
//!                         +------------------+
//!                                  |
//!                                  v publish
//!                         +------------------+
//!                         | reporters        |
//!                         +------------------+
//! ```
//!
//! Most users should use the `spectest` binary rather than importing `spectest-core`
//! directly.

pub mod check;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod http;
pub mod masking;
pub mod model;
pub mod normalize;
pub mod queue;
pub mod reporter;
pub mod runner;
pub mod service;
pub mod store;
pub mod validate;

// Re-export error handling crates
pub use eyre;

pub use config::{get_config, Config, EngineConfig};
pub use error::{Error, Result};
pub use format::Format;
pub use model::{RunRecord, RunStatus, Specification};
pub use reporter::{ListReporter, NullReporter, Reporter};
pub use runner::{Engine, Message, PendingRun, RunInfo, RunOutcome};
pub use service::Service;
pub use store::{MemoryStore, NewSpecification, Store};
pub use validate::ValidatedSpec;

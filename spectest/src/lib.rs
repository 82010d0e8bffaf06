//! # spectest - declarative HTTP test specifications
//!
//! spectest runs HTTP test specifications written in JSON, YAML or XML. Each
//! specification describes one request and the expectations on its response:
//!
//! ```yaml
//! url: https://api.example.com/users/1
//! method: GET
//! expectedStatusCode: 200
//! expectedMediaType: application/json
//! expectedBodyPaths:
//!   - expectedBodyPath: address.city
//!     expectedBodyValue: Berlin
//! ```
//!
//! ## Command line
//!
//! ```bash
//! spectest validate specs/*.yaml
//! spectest normalize specs/user.xml
//! spectest run specs/* --show-log
//! ```
//!
//! Runs against the same URL execute one after another, runs against different
//! URLs execute concurrently. `run` exits with an error unless every run passes.
//!
//! ## Library
//!
//! ```rust,no_run
//! use spectest::{eyre, Engine, MemoryStore, Service};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> eyre::Result<()> {
//!     let cfg = spectest::get_config();
//!     let engine = Engine::from_config(Arc::new(MemoryStore::new()), &cfg.engine)?;
//!     let service = Service::new(Arc::new(engine));
//!     service
//!         .create_spec("health", r#"{"url": "https://example.com", "method": "GET"}"#)
//!         .await?;
//!     let record = service.run_by_name("health").await?.into_record().await?;
//!     println!("{}", record.status);
//!     Ok(())
//! }
//! ```

mod app;

// Re-export error handling crates for user convenience
pub use eyre;

// Re-export main application struct
pub use app::{App, Color};

// Re-export core functionality
pub use spectest_core::{
    config::{get_config, Config, EngineConfig},
    http,
    model::{RunRecord, RunStatus, Specification},
    reporter::{ListReporter, NullReporter, Reporter},
    runner::{Engine, Message, PendingRun, RunInfo, RunOutcome},
    service::{BatchEntry, Service},
    store::{MemoryStore, NewSpecification, Store},
    Error, Format, Result,
};

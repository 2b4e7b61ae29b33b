//! Security Server Toolkit library.
//!
//! Drives security servers from a declarative YAML configuration to a fully
//! configured state through their admin REST API: anchor and initialization,
//! token login, timestamping, keys and certificates, then clients, services,
//! access rights and endpoints.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sstk_cli::{AutoConfigEngine, Config, OperationGraph};
//! use ss_admin::RateLimiter;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/sstk.yaml".as_ref())?;
//!     let engine = AutoConfigEngine::new(
//!         OperationGraph::build(),
//!         Arc::new(RateLimiter::new(config.rate_limit)),
//!         CancellationToken::new(),
//!     );
//!     let report = engine.auto(&config).await;
//!     println!("{}", sstk_cli::report::render(&report.runs));
//!     Ok(())
//! }
//! ```

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

pub mod commands;
pub mod config;
pub mod engine;
pub mod graph;
pub mod operations;
pub mod poll;
pub mod probe;
pub mod report;
pub mod status;
pub mod ui;
pub mod validator;

pub use config::{Config, SecurityServerConfig, WalkMode};
pub use engine::{AutoConfigEngine, AutoReport, ServerRun, WalkOutcome};
pub use graph::{GraphError, OperationGraph, OperationKind};
pub use status::StatusSnapshot;
pub use validator::{validate, ValidationError};

//! Security server administrative REST API client.
//!
//! This crate provides a typed async client for the `/api/v1` admin API of a
//! security server, the request/response models it exchanges, and the
//! per-host [`RateLimiter`] every outgoing call passes through.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ss_admin::{AdminClient, ClientOptions, RateLimiter};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let limiter = Arc::new(RateLimiter::default());
//!     let client = AdminClient::new(
//!         "https://ss1:4000/api/v1",
//!         "api-key",
//!         limiter,
//!         ClientOptions::default(),
//!     )?;
//!
//!     let status = client.initialization_status().await?;
//!     println!("anchor imported: {}", status.is_anchor_imported);
//!     Ok(())
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod client;
pub mod error;
pub mod models;
pub mod rate_limit;

pub use client::{origin_of, AdminClient, ClientOptions};
pub use error::ApiError;
pub use rate_limit::{RateLimitConfig, RateLimiter};

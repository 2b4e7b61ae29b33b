//! CLI subcommands.

pub mod apply;
pub mod auto;
pub mod operations;
pub mod status;
pub mod validate;

use std::sync::Arc;

use ss_admin::RateLimiter;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::AutoConfigEngine;
use crate::graph::OperationGraph;

/// Build an engine for a loaded configuration.
pub(crate) fn engine(
    config: &Config,
    graph: &OperationGraph,
    cancel: &CancellationToken,
) -> AutoConfigEngine {
    AutoConfigEngine::new(
        graph.clone(),
        Arc::new(RateLimiter::new(config.rate_limit)),
        cancel.clone(),
    )
}

//! Status command - probe every server without changing anything.

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::WalkOutcome;
use crate::graph::OperationGraph;
use crate::{report, ui};

/// Show the status of every security server.
#[derive(Args)]
pub struct StatusCommand {}

impl StatusCommand {
    /// Run the status command.
    ///
    /// # Errors
    ///
    /// Never fails once the configuration is loaded; unreachable servers are reported as skipped.
    pub async fn run(
        &self,
        config: &Config,
        graph: &OperationGraph,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let report = super::engine(config, graph, cancel).status(config).await;

        println!("{}", report::render(&report.runs));
        println!();
        for run in &report.runs {
            match &run.outcome {
                WalkOutcome::Pending { operation } => ui::print_kv(
                    &run.name,
                    &format!("next step {operation} ({})", operation.description()),
                ),
                WalkOutcome::Skipped { reason } => ui::print_kv(&run.name, reason),
                WalkOutcome::Denied { reason } => {
                    ui::print_kv(&run.name, &format!("permission denied: {reason}"));
                }
                outcome => ui::print_kv(&run.name, &outcome.to_string()),
            }
        }
        Ok(())
    }
}

//! Apply command - run one operation regardless of the graph.

use anyhow::{bail, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::WalkOutcome;
use crate::graph::{OperationGraph, OperationKind};
use crate::{report, ui};

/// Run a single operation on one or every security server.
#[derive(Args)]
pub struct ApplyCommand {
    /// Operation to run.
    #[arg(value_enum)]
    operation: OperationKind,

    /// Only run on this server.
    #[arg(short, long, value_name = "NAME")]
    server: Option<String>,
}

impl ApplyCommand {
    /// Run the apply command.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unknown or the operation failed or was blocked.
    pub async fn run(
        &self,
        config: &Config,
        graph: &OperationGraph,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if let Some(name) = &self.server {
            if config.single_server_view(name).is_none() {
                bail!("Unknown security server: {name}");
            }
        }

        ui::print_section(&format!(
            "{} ({})",
            self.operation,
            self.operation.description()
        ));

        let report = super::engine(config, graph, cancel)
            .apply(config, self.operation, self.server.as_deref())
            .await;

        println!();
        println!("{}", report::render(&report.runs));

        let unsuccessful = report
            .runs
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    WalkOutcome::Failed { .. }
                        | WalkOutcome::Blocked { .. }
                        | WalkOutcome::Denied { .. }
                )
            })
            .count();
        if unsuccessful > 0 {
            bail!("{} did not run on {unsuccessful} server(s)", self.operation);
        }
        Ok(())
    }
}

//! Auto command - walk every server towards its declared state.

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::graph::OperationGraph;
use crate::{report, ui};

/// Auto-configure every security server in the configuration.
#[derive(Args)]
pub struct AutoCommand {}

impl AutoCommand {
    /// Run the auto command.
    ///
    /// # Errors
    ///
    /// Returns an error if any server's walk failed.
    pub async fn run(
        &self,
        config: &Config,
        graph: &OperationGraph,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ui::print_section("Security Server Auto-Configuration");

        let report = super::engine(config, graph, cancel).auto(config).await;

        println!();
        println!("{}", report::render(&report.runs));

        let failed = report.failed_count();
        if failed > 0 {
            anyhow::bail!("{failed} server(s) failed");
        }
        Ok(())
    }
}

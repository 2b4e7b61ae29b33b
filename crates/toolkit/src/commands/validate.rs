//! Validate command - check the configuration without contacting servers.

use anyhow::{bail, Result};
use clap::Args;

use crate::config::Config;
use crate::graph::{OperationGraph, OperationKind};
use crate::ui;
use crate::validator::validate;

/// Validate the configuration of every security server.
#[derive(Args)]
pub struct ValidateCommand {
    /// Only validate the keys this operation needs.
    #[arg(short, long, value_enum)]
    operation: Option<OperationKind>,
}

impl ValidateCommand {
    /// Run the validate command.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation problem was found.
    pub fn run(&self, config: &Config, graph: &OperationGraph) -> Result<()> {
        let operations: Vec<OperationKind> = match self.operation {
            Some(operation) => vec![operation],
            None => graph.topological_order().to_vec(),
        };

        let mut problems = 0;
        for server in &config.security_server {
            ui::print_section(&format!("Security server '{}'", server.name));
            for &operation in &operations {
                if self.operation.is_none() && !operation.is_configured(server) {
                    continue;
                }
                let errors = validate(server, operation);
                let summary = errors
                    .iter()
                    .map(|e| format!("{}: {}", e.key, e.message))
                    .collect::<Vec<_>>()
                    .join("; ");
                ui::print_check_result(
                    operation.id(),
                    errors.is_empty(),
                    (!errors.is_empty()).then_some(summary.as_str()),
                );
                problems += errors.len();
            }
        }

        println!();
        if problems > 0 {
            bail!("Configuration has {problems} problem(s)");
        }
        ui::print_success("Configuration is valid");
        Ok(())
    }
}

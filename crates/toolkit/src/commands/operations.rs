//! Operations command - list operations in execution order.

use clap::Args;

use crate::graph::OperationGraph;
use crate::ui;

/// List operations in the order the engine walks them.
#[derive(Args)]
pub struct OperationsCommand {}

impl OperationsCommand {
    /// Run the operations command.
    pub fn run(&self, graph: &OperationGraph) {
        ui::print_section("Operations");
        for (i, operation) in graph.topological_order().iter().enumerate() {
            let requires: Vec<&str> = graph.predecessors(*operation).map(|p| p.id()).collect();
            let requires = if requires.is_empty() {
                String::new()
            } else {
                format!(" (after {})", requires.join(", "))
            };
            ui::print_numbered_step(
                i + 1,
                &format!("{operation}: {}{requires}", operation.description()),
            );
        }
    }
}

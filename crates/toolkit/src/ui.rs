//! UI helpers for the toolkit CLI.
//!
//! Consistent console output for progress lines during auto-configuration.

use colored::Colorize;

use crate::graph::OperationKind;

/// Print a section header.
pub fn print_section(title: &str) {
    println!();
    println!("{}", "═".repeat(70).bright_black());
    println!("{}", title.cyan().bold());
    println!("{}", "═".repeat(70).bright_black());
    println!();
}

/// Print the intent line for an operation about to run.
pub fn print_intent(operation: OperationKind, server: &str, reapplying: bool) {
    let suffix = if reapplying { " (re-applying)" } else { "" };
    println!(
        "{} {}{}",
        "▶".cyan(),
        format!("AUTO ['{operation}']->'{server}'").bold(),
        suffix.bright_black()
    );
}

/// Print a skipped server.
pub fn print_skipped(server: &str, reason: &str) {
    println!(
        "{} {} {}",
        "⚠".yellow().bold(),
        format!("SKIPPED '{server}':").yellow(),
        reason
    );
}

/// Print a step whose effect has not been observed yet.
pub fn print_pending(server: &str, operation: OperationKind) {
    println!(
        "{} '{server}': {} not yet complete, continue on the next run",
        "…".blue().bold(),
        operation.to_string().bold()
    );
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message.yellow());
}

/// Print an error message.
pub fn print_error(message: &str) {
    println!("{} {}", "✗".red().bold(), message.red());
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a key-value pair.
pub fn print_kv(key: &str, value: &str) {
    println!("  {} {}", format!("{key}:").bright_black(), value.green());
}

/// Print a numbered item.
pub fn print_numbered_step(num: usize, message: &str) {
    println!("  {}. {}", num.to_string().cyan(), message);
}

/// Print a check result.
pub fn print_check_result(name: &str, passed: bool, message: Option<&str>) {
    let status = if passed { "✓".green() } else { "✗".red() };

    let text = if let Some(msg) = message {
        format!("{name} - {msg}")
    } else {
        name.to_string()
    };

    println!("  {status} {text}");
}

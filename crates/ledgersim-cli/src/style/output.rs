//! One-line status messages.

use super::colors::SemanticStyle;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".success(), msg);
}

pub fn print_failure(msg: &str) {
    println!("{} {}", "✗".error(), msg);
}

pub fn print_warn(msg: &str) {
    println!("{} {}", "⚠".warning(), msg);
}

/// Prints the command that reproduces a seed.
pub fn print_reproduce(command: &str, seed: u64) {
    let command = format!("ledgersim {command} --seed {seed}");
    println!("  {} {}", "reproduce with:".muted(), command.code());
}

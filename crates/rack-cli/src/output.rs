//! Formatted diagnostics and exit codes for CLI commands.

use rack_common::error::RackError;

pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const CYAN: &str = "\x1b[36m";
pub const RED: &str = "\x1b[31m";
pub const RESET: &str = "\x1b[0m";

/// Prints one diagnostic line per error of a run.
pub fn print_errors(errors: &[RackError]) {
    for line in diagnostics(errors) {
        eprintln!("{RED}{BOLD}error:{RESET} {line}");
    }
}

/// Prints a command failure with its cause chain on one line.
pub fn print_failure(error: &anyhow::Error) {
    eprintln!("{RED}{BOLD}error:{RESET} {error:#}");
}

/// One line per error, interruptions left out.
pub fn diagnostics(errors: &[RackError]) -> Vec<String> {
    errors
        .iter()
        .filter(|e| !e.is_interrupted())
        .map(ToString::to_string)
        .collect()
}

/// Process status of a run: success when nothing failed, or when the only
/// outcome is an interruption.
pub fn exit_status(errors: &[RackError]) -> u8 {
    u8::from(errors.iter().any(|e| !e.is_interrupted()))
}

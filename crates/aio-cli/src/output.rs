// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! CLI output formatting with colors and styling.
//!
//! Respects NO_COLOR and FORCE_COLOR environment variables.
//! Colors are automatically disabled when output is piped.

use colored::{ColoredString, Colorize};

/// Initialize color support based on environment.
/// Call once at startup.
pub fn init() {
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    } else if std::env::var("FORCE_COLOR").is_ok() {
        colored::control::set_override(true);
    }
}

// === Errors ===

pub fn error_label() -> ColoredString {
    "error".red().bold()
}

pub fn hint_label() -> ColoredString {
    "hint".cyan()
}

// === Run summaries ===

pub fn banner_ok(what: &str) -> String {
    format!(
        "{} {} {}",
        "===".dimmed(),
        format!("{} OK", what).green().bold(),
        "===".dimmed()
    )
}

pub fn status_pass() -> ColoredString {
    "✓".green()
}

pub fn task_id(id: impl std::fmt::Display) -> ColoredString {
    id.to_string().blue()
}

pub fn elapsed(d: std::time::Duration) -> ColoredString {
    format!("{:.1}ms", d.as_secs_f64() * 1000.0).dimmed()
}

pub fn address(addr: impl std::fmt::Display) -> ColoredString {
    addr.to_string().underline()
}

// === Help ===

pub fn title(name: &str) -> ColoredString {
    name.bold()
}

pub fn version(v: &str) -> ColoredString {
    v.dimmed()
}

pub fn section_header(header: &str) -> ColoredString {
    header.yellow().bold()
}

pub fn command(name: &str) -> ColoredString {
    name.green()
}

pub fn arg(name: &str) -> ColoredString {
    name.cyan()
}

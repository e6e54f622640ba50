//! Operator-facing terminal output
//!
//! Progress of a run is printed for the operator with owo-colors and
//! indicatif. Anything only useful when debugging goes through `tracing`,
//! which `--verbose` turns up.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::time::Duration;

const TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ";

/// Phase banner, e.g. `==> download (9 units)`.
pub fn action(message: &str) {
    println!("{} {}", "==>".blue().bold(), message.bold());
}

/// Unit header inside a phase, e.g. `[2/9] osm2pgsqlbuild`.
pub fn action_numbered(current: usize, total: usize, unit: &str) {
    let counter = format!("[{}/{}]", current, total);
    println!("{} {}", counter.cyan(), unit.bold());
}

/// A step a unit is taking.
pub fn sub_action(message: &str) {
    println!("  {} {}", "->".cyan(), message);
}

pub fn detail(message: &str) {
    println!("     {}", message.dimmed());
}

/// Work found already done.
pub fn skip(message: &str) {
    println!("  {} {}", "--".dimmed(), message.dimmed());
}

pub fn info(message: &str) {
    println!("{} {}", "::".cyan(), message);
}

pub fn success(message: &str) {
    println!("{} {}", "==>".green().bold(), message.green());
}

pub fn warning(message: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), message);
}

pub fn error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message.red());
}

/// Ask a yes/no question; anything but an explicit yes is a no.
pub fn confirm(question: &str) -> Result<bool> {
    inquire::Confirm::new(question)
        .with_default(false)
        .prompt()
        .with_context(|| format!("no answer to: {}", question))
}

/// Wait for the operator to press enter.
pub fn pause(message: &str) -> Result<()> {
    inquire::Text::new(message)
        .with_help_message("press enter to continue")
        .prompt()
        .with_context(|| format!("no answer to: {}", message))?;
    Ok(())
}

fn style(template: &str) -> ProgressStyle {
    match ProgressStyle::with_template(template) {
        Ok(style) => style.tick_chars(TICKS).progress_chars("=> "),
        Err(_) => ProgressStyle::default_spinner(),
    }
}

/// Spinner for work of unknown length. Call `finish_and_clear` when done.
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner()
        .with_style(style("     {spinner:.cyan} {msg}"))
        .with_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Turn a spinner into a byte counter once the size is known.
pub fn upgrade_to_bytes(pb: &ProgressBar, total_bytes: u64) {
    pb.set_length(total_bytes);
    pb.set_style(style(
        "     {spinner:.cyan} {msg} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec}",
    ));
}

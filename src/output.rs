//! CLI output formatting.
//!
//! Output leads with what the user asked about (the source, or the rendition
//! path that would be displayed) and shows supporting detail as indented
//! context lines.
//!
//! # Output Format
//!
//! ## Resolve
//!
//! ```text
//! /tmp/pixboard/3f2a…e1.gif.nearest.gif
//!     Hash: 3f2a9c0d81b4
//!     Rendition: nearest (converted)
//! ```
//!
//! ## Show
//!
//! ```text
//! 001 photo.png
//!     Showing: /tmp/pixboard/3f2a…e1.gif.nearest.gif
//! 002 notes.txt
//!     Failed: cannot decode source: notes.txt is not a recognized image
//!     Restored: /tmp/pixboard/3f2a…e1.gif.nearest.gif
//!
//! Cache: 1 cached, 1 converted, 1 failed (3 total)
//! ```
//!
//! # Architecture
//!
//! Each result has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::cache::CacheStats;
use crate::display::Presented;
use crate::pipeline::{Outcome, Resolved};
use std::error::Error;
use std::path::{Path, PathBuf};

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// First 12 hex digits: enough to tell entries apart by eye.
fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}

fn outcome_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Cached => "cached",
        Outcome::Converted => "converted",
    }
}

/// The error message followed by each distinct `source()` in its chain.
fn error_chain(err: &dyn Error) -> Vec<String> {
    let mut messages = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        let msg = cause.to_string();
        if !messages.iter().any(|m| m.contains(&msg)) {
            messages.push(msg);
        }
        source = cause.source();
    }
    messages
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// Resolve
// ============================================================================

pub fn format_resolved(resolved: &Resolved) -> Vec<String> {
    vec![
        resolved.path.display().to_string(),
        format!("    Hash: {}", short_hash(resolved.hash.as_str())),
        format!(
            "    Rendition: {} ({})",
            resolved.rendition,
            outcome_label(resolved.outcome)
        ),
    ]
}

pub fn print_resolved(resolved: &Resolved) {
    print_lines(format_resolved(resolved));
}

pub fn format_resolved_json(resolved: &Resolved) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(resolved)
}

/// A failed resolve: the source label, then the error and its causes.
pub fn format_failure(source: &str, err: &dyn Error) -> Vec<String> {
    let mut chain = error_chain(err).into_iter();
    let mut lines = vec![format!(
        "{}: {}",
        source,
        chain.next().unwrap_or_default()
    )];
    lines.extend(chain.map(|cause| format!("    Caused by: {}", cause)));
    lines
}

// ============================================================================
// Show
// ============================================================================

/// One step of a display session.
pub fn format_show_step(index: usize, source: &str, presented: &Presented) -> Vec<String> {
    let mut lines = vec![format!("{} {}", format_index(index), source)];
    match presented {
        Presented::Shown(path) => {
            lines.push(format!("    Showing: {}", path.display()));
        }
        Presented::Restored { path, error } => {
            lines.push(format!("    Failed: {}", error));
            match path {
                Some(p) => lines.push(format!("    Restored: {}", p.display())),
                None => lines.push("    Restored: nothing".to_string()),
            }
        }
    }
    lines
}

pub fn print_show_step(index: usize, source: &str, presented: &Presented) {
    print_lines(format_show_step(index, source, presented));
}

pub fn format_stats(stats: &CacheStats) -> String {
    format!("Cache: {}", stats)
}

// ============================================================================
// Maintenance commands
// ============================================================================

pub fn format_clear(removed: usize, dir: &Path) -> String {
    let noun = if removed == 1 { "entry" } else { "entries" };
    format!("Cleared {} {} from {}", removed, noun, dir.display())
}

/// Everything `check` verified.
#[derive(Debug, Clone)]
pub struct CheckReport {
    /// Config file that was loaded, `None` when running on defaults.
    pub config: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub cache_files: usize,
    pub converter: String,
    /// Resolved program path for external converters.
    pub program: Option<PathBuf>,
}

pub fn format_check(report: &CheckReport) -> Vec<String> {
    let mut lines = vec!["Config".to_string()];
    match &report.config {
        Some(path) => lines.push(format!("    {}", path.display())),
        None => lines.push("    (defaults)".to_string()),
    }

    lines.push("Cache".to_string());
    lines.push(format!(
        "    {} ({} files)",
        report.cache_dir.display(),
        report.cache_files
    ));

    lines.push("Converter".to_string());
    match &report.program {
        Some(program) => lines.push(format!(
            "    {} \u{2192} {}",
            report.converter,
            program.display()
        )),
        None => lines.push(format!("    {}", report.converter)),
    }
    lines
}

pub fn print_check(report: &CheckReport) {
    print_lines(format_check(report));
}

//! CLI output formatting for all pipeline stages.
//!
//! Every image leads with its 1-based position in the manifest and its
//! title; file paths and numbers follow as indented context lines.
//!
//! # Output Format
//!
//! ## Scan
//!
//! ```text
//! Maps
//! 001 canal street (14x20)
//!     Source: maps/canal_street.14x20.jpg
//! 002 old watermill (no grid)
//!     Source: maps/old_watermill.jpg
//!
//! Found 2 maps
//! ```
//!
//! ## Process
//!
//! ```text
//! 001 canal street (14x20)
//!     Boxes: 216
//! 002 big cave (50x50)
//!     Shards: 2
//! 003 broken
//!     Unusable: maps/broken.10x10.jpg
//! ```
//!
//! # Architecture
//!
//! Each stage has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure and
//! do no I/O.

use crate::metadata::ImageMetadata;
use crate::pipeline::{ProcessEvent, RunSummary};
use crate::types::Manifest;
use std::path::Path;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Grid label: `14x20`, or `no grid` while unresolved.
fn grid_label(columns: u32, rows: u32) -> String {
    if columns == 1 && rows == 1 {
        "no grid".to_string()
    } else {
        format!("{}x{}", columns, rows)
    }
}

/// Header line for one image: index, title and grid.
///
/// Untitled images show their file name instead.
///
/// ```text
/// 001 canal street (14x20)
/// 002 (keep.jpg) (no grid)
/// ```
fn image_line(index: usize, title: &str, path: &str, columns: u32, rows: u32) -> String {
    let name = if title.is_empty() {
        let file = Path::new(path)
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        format!("({})", file)
    } else {
        title.to_string()
    };
    format!(
        "{} {} ({})",
        format_index(index),
        name,
        grid_label(columns, rows)
    )
}

fn meta_line(index: usize, meta: &ImageMetadata) -> String {
    image_line(index, meta.title(), &meta.path, meta.columns(), meta.rows())
}

// ============================================================================
// Ingest
// ============================================================================

/// Format the records stored by ingestion.
pub fn format_ingest_output(stored: &[ImageMetadata], skipped: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, meta) in stored.iter().enumerate() {
        lines.push(meta_line(i + 1, meta));
        lines.push(format!("    Source: {}", meta.source_url()));
        lines.push(format!("    Saved: {}", meta.path));
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "Downloaded {} maps, skipped {} posts",
        stored.len(),
        skipped
    ));
    lines
}

pub fn print_ingest_output(stored: &[ImageMetadata], skipped: usize) {
    for line in format_ingest_output(stored, skipped) {
        println!("{}", line);
    }
}

// ============================================================================
// Stage 1: Scan output
// ============================================================================

/// Format scan stage output: one entry per map found.
pub fn format_scan_output(manifest: &Manifest) -> Vec<String> {
    let mut lines = Vec::new();
    if !manifest.images.is_empty() {
        lines.push("Maps".to_string());
        for (i, meta) in manifest.images.iter().enumerate() {
            lines.push(meta_line(i + 1, meta));
            lines.push(format!("    Source: {}", meta.path));
        }
        lines.push(String::new());
    }
    let n = manifest.images.len();
    lines.push(format!(
        "Found {} {}",
        n,
        if n == 1 { "map" } else { "maps" }
    ));
    lines
}

/// Print scan output to stdout.
pub fn print_scan_output(manifest: &Manifest) {
    for line in format_scan_output(manifest) {
        println!("{}", line);
    }
}

// ============================================================================
// Stage 2: Process output
// ============================================================================

/// Format a single process progress event as display lines.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::ImageProcessed {
            index,
            title,
            path,
            columns,
            rows,
            boxes,
            shards,
        } => {
            let mut lines = vec![image_line(*index, title, path, *columns, *rows)];
            if *shards > 0 {
                lines.push(format!("    Shards: {}", shards));
            } else {
                lines.push(format!("    Boxes: {}", boxes));
            }
            lines
        }
        ProcessEvent::ImageUnusable { index, title, path } => {
            vec![
                format!("{} {}", format_index(*index), title),
                format!("    Unusable: {}", path),
            ]
        }
        ProcessEvent::ShardFailed {
            index,
            path,
            rect,
            error,
        } => {
            vec![format!(
                "{} crop {}x{}+{}+{} of {} failed: {}",
                format_index(*index),
                rect.width(),
                rect.height(),
                rect.x_min,
                rect.y_min,
                path,
                error
            )]
        }
    }
}

/// Format the closing summary of a process run.
pub fn format_run_summary(summary: &RunSummary) -> Vec<String> {
    let mut lines = vec![format!("Processed: {}", summary)];
    for path in &summary.unusable {
        lines.push(format!("    Unusable: {}", path));
    }
    lines
}

pub fn print_run_summary(summary: &RunSummary) {
    for line in format_run_summary(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Stage 3: Export output
// ============================================================================

pub fn format_export_output(count: usize, output: &Path) -> Vec<String> {
    vec![format!(
        "Exported {} documents \u{2192} {}",
        count,
        output.display()
    )]
}

pub fn print_export_output(count: usize, output: &Path) {
    for line in format_export_output(count, output) {
        println!("{}", line);
    }
}

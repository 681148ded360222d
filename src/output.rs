//! CLI output formatting.
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.
//!
//! # Output Format
//!
//! ## Export
//!
//! ```text
//! Artifacts
//! 001 pages → site/src/data/pages.json
//! 002 blogArticles → site/src/data/blog-articles.json (from snapshot)
//! 003 catRows → site/src/data/cat-rows.json (empty)
//! 004 settings → site/src/data/settings.json
//! Snapshot → data/cms-snapshot.json
//! ```
//!
//! ## Build
//!
//! ```text
//! Dependencies: installed
//! Published 42 files (1.3 MB) → public
//! Build complete in 8.2s
//! ```

use crate::export::{ExportSummary, ValueSource};
use crate::pipeline::BuildReport;
use crate::types::{BuildResult, BuildState};
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Show `path` relative to `base` when possible.
fn display_path(path: &Path, base: Option<&Path>) -> String {
    base.and_then(|b| path.strip_prefix(b).ok())
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Human-readable byte count.
fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

// ============================================================================
// Export
// ============================================================================

pub fn format_export_output(summary: &ExportSummary, base: Option<&Path>) -> Vec<String> {
    let mut lines = vec!["Artifacts".to_string()];
    for (i, artifact) in summary.artifacts.iter().enumerate() {
        let note = match artifact.source {
            ValueSource::Request => "",
            ValueSource::Snapshot => " (from snapshot)",
            ValueSource::Empty => " (empty)",
        };
        lines.push(format!(
            "{} {} → {}{}",
            format_index(i + 1),
            artifact.category.label(),
            display_path(&artifact.path, base),
            note
        ));
    }
    lines.push(format!(
        "Snapshot → {}",
        display_path(&summary.snapshot_file, base)
    ));
    lines
}

pub fn print_export_output(summary: &ExportSummary, base: Option<&Path>) {
    for line in format_export_output(summary, base) {
        println!("{}", line);
    }
}

// ============================================================================
// Build
// ============================================================================

pub fn format_build_output(report: &BuildReport, base: Option<&Path>) -> Vec<String> {
    let mut lines = format_export_output(&report.export, base);
    lines.push(format!(
        "Dependencies: {}",
        if report.installed {
            "installed"
        } else {
            "up to date"
        }
    ));
    lines.push(format!(
        "Published {} files ({}) → {}",
        report.published.files,
        format_bytes(report.published.bytes),
        display_path(&report.publish_dir, base)
    ));
    lines.push(format!(
        "Build complete in {:.1}s",
        report.duration.as_secs_f64()
    ));
    lines
}

pub fn print_build_output(report: &BuildReport, base: Option<&Path>) {
    for line in format_build_output(report, base) {
        println!("{}", line);
    }
}

// ============================================================================
// Status
// ============================================================================

/// One-line summary of a coordinator state, used in shutdown logging.
pub fn format_status_line(state: &BuildState) -> String {
    let phase = if state.in_progress {
        if state.queue_depth > 0 {
            format!("building ({} queued)", state.queue_depth)
        } else {
            "building".to_string()
        }
    } else {
        "idle".to_string()
    };
    let last = match (state.last_result, state.last_build_time) {
        (Some(BuildResult::Success), Some(t)) => {
            format!("last build succeeded at {}", t.to_rfc3339())
        }
        (Some(BuildResult::Failure), Some(t)) => {
            format!("last build failed at {}", t.to_rfc3339())
        }
        _ => "no builds yet".to_string(),
    };
    format!("{phase}, {last}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ArtifactWrite;
    use crate::publish::PublishSummary;
    use crate::types::Category;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;
    use std::time::Duration;

    fn summary() -> ExportSummary {
        let dir = PathBuf::from("/cms/site/src/data");
        ExportSummary {
            artifacts: vec![
                ArtifactWrite {
                    category: Category::Pages,
                    path: dir.join("pages.json"),
                    source: ValueSource::Request,
                },
                ArtifactWrite {
                    category: Category::BlogArticles,
                    path: dir.join("blog-articles.json"),
                    source: ValueSource::Snapshot,
                },
                ArtifactWrite {
                    category: Category::CatRows,
                    path: dir.join("cat-rows.json"),
                    source: ValueSource::Empty,
                },
            ],
            snapshot_file: PathBuf::from("/cms/data/cms-snapshot.json"),
        }
    }

    #[test]
    fn export_lines_relative_to_base() {
        let lines = format_export_output(&summary(), Some(Path::new("/cms")));
        assert_eq!(
            lines,
            vec![
                "Artifacts",
                "001 pages → site/src/data/pages.json",
                "002 blogArticles → site/src/data/blog-articles.json (from snapshot)",
                "003 catRows → site/src/data/cat-rows.json (empty)",
                "Snapshot → data/cms-snapshot.json",
            ]
        );
    }

    #[test]
    fn export_lines_absolute_without_base() {
        let lines = format_export_output(&summary(), None);
        assert_eq!(lines[1], "001 pages → /cms/site/src/data/pages.json");
    }

    #[test]
    fn build_lines_include_publish_summary() {
        let report = BuildReport {
            export: summary(),
            installed: true,
            published: PublishSummary {
                files: 3,
                bytes: 2048,
            },
            publish_dir: PathBuf::from("/cms/public"),
            duration: Duration::from_millis(1500),
        };
        let lines = format_build_output(&report, Some(Path::new("/cms")));
        let tail = &lines[lines.len() - 3..];
        assert_eq!(tail[0], "Dependencies: installed");
        assert_eq!(tail[1], "Published 3 files (2.0 KB) → public");
        assert_eq!(tail[2], "Build complete in 1.5s");
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn status_line_idle_without_builds() {
        assert_eq!(
            format_status_line(&BuildState::default()),
            "idle, no builds yet"
        );
    }

    #[test]
    fn status_line_building_with_queue() {
        let state = BuildState {
            in_progress: true,
            queue_depth: 2,
            last_result: Some(BuildResult::Failure),
            last_build_time: Some(Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()),
            last_error: Some("boom".into()),
        };
        assert_eq!(
            format_status_line(&state),
            "building (2 queued), last build failed at 2026-01-02T03:04:05+00:00"
        );
    }
}

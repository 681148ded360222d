//! Artifact export and snapshot persistence.
//!
//! Step 1 of every build. The posted CMS data is resolved against the last
//! snapshot, each exported category is written to its own JSON file for the
//! downstream site generator, and the resolved payload becomes the new
//! snapshot.
//!
//! ## Output Structure
//!
//! ```text
//! <export_dir>/
//! ├── pages.json
//! ├── blog-articles.json
//! ├── cat-rows.json
//! └── settings.json
//!
//! <snapshot_file>              # all categories, including uploads
//! ```
//!
//! Files are overwritten in place, one after another. A failure halfway
//! through leaves the categories written so far on disk; the next build
//! rewrites all of them.

use crate::types::{Category, CmsData};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize {category}: {source}")]
    Serialize {
        category: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Where [`export`] writes.
#[derive(Debug, Clone)]
pub struct ExportTarget {
    pub export_dir: PathBuf,
    pub snapshot_file: PathBuf,
}

/// What a completed export wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// One entry per exported category, in write order.
    pub artifacts: Vec<ArtifactWrite>,
    pub snapshot_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactWrite {
    pub category: Category,
    pub path: PathBuf,
    pub source: ValueSource,
}

/// Where an exported category's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Request,
    Snapshot,
    Empty,
}

/// Read the snapshot file.
///
/// Returns `None` when the file is missing or unreadable; a corrupt snapshot
/// is logged and ignored rather than failing the build.
pub fn load_snapshot(path: &Path) -> Option<CmsData> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "snapshot unreadable, ignoring");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(data) => Some(data),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "snapshot corrupt, ignoring");
            None
        }
    }
}

/// Fill every category the request omitted from the snapshot.
///
/// Categories present in `data` are kept as-is, even when empty.
pub fn resolve(data: CmsData, snapshot: Option<CmsData>) -> CmsData {
    match snapshot {
        Some(snapshot) => snapshot.overlay(data),
        None => data,
    }
}

/// Resolve `data` against the snapshot on disk, write every artifact, then
/// write the new snapshot.
pub fn export(data: CmsData, target: &ExportTarget) -> Result<ExportSummary, ExportError> {
    let snapshot = load_snapshot(&target.snapshot_file);
    let resolved = resolve(data.clone(), snapshot);

    create_dir(&target.export_dir)?;

    let mut artifacts = Vec::with_capacity(Category::ALL.len());
    for category in Category::ALL {
        let (value, source) = match (data.get(category), resolved.get(category)) {
            (Some(v), _) => (v.clone(), ValueSource::Request),
            (None, Some(v)) => (v.clone(), ValueSource::Snapshot),
            (None, None) => (category.empty_value(), ValueSource::Empty),
        };
        let path = target.export_dir.join(category.file_name());
        write_json(&path, category.label(), &value)?;
        debug!(category = category.label(), path = %path.display(), ?source, "artifact written");
        artifacts.push(ArtifactWrite {
            category,
            path,
            source,
        });
    }

    if let Some(parent) = target.snapshot_file.parent() {
        create_dir(parent)?;
    }
    let snapshot_value = serde_json::to_value(&resolved).map_err(|source| {
        ExportError::Serialize {
            category: "snapshot",
            source,
        }
    })?;
    write_json(&target.snapshot_file, "snapshot", &snapshot_value)?;

    Ok(ExportSummary {
        artifacts,
        snapshot_file: target.snapshot_file.clone(),
    })
}

fn create_dir(path: &Path) -> Result<(), ExportError> {
    fs::create_dir_all(path).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json(path: &Path, category: &'static str, value: &Value) -> Result<(), ExportError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|source| ExportError::Serialize { category, source })?;
    fs::write(path, json).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

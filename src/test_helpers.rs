//! Shared test utilities for the cms-rebuild test suite.
//!
//! Provides a sample CMS payload, a temp-dir pipeline layout, and JSON
//! readers so module tests stay focused on behavior.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let settings = test_settings(tmp.path());
//! export(sample_data(), &settings.export).unwrap();
//! assert_eq!(read_json(&settings.export.export_dir.join("pages.json")), json!([{"id": 1}]));
//! ```

use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;

use crate::export::ExportTarget;
use crate::pipeline::PipelineSettings;
use crate::types::{BuildRequest, CmsData};

/// `{pages:[{id:1}], blogArticles:[], catRows:[], settings:{siteTitle:"X"}}`
pub fn sample_data() -> CmsData {
    CmsData {
        pages: Some(json!([{"id": 1}])),
        blog_articles: Some(json!([])),
        cat_rows: Some(json!([])),
        settings: Some(json!({"siteTitle": "X"})),
        uploads: None,
    }
}

pub fn request(data: CmsData) -> BuildRequest {
    BuildRequest {
        timestamp: None,
        trigger: Some("test".to_string()),
        data,
    }
}

/// Pipeline layout rooted at `root`, with `install` and `build` as the
/// command names the mock runner matches on.
pub fn test_settings(root: &Path) -> PipelineSettings {
    let site_dir = root.join("site");
    std::fs::create_dir_all(&site_dir).unwrap();
    PipelineSettings {
        export: ExportTarget {
            export_dir: site_dir.join("src/data"),
            snapshot_file: root.join("data/cms-snapshot.json"),
        },
        build_output: site_dir.join("dist"),
        dependency_dir: site_dir.join("node_modules"),
        publish_dir: root.join("public"),
        site_dir,
        install_command: "install".to_string(),
        build_command: "build".to_string(),
        timeout: Duration::from_secs(5),
    }
}

/// Parse a JSON file. Panics with the path on failure.
pub fn read_json(path: &Path) -> Value {
    let content = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    serde_json::from_str(&content)
        .unwrap_or_else(|e| panic!("invalid JSON in {}: {e}", path.display()))
}

//! Shared types exchanged between the HTTP surface, the coordinator, and the
//! pipeline.
//!
//! Field names on the wire are camelCase because the CMS editor that posts
//! build requests is a browser application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /api/build`.
///
/// Every field is optional: an editor may trigger a rebuild without sending
/// any data, in which case the last snapshot on disk is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildRequest {
    /// Client-side timestamp, informational only.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Free-form label for what caused the build (e.g. `"save-page"`).
    #[serde(default)]
    pub trigger: Option<String>,
    /// `"data": null` behaves like an omitted field.
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: CmsData,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// CMS state as posted by the editor.
///
/// Each category is opaque JSON. `None` means the client did not send that
/// category; an explicit `null` on the wire deserializes to `None` as well.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmsData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blog_articles: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cat_rows: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploads: Option<Value>,
}

impl CmsData {
    /// True when no category was provided at all.
    pub fn is_empty(&self) -> bool {
        self.pages.is_none()
            && self.blog_articles.is_none()
            && self.cat_rows.is_none()
            && self.settings.is_none()
            && self.uploads.is_none()
    }

    /// Layer `newer` on top of `self`: categories present in `newer` win,
    /// categories it omits keep their current value.
    ///
    /// Used to fold every request received during a build into the single
    /// follow-up build.
    pub fn overlay(self, newer: CmsData) -> CmsData {
        CmsData {
            pages: newer.pages.or(self.pages),
            blog_articles: newer.blog_articles.or(self.blog_articles),
            cat_rows: newer.cat_rows.or(self.cat_rows),
            settings: newer.settings.or(self.settings),
            uploads: newer.uploads.or(self.uploads),
        }
    }

    /// Value for an exported category, if present.
    pub fn get(&self, category: Category) -> Option<&Value> {
        match category {
            Category::Pages => self.pages.as_ref(),
            Category::BlogArticles => self.blog_articles.as_ref(),
            Category::CatRows => self.cat_rows.as_ref(),
            Category::Settings => self.settings.as_ref(),
        }
    }
}

/// A CMS data category that is exported as its own artifact file.
///
/// `uploads` is deliberately absent: it only travels in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Pages,
    BlogArticles,
    CatRows,
    Settings,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Pages,
        Category::BlogArticles,
        Category::CatRows,
        Category::Settings,
    ];

    /// Artifact file name inside the export directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Category::Pages => "pages.json",
            Category::BlogArticles => "blog-articles.json",
            Category::CatRows => "cat-rows.json",
            Category::Settings => "settings.json",
        }
    }

    /// Value written when neither the request nor the snapshot has data.
    pub fn empty_value(self) -> Value {
        match self {
            Category::Settings => Value::Object(Default::default()),
            _ => Value::Array(Vec::new()),
        }
    }

    /// Wire name, matching the camelCase key in [`CmsData`].
    pub fn label(self) -> &'static str {
        match self {
            Category::Pages => "pages",
            Category::BlogArticles => "blogArticles",
            Category::CatRows => "catRows",
            Category::Settings => "settings",
        }
    }
}

/// What happens to a build request when it reaches the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildAcceptance {
    /// The pipeline was started for this request.
    Building { timestamp: DateTime<Utc> },
    /// A build is running; a follow-up is now owed.
    Queued { queue_length: usize },
    /// A build is running and the coordinator rejects overlapping requests.
    Conflict,
}

/// Terminal result of the most recent pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildResult {
    Success,
    Failure,
}

/// Point-in-time view of the coordinator, served by `GET /api/build/status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildState {
    #[serde(rename = "isBuildInProgress")]
    pub in_progress: bool,
    pub last_build_time: Option<DateTime<Utc>>,
    #[serde(rename = "queueLength")]
    pub queue_depth: usize,
    pub last_result: Option<BuildResult>,
    pub last_error: Option<String>,
}

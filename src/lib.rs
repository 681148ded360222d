//! # cms-rebuild
//!
//! Build coordinator for a CMS-driven static site. The browser editor posts
//! its state; the coordinator writes it out as JSON for the site generator,
//! rebuilds the site, and publishes the result, one build at a time.
//!
//! # Architecture: Four-Step Pipeline
//!
//! Every build runs the same steps, each feeding the next through the
//! filesystem:
//!
//! ```text
//! 1. Export    request data  →  <export_dir>/*.json + snapshot
//! 2. Install   package.json  →  node_modules/        (only when needed)
//! 3. Build     site_dir      →  <site_dir>/dist/
//! 4. Publish   dist/         →  <publish_dir>/
//! ```
//!
//! Around the pipeline sits the [`coordinator`], which owns the build state
//! and decides what happens to requests arriving mid-build, and the
//! [`server`], which exposes it over HTTP.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`coordinator`] | Build state, queue policy, at-most-one-build sequencing |
//! | [`pipeline`] | The four steps and the [`pipeline::BuildError`] taxonomy |
//! | [`export`] | Artifact files, snapshot persistence and fallback |
//! | [`deps`] | Whether the site's dependencies must be (re)installed |
//! | [`publish`] | Staged copy of the build output into the served directory |
//! | [`runner`] | [`runner::ProcessRunner`] capability and the shell implementation |
//! | [`server`] | axum routes: build trigger, status, CORS, static site |
//! | [`config`] | `cms-rebuild.toml` loading, merging, and validation |
//! | [`types`] | Wire types shared by the HTTP layer and the pipeline |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Coalescing Over Replay
//!
//! Requests that arrive during a build do not each get a build of their
//! own. They are folded into a single owed follow-up: its data is the
//! overlay of everything queued, and categories nobody sent come from the
//! snapshot. Three saves during one build cost one extra build, not three.
//! Deployments that prefer to push back on the editor can set
//! `queue_policy = "reject"` and get a 409 instead.
//!
//! ## Snapshot Fallback
//!
//! The last resolved payload is kept on disk. A request with no data (e.g.
//! a "rebuild" button) still produces a full site, and an editor that only
//! sends the category it changed does not wipe the others.
//!
//! ## Injectable Process Runner
//!
//! The pipeline never spawns processes directly. It calls a
//! [`runner::ProcessRunner`], so tests drive the full coordinator with a
//! recording mock and no Node toolchain.
//!
//! ## Staged Publish
//!
//! The served directory is replaced by renaming a fully copied staging
//! directory into place. A failed build or failed copy leaves the live
//! site exactly as it was.

pub mod config;
pub mod coordinator;
pub mod deps;
pub mod export;
pub mod output;
pub mod pipeline;
pub mod publish;
pub mod runner;
pub mod server;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

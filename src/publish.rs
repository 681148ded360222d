//! Publishing the built site into the served directory.
//!
//! The build output is first copied into a staging directory next to the
//! publish directory, then swapped in with two renames:
//!
//! ```text
//! public/            -> .public.previous/   (removed afterwards)
//! .public.staging/   -> public/
//! ```
//!
//! A copy that fails halfway never touches the live directory. The swap
//! needs the staging directory on the same filesystem as `public/`, which
//! is why it is a sibling rather than a temp dir.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// What a publish copied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub files: usize,
    pub bytes: u64,
}

fn sibling(publish_dir: &Path, suffix: &str) -> io::Result<PathBuf> {
    let name = publish_dir.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("publish dir has no name: {}", publish_dir.display()),
        )
    })?;
    Ok(publish_dir.with_file_name(format!(".{}.{suffix}", name.to_string_lossy())))
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Copy every file under `src` into `dst`, creating directories as needed.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<PublishSummary> {
    let mut summary = PublishSummary::default();
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            summary.bytes += fs::copy(entry.path(), &target)?;
            summary.files += 1;
        }
    }
    Ok(summary)
}

/// Replace `publish_dir` with a copy of `build_output`.
pub fn publish(build_output: &Path, publish_dir: &Path) -> io::Result<PublishSummary> {
    if !build_output.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("build output missing: {}", build_output.display()),
        ));
    }
    let staging = sibling(publish_dir, "staging")?;
    let previous = sibling(publish_dir, "previous")?;
    if let Some(parent) = publish_dir.parent() {
        fs::create_dir_all(parent)?;
    }

    remove_if_exists(&staging)?;
    let summary = match copy_tree(build_output, &staging) {
        Ok(s) => s,
        Err(e) => {
            if let Err(cleanup) = remove_if_exists(&staging) {
                warn!(
                    path = %staging.display(),
                    error = %cleanup,
                    "could not remove staging dir"
                );
            }
            return Err(e);
        }
    };

    remove_if_exists(&previous)?;
    if publish_dir.exists() {
        fs::rename(publish_dir, &previous)?;
    }
    if let Err(e) = fs::rename(&staging, publish_dir) {
        // Put the old site back so visitors keep getting something
        if previous.exists() {
            let _ = fs::rename(&previous, publish_dir);
        }
        return Err(e);
    }
    // The new site is live from here on; a leftover copy is only clutter.
    if let Err(e) = remove_if_exists(&previous) {
        warn!(path = %previous.display(), error = %e, "could not remove previous site");
    }

    Ok(summary)
}

//! Dependency install detection for the downstream site.
//!
//! Installing dependencies is slow, so the pipeline only runs the install
//! command when it has to. "Installed" means two things:
//!
//! 1. The dependency directory (`node_modules` by default) exists.
//! 2. The install stamp inside it matches the current dependency manifest.
//!
//! ## Stamp
//!
//! After a successful install the pipeline writes
//! `<dependency_dir>/.cms-rebuild-install` containing the SHA-256 of the
//! project's `package.json` and lockfile (whichever exist, in a fixed
//! order). Editing either file changes the hash and forces a reinstall on
//! the next build. Content-based rather than mtime-based so it survives a
//! `git checkout`.
//!
//! A dependency directory without a stamp (installed by hand) is trusted
//! as long as there is nothing to hash it against.

use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

/// Stamp file name within the dependency directory.
const STAMP_FILENAME: &str = ".cms-rebuild-install";

/// Files that define the dependency set, hashed in this order.
const MANIFEST_FILES: [&str; 2] = ["package.json", "package-lock.json"];

/// SHA-256 over the dependency manifests present in `site_dir`, as hex.
///
/// Returns `None` when none of them exist.
pub fn manifest_hash(site_dir: &Path) -> io::Result<Option<String>> {
    let mut hasher = Sha256::new();
    let mut found = false;
    for name in MANIFEST_FILES {
        let path = site_dir.join(name);
        match std::fs::read(&path) {
            Ok(bytes) => {
                found = true;
                hasher.update(name.as_bytes());
                hasher.update(b"\0");
                hasher.update((bytes.len() as u64).to_le_bytes());
                hasher.update(&bytes);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(found.then(|| format!("{:x}", hasher.finalize())))
}

/// Path of the install stamp for a dependency directory.
pub fn stamp_path(dependency_dir: &Path) -> PathBuf {
    dependency_dir.join(STAMP_FILENAME)
}

/// Decide whether the install command has to run before building.
pub fn needs_install(site_dir: &Path, dependency_dir: &Path) -> io::Result<bool> {
    if !dependency_dir.is_dir() {
        return Ok(true);
    }
    let Some(current) = manifest_hash(site_dir)? else {
        return Ok(false);
    };
    match std::fs::read_to_string(stamp_path(dependency_dir)) {
        Ok(stamp) => Ok(stamp.trim() != current),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Record the current manifest hash after a successful install.
///
/// Does nothing if the install did not create the dependency directory or
/// there are no manifests to hash.
pub fn write_stamp(site_dir: &Path, dependency_dir: &Path) -> io::Result<()> {
    if !dependency_dir.is_dir() {
        return Ok(());
    }
    match manifest_hash(site_dir)? {
        Some(hash) => std::fs::write(stamp_path(dependency_dir), hash),
        None => Ok(()),
    }
}

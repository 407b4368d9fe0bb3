//! Temp-file and final-path management.
//!
//! Temp artifacts live flat in the temp directory as
//! `<title>_<source_key>.tmp.mp4`, so a resubmitted job finds its partial file
//! again. Final artifacts land in `<videos>/<site>/<title>.mp4`, with `_1`,
//! `_2`, ... appended on name collisions. Moving into place is a rename, with
//! a copy fallback across filesystems.

mod sanitize;

pub use sanitize::sanitize_filename;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::config::StoragePaths;

/// Suffix of in-progress artifacts; orphan eviction only touches these.
pub const TEMP_SUFFIX: &str = ".tmp.mp4";

/// Extension of finished artifacts.
pub const FINAL_EXTENSION: &str = "mp4";

/// Computes storage locations and moves finished artifacts into place.
#[derive(Debug)]
pub struct PathManager {
    videos_dir: PathBuf,
    temp_dir: PathBuf,
    /// Serializes "pick a free final name, then rename" across workers.
    finalize_lock: Mutex<()>,
}

impl PathManager {
    pub fn new(videos_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            videos_dir: videos_dir.into(),
            temp_dir: temp_dir.into(),
            finalize_lock: Mutex::new(()),
        }
    }

    pub fn from_storage(paths: &StoragePaths) -> Self {
        Self::new(paths.videos_dir.clone(), paths.temp_dir.clone())
    }

    /// Create the videos and temp directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.videos_dir, &self.temp_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn videos_dir(&self) -> &Path {
        &self.videos_dir
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Deterministic temp location for a job.
    pub fn temp_path_for(&self, source_key: &str, title: &str) -> PathBuf {
        self.temp_dir.join(format!(
            "{}_{}{}",
            sanitize_filename(title),
            source_key,
            TEMP_SUFFIX
        ))
    }

    /// Directory receiving finished artifacts of `site`.
    pub fn site_dir(&self, site: &str) -> PathBuf {
        self.videos_dir.join(sanitize_filename(site))
    }

    /// Move a finished temp artifact to its final location.
    ///
    /// Fails when the temp file is missing or empty. Returns the final path and
    /// the artifact size in bytes.
    pub fn finalize(&self, temp_path: &Path, site: &str, title: &str) -> Result<(PathBuf, u64)> {
        let size = std::fs::metadata(temp_path)
            .with_context(|| format!("temp artifact missing: {}", temp_path.display()))?
            .len();
        if size == 0 {
            bail!("temp artifact is empty: {}", temp_path.display());
        }

        let dir = self.site_dir(site);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let _guard = self
            .finalize_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let final_path = free_name(&dir, &sanitize_filename(title));
        move_file(temp_path, &final_path)?;

        tracing::debug!(
            from = %temp_path.display(),
            to = %final_path.display(),
            size,
            "artifact finalized"
        );
        Ok((final_path, size))
    }

    /// Remove temp artifacts not modified within `retention`. Returns how many were removed.
    pub fn sweep_orphans(&self, retention: Duration) -> usize {
        let now = SystemTime::now();
        let mut removed = 0;
        for path in self.temp_files() {
            let age = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .map(|modified| now.duration_since(modified).unwrap_or_default());
            let Some(age) = age else { continue };
            if age < retention {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), age_secs = age.as_secs(), "removed orphaned temp file");
                    removed += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not remove orphaned temp file")
                }
            }
        }
        removed
    }

    /// Number of temp artifacts currently on disk.
    pub fn temp_file_count(&self) -> usize {
        self.temp_files().len()
    }

    fn temp_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.temp_dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(TEMP_SUFFIX))
            })
            .collect()
    }
}

/// First of `<stem>.mp4`, `<stem>_1.mp4`, `<stem>_2.mp4`, ... not present in `dir`.
fn free_name(dir: &Path, stem: &str) -> PathBuf {
    let first = dir.join(format!("{stem}.{FINAL_EXTENSION}"));
    if !first.exists() {
        return first;
    }
    (1u32..)
        .map(|n| dir.join(format!("{stem}_{n}.{FINAL_EXTENSION}")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// Rename, falling back to a copy when the rename fails (e.g. across filesystems).
fn move_file(from: &Path, to: &Path) -> Result<()> {
    let Err(rename_err) = std::fs::rename(from, to) else {
        return Ok(());
    };
    tracing::debug!(error = %rename_err, "rename failed, copying artifact instead");
    copy_into_place(from, to)?;
    if let Err(e) = std::fs::remove_file(from) {
        tracing::warn!(path = %from.display(), error = %e, "copied artifact but could not remove temp file");
    }
    Ok(())
}

/// Copy `from` to a hidden sibling of `to`, then rename it over `to`, so a
/// crash mid-copy never leaves a partial file under the final name.
fn copy_into_place(from: &Path, to: &Path) -> Result<()> {
    let name = to
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staging = to.with_file_name(format!(".{name}.partial"));

    let copied = std::fs::copy(from, &staging)
        .and_then(|_| std::fs::File::open(&staging)?.sync_all())
        .and_then(|_| std::fs::rename(&staging, to));
    if let Err(e) = copied {
        let _ = std::fs::remove_file(&staging);
        return Err(e)
            .with_context(|| format!("failed to move {} to {}", from.display(), to.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(root: &Path) -> PathManager {
        let m = PathManager::new(root.join("videos"), root.join("temp"));
        m.ensure_dirs().unwrap();
        m
    }

    #[test]
    fn temp_path_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let a = m.temp_path_for("abc", "My: Clip");
        assert_eq!(a, m.temp_path_for("abc", "My: Clip"));
        assert_eq!(a, dir.path().join("temp").join("My_ Clip_abc.tmp.mp4"));
        assert_ne!(a, m.temp_path_for("abd", "My: Clip"));
    }

    #[test]
    fn finalize_moves_into_site_dir() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let temp = m.temp_path_for("k1", "Clip");
        std::fs::write(&temp, b"0123456789").unwrap();

        let (final_path, size) = m.finalize(&temp, "siteA", "Clip").unwrap();
        assert_eq!(final_path, dir.path().join("videos/siteA/Clip.mp4"));
        assert_eq!(size, 10);
        assert!(!temp.exists());
        assert_eq!(std::fs::read(&final_path).unwrap(), b"0123456789");
    }

    #[test]
    fn copy_fallback_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let temp = m.temp_path_for("k1", "Copied");
        std::fs::write(&temp, b"payload").unwrap();
        let site = m.site_dir("s");
        std::fs::create_dir_all(&site).unwrap();
        let target = site.join("Copied.mp4");

        copy_into_place(&temp, &target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"payload");
        let names: Vec<_> = std::fs::read_dir(&site)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["Copied.mp4"]);
    }

    #[test]
    fn failed_copy_cleans_up_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let site = m.site_dir("s");
        std::fs::create_dir_all(&site).unwrap();
        let missing = m.temp_dir().join("gone.tmp.mp4");

        assert!(copy_into_place(&missing, &site.join("Gone.mp4")).is_err());
        assert_eq!(std::fs::read_dir(&site).unwrap().count(), 0);
    }

    #[test]
    fn finalize_appends_numeric_suffix_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let mut finals = Vec::new();
        for key in ["k1", "k2", "k3"] {
            let temp = m.temp_path_for(key, "Same");
            std::fs::write(&temp, key.as_bytes()).unwrap();
            finals.push(m.finalize(&temp, "s", "Same").unwrap().0);
        }
        let names: Vec<_> = finals
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["Same.mp4", "Same_1.mp4", "Same_2.mp4"]);
        assert_eq!(std::fs::read(&finals[0]).unwrap(), b"k1");
    }

    #[test]
    fn finalize_rejects_empty_or_missing_temp() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let temp = m.temp_path_for("k1", "Clip");
        assert!(m.finalize(&temp, "s", "Clip").is_err());

        std::fs::write(&temp, b"").unwrap();
        assert!(m.finalize(&temp, "s", "Clip").is_err());
        assert!(temp.exists());
    }

    #[test]
    fn sweep_removes_only_old_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let tmp = m.temp_path_for("k1", "Clip");
        std::fs::write(&tmp, b"x").unwrap();
        let other = m.temp_dir().join("notes.txt");
        std::fs::write(&other, b"x").unwrap();

        assert_eq!(m.sweep_orphans(Duration::from_secs(3600)), 0);
        assert_eq!(m.temp_file_count(), 1);

        assert_eq!(m.sweep_orphans(Duration::ZERO), 1);
        assert!(!tmp.exists());
        assert!(other.exists());
        assert_eq!(m.temp_file_count(), 0);
    }
}

//! Persisted exclusion lists (titles and URLs of handled assets).
//!
//! Plain text, one entry per line. Blank lines and `#` comments are skipped
//! on load; new entries are appended, never rewritten in place. The lists are
//! consulted independently of the ledger.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::url_key::{normalize_url, url_key};

/// One append-only line file.
#[derive(Debug, Clone)]
pub struct ExclusionList {
    path: PathBuf,
}

impl ExclusionList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries in file order. A missing file is an empty list.
    pub fn load(&self) -> Result<Vec<String>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect())
    }

    /// Append one entry. Line breaks inside the entry are flattened to spaces.
    pub fn append(&self, entry: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let line = entry.trim().replace(['\r', '\n'], " ");
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        writeln!(f, "{line}").with_context(|| format!("failed to append to {}", self.path.display()))?;
        Ok(())
    }
}

/// In-memory index over both exclusion lists, plus the structural keys of the excluded URLs.
#[derive(Debug)]
pub struct ExclusionSet {
    titles: HashSet<String>,
    urls: HashSet<String>,
    url_keys: HashSet<String>,
    title_list: Option<ExclusionList>,
    url_list: Option<ExclusionList>,
}

impl ExclusionSet {
    /// Load both lists; new entries are appended to the same files.
    pub fn load(title_list: ExclusionList, url_list: ExclusionList) -> Result<Self> {
        let mut set = Self::in_memory();
        for title in title_list.load()? {
            set.titles.insert(title);
        }
        for url in url_list.load()? {
            set.insert_url(&url);
        }
        tracing::debug!(
            titles = set.titles.len(),
            urls = set.urls.len(),
            "exclusion lists loaded"
        );
        set.title_list = Some(title_list);
        set.url_list = Some(url_list);
        Ok(set)
    }

    /// Empty set without backing files.
    pub fn in_memory() -> Self {
        Self {
            titles: HashSet::new(),
            urls: HashSet::new(),
            url_keys: HashSet::new(),
            title_list: None,
            url_list: None,
        }
    }

    pub fn contains_title(&self, title: &str) -> bool {
        self.titles.contains(title.trim())
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.urls.contains(&normalize_url(url))
    }

    pub fn contains_url_key(&self, key: &str) -> bool {
        self.url_keys.contains(key)
    }

    pub fn counts(&self) -> (usize, usize) {
        (self.titles.len(), self.urls.len())
    }

    /// Record a handled asset in memory and on disk. Entries already present are not re-appended.
    ///
    /// The in-memory sets are updated even when a file append fails; the
    /// error is returned so the caller can log it.
    pub fn record(&mut self, url: &str, title: &str) -> Result<()> {
        let title = title.trim();
        let mut result = Ok(());
        if !title.is_empty() && self.titles.insert(title.to_string()) {
            if let Some(list) = &self.title_list {
                result = list.append(title);
            }
        }
        if self.insert_url(url) {
            if let Some(list) = &self.url_list {
                let appended = list.append(&normalize_url(url));
                if result.is_ok() {
                    result = appended;
                }
            }
        }
        result
    }

    fn insert_url(&mut self, url: &str) -> bool {
        self.url_keys.insert(url_key(url));
        self.urls.insert(normalize_url(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_skips_blank_and_comment_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("titles.txt");
        std::fs::write(&path, "# handled titles\n\nT1\n  T2  \n#T3\n").unwrap();
        let list = ExclusionList::new(&path);
        assert_eq!(list.load().unwrap(), ["T1", "T2"]);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let list = ExclusionList::new(dir.path().join("nope.txt"));
        assert!(list.load().unwrap().is_empty());
    }

    #[test]
    fn append_creates_parent_and_keeps_existing_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lists").join("urls.txt");
        let list = ExclusionList::new(&path);
        list.append("https://a/1").unwrap();
        list.append("multi\nline").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "https://a/1\nmulti line\n"
        );
    }

    #[test]
    fn record_updates_memory_and_files_once() {
        let dir = tempfile::tempdir().unwrap();
        let titles = ExclusionList::new(dir.path().join("t.txt"));
        let urls = ExclusionList::new(dir.path().join("u.txt"));
        let mut set = ExclusionSet::load(titles.clone(), urls.clone()).unwrap();

        set.record("https://x/abc123456789/master.m3u8", "T1").unwrap();
        set.record("https://x/abc123456789/master.m3u8", "T1").unwrap();

        assert!(set.contains_title("T1"));
        assert!(set.contains_title(" T1 "));
        assert!(set.contains_url("https://x/abc123456789/master.m3u8#frag"));
        assert!(set.contains_url_key("run:abc123456789"));
        assert_eq!(titles.load().unwrap(), ["T1"]);
        assert_eq!(urls.load().unwrap(), ["https://x/abc123456789/master.m3u8"]);

        let reloaded = ExclusionSet::load(titles, urls).unwrap();
        assert_eq!(reloaded.counts(), (1, 1));
        assert!(reloaded.contains_url_key("run:abc123456789"));
    }
}

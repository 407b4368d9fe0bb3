//! Structural URL keys for fuzzy duplicate detection.
//!
//! Mirrors often serve one asset under slightly different URLs
//! (`.../abc123456789/master.m3u8` vs `.../abc123456789/720p.m3u8`, other
//! hosts, extra query strings). The key keeps the most identifying piece of
//! the path:
//!
//! 1. `run:` the longest alphanumeric run of at least 12 chars (host-independent),
//!    taken from the path, or from the query values when the path has none;
//! 2. `seg:` else the longest directory segment of at least 6 chars;
//! 3. `stem:` else the filename stem;
//! 4. `hash:` else the MD5 of the whole normalized URL.
//!
//! Tiers 2 and 3 are scoped by host, since short names like `videos/master`
//! repeat across unrelated sites.

use url::Url;

const MIN_RUN: usize = 12;
const MIN_SEGMENT: usize = 6;

/// Canonical form of a source URL: parsed, fragment dropped. Unparsable input is trimmed only.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

/// Structural key of `raw`; equal keys are treated as the same asset.
pub fn url_key(raw: &str) -> String {
    let normalized = normalize_url(raw);
    let (host, path, query_values) = match Url::parse(&normalized) {
        Ok(url) => (
            url.host_str().unwrap_or_default().to_string(),
            url.path().to_string(),
            url.query_pairs().map(|(_, v)| v.into_owned()).collect::<Vec<_>>(),
        ),
        Err(_) => (String::new(), normalized.clone(), Vec::new()),
    };

    if let Some(run) = longest_alnum_run(&path) {
        return format!("run:{run}");
    }
    // Players like `play.m3u8?id=...` carry the identity in the query.
    if let Some(run) = longest_alnum_run(&query_values.join("/")) {
        return format!("run:{run}");
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if let Some((_file, dirs)) = segments.split_last() {
        let best = dirs
            .iter()
            .filter(|s| s.chars().count() >= MIN_SEGMENT)
            .fold(None::<&str>, |best, s| match best {
                Some(b) if b.chars().count() >= s.chars().count() => Some(b),
                _ => Some(*s),
            });
        if let Some(seg) = best {
            return format!("seg:{host}/{seg}");
        }
    }

    if let Some(file) = segments.last() {
        let stem = file.rsplit_once('.').map_or(*file, |(stem, _ext)| stem);
        if !stem.is_empty() {
            return format!("stem:{host}/{stem}");
        }
    }

    format!("hash:{:x}", md5::compute(normalized.as_bytes()))
}

/// Longest run of ASCII alphanumerics of at least `MIN_RUN` chars; first wins on ties.
fn longest_alnum_run(s: &str) -> Option<&str> {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|run| run.len() >= MIN_RUN)
        .fold(None, |best: Option<&str>, run| match best {
            Some(b) if b.len() >= run.len() => Some(b),
            _ => Some(run),
        })
}

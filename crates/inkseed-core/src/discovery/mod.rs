//! Source discovery: resolve glob patterns to a sorted list of data files.

mod pattern;

pub use pattern::GlobPattern;

use crate::error::Result;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Resolves glob-style patterns to the data files for one entity type.
///
/// The output is deduplicated and sorted so that repeated runs see files in
/// the same order.
#[derive(Debug, Default, Clone)]
pub struct SourceDiscoverer {
    follow_links: bool,
}

impl SourceDiscoverer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow symlinked directories while walking.
    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Resolve every pattern and merge the matches.
    ///
    /// Zero matches is not an error: it returns an empty list and logs a warning.
    pub fn discover<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Vec<PathBuf>> {
        let mut found = BTreeSet::new();

        for raw in patterns {
            let pattern = GlobPattern::parse(raw.as_ref())?;
            let before = found.len();
            self.collect(&pattern, &mut found);
            debug!(
                "Pattern {} matched {} new file(s)",
                raw.as_ref(),
                found.len() - before
            );
        }

        if found.is_empty() {
            let joined: Vec<&str> = patterns.iter().map(|p| p.as_ref()).collect();
            warn!("No data files matched {:?}", joined);
        }

        Ok(found.into_iter().collect())
    }

    fn collect(&self, pattern: &GlobPattern, found: &mut BTreeSet<PathBuf>) {
        let base = pattern.base();

        if pattern.is_literal() {
            if base.is_file() {
                found.insert(base.to_path_buf());
            }
            return;
        }

        if !base.is_dir() {
            return;
        }

        for entry in WalkDir::new(base)
            .follow_links(self.follow_links)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(base) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if pattern.matches_relative(&relative) {
                found.insert(entry.path().to_path_buf());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &std::path::Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"[]").unwrap();
    }

    #[test]
    fn test_discover_sorted_and_deduplicated() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "comics/b.json");
        touch(temp.path(), "comics/a.json");
        touch(temp.path(), "comics/notes.txt");
        touch(temp.path(), "comics/nested/c.json");

        let root = temp.path().display().to_string();
        let patterns = vec![
            format!("{}/comics/*.json", root),
            format!("{}/comics/**/*.json", root),
        ];
        let files = SourceDiscoverer::new().discover(&patterns).unwrap();

        let names: Vec<String> = files
            .iter()
            .map(|p| {
                p.strip_prefix(temp.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        assert_eq!(
            names,
            vec!["comics/a.json", "comics/b.json", "comics/nested/c.json"]
        );
    }

    #[test]
    fn test_literal_pattern() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "users.json");

        let pattern = temp.path().join("users.json").display().to_string();
        let files = SourceDiscoverer::new().discover(&[pattern]).unwrap();
        assert_eq!(files, vec![temp.path().join("users.json")]);
    }

    #[test]
    fn test_no_matches_is_empty_not_error() {
        let temp = TempDir::new().unwrap();
        let pattern = format!("{}/missing/**/*.json", temp.path().display());
        let files = SourceDiscoverer::new().discover(&[pattern]).unwrap();
        assert!(files.is_empty());
    }
}

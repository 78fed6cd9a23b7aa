//! Glob pattern parsing.
//!
//! Supports `*`, `?`, `**` and `[...]` character classes. A pattern is split
//! into a literal base directory and a glob remainder; the remainder is
//! compiled into an anchored regex matched against `/`-separated paths
//! relative to the base.

use crate::error::{Result, SeedError};
use regex::Regex;
use std::path::{Path, PathBuf};

const GLOB_META: &[char] = &['*', '?', '['];

/// A parsed glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    raw: String,
    base: PathBuf,
    matcher: Option<Regex>,
}

impl GlobPattern {
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().replace('\\', "/");
        if normalized.is_empty() {
            return Err(SeedError::Config {
                message: "Empty source pattern".to_string(),
            });
        }

        let absolute = normalized.starts_with('/');
        let parts: Vec<&str> = normalized.split('/').filter(|p| !p.is_empty()).collect();
        let split = parts
            .iter()
            .position(|p| p.contains(GLOB_META))
            .unwrap_or(parts.len());

        let mut base = if absolute {
            PathBuf::from("/")
        } else {
            PathBuf::new()
        };
        for part in &parts[..split] {
            base.push(part);
        }
        if base.as_os_str().is_empty() {
            base = PathBuf::from(".");
        }

        let matcher = if split == parts.len() {
            None
        } else {
            let remainder = parts[split..].join("/");
            let regex = Regex::new(&glob_to_regex(&remainder)).map_err(|e| SeedError::Config {
                message: format!("Invalid source pattern '{}': {}", raw, e),
            })?;
            Some(regex)
        };

        Ok(Self {
            raw: raw.to_string(),
            base,
            matcher,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Literal directory prefix the pattern is anchored at.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// True when the pattern has no wildcards and names a single path.
    pub fn is_literal(&self) -> bool {
        self.matcher.is_none()
    }

    /// Match a `/`-separated path relative to [`Self::base`].
    pub fn matches_relative(&self, relative: &str) -> bool {
        match &self.matcher {
            Some(regex) => regex.is_match(relative),
            None => relative.is_empty(),
        }
    }
}

fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    // `**/` also matches zero directories
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            '[' => match chars[i + 1..].iter().position(|&c| c == ']') {
                Some(offset) if offset > 0 => {
                    let class: String = chars[i + 1..i + 1 + offset].iter().collect();
                    out.push('[');
                    if let Some(negated) = class.strip_prefix('!') {
                        out.push('^');
                        out.push_str(&negated.replace('\\', "\\\\"));
                    } else {
                        out.push_str(&class.replace('\\', "\\\\"));
                    }
                    out.push(']');
                    i += offset + 2;
                }
                _ => {
                    out.push_str("\\[");
                    i += 1;
                }
            },
            c => {
                out.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }

    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_split() {
        let p = GlobPattern::parse("data/comics/**/*.json").unwrap();
        assert_eq!(p.base(), Path::new("data/comics"));
        assert!(!p.is_literal());

        let p = GlobPattern::parse("*.json").unwrap();
        assert_eq!(p.base(), Path::new("."));

        let p = GlobPattern::parse("data/users.json").unwrap();
        assert!(p.is_literal());
    }

    #[test]
    fn test_star_does_not_cross_directories() {
        let p = GlobPattern::parse("data/*.json").unwrap();
        assert!(p.matches_relative("a.json"));
        assert!(!p.matches_relative("nested/a.json"));
        assert!(!p.matches_relative("a.json.bak"));
    }

    #[test]
    fn test_double_star_matches_any_depth() {
        let p = GlobPattern::parse("data/**/*.json").unwrap();
        assert!(p.matches_relative("a.json"));
        assert!(p.matches_relative("x/y/a.json"));
        assert!(!p.matches_relative("x/y/a.txt"));
    }

    #[test]
    fn test_question_mark_and_classes() {
        let p = GlobPattern::parse("d/part-?[0-9].json").unwrap();
        assert!(p.matches_relative("part-a1.json"));
        assert!(!p.matches_relative("part-ab.json"));

        let p = GlobPattern::parse("d/[!x]*.json").unwrap();
        assert!(p.matches_relative("comics.json"));
        assert!(!p.matches_relative("xcomics.json"));
    }

    #[test]
    fn test_dots_are_literal() {
        let p = GlobPattern::parse("d/users.v?.json").unwrap();
        assert!(p.matches_relative("users.v2.json"));
        assert!(!p.matches_relative("usersXv2.json"));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(GlobPattern::parse("   ").is_err());
    }
}

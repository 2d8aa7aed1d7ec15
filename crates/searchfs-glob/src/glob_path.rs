//! Path-aware glob matching with `**` (globstar) support.

use crate::glob::{expand_braces, Segment};
use crate::PatternError;

/// One `/`-separated piece of a path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// `**`: zero or more whole segments.
    Globstar,
    /// Any other segment; `*` never crosses a `/`.
    Pattern(Segment),
}

/// A compiled path pattern such as `materials/**/*.vmt`.
///
/// Brace alternatives are expanded at compile time, so `{a,b}/*.txt` holds
/// two alternative segment lists and matches if either does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPath {
    source: String,
    alternatives: Vec<Vec<PathSegment>>,
}

impl GlobPath {
    /// Compile a pattern. Empty segments (`a//b`, leading `/`) are ignored.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let alternatives = expand_braces(pattern)
            .iter()
            .map(|alt| {
                alt.split('/')
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        if s == "**" {
                            Ok(PathSegment::Globstar)
                        } else {
                            Segment::parse(s).map(PathSegment::Pattern)
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source: pattern.to_string(),
            alternatives,
        })
    }

    /// The pattern text this was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a `/`-separated relative path.
    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.alternatives
            .iter()
            .any(|segments| match_segments(segments, &parts))
    }
}

impl std::fmt::Display for GlobPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for GlobPath {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Table-driven match: `reachable[j]` is true when the segments consumed so
/// far can match exactly the first `j` path parts.
fn match_segments(segments: &[PathSegment], parts: &[&str]) -> bool {
    let mut reachable = vec![false; parts.len() + 1];
    reachable[0] = true;

    for segment in segments {
        let mut next = vec![false; parts.len() + 1];
        match segment {
            PathSegment::Globstar => {
                let mut seen = false;
                for j in 0..=parts.len() {
                    seen |= reachable[j];
                    next[j] = seen;
                }
            }
            PathSegment::Pattern(pattern) => {
                for j in 0..parts.len() {
                    if reachable[j] && pattern.matches(parts[j]) {
                        next[j + 1] = true;
                    }
                }
            }
        }
        reachable = next;
    }

    reachable[parts.len()]
}

//! Restricted-glob invalidation patterns.
//!
//! Only `*` is supported. It matches any run of characters, the delimiter
//! included, which is also what Redis `SCAN MATCH` does, so both tiers
//! agree on what a pattern covers.

use crate::key::{validate_segment, DELIMITER};
use crate::{CacheKey, CacheResult, Namespace};
use std::fmt;

/// A bulk-invalidation pattern rooted at one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CachePattern {
    namespace: Namespace,
    entity_glob: String,
    attribute_glob: Option<String>,
    rendered: String,
}

impl CachePattern {
    fn render(namespace: Namespace, entity_glob: String, attribute_glob: Option<String>) -> Self {
        let rendered = match &attribute_glob {
            Some(attr) => format!("{}{DELIMITER}{}{DELIMITER}{}", namespace.as_str(), entity_glob, attr),
            None => format!("{}{DELIMITER}{}", namespace.as_str(), entity_glob),
        };
        Self {
            namespace,
            entity_glob,
            attribute_glob,
            rendered,
        }
    }

    /// Matches every key of a namespace (`ns:*`).
    #[must_use]
    pub fn namespace_wide(namespace: Namespace) -> Self {
        Self::render(namespace, "*".to_string(), None)
    }

    /// Matches all attribute keys of one entity (`ns:id:*`).
    ///
    /// The bare entity key `ns:id` is not covered.
    pub fn entity(namespace: Namespace, entity_id: &str) -> CacheResult<Self> {
        validate_segment(entity_id, false)?;
        Ok(Self::render(namespace, entity_id.to_string(), Some("*".to_string())))
    }

    /// Restricts the pattern to an attribute glob (`ns:entity:attr`).
    pub fn with_attribute(self, attribute_glob: &str) -> CacheResult<Self> {
        validate_segment(attribute_glob, true)?;
        Ok(Self::render(self.namespace, self.entity_glob, Some(attribute_glob.to_string())))
    }

    #[must_use]
    pub const fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Returns the rendered glob.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    /// Checks whether a rendered key is covered by this pattern.
    #[must_use]
    pub fn matches_str(&self, key: &str) -> bool {
        glob_match(self.rendered.as_bytes(), key.as_bytes())
    }

    #[must_use]
    pub fn matches(&self, key: &CacheKey) -> bool {
        self.matches_str(key.as_str())
    }
}

impl fmt::Display for CachePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// Builds a pattern over a namespace, optionally narrowed by an entity glob.
pub fn build_pattern(namespace: Namespace, entity_glob: Option<&str>) -> CacheResult<CachePattern> {
    match entity_glob {
        Some(glob) => {
            validate_segment(glob, true)?;
            Ok(CachePattern::render(namespace, glob.to_string(), None))
        }
        None => Ok(CachePattern::namespace_wide(namespace)),
    }
}

/// `*`-only glob match with single-point backtracking.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut star_text = 0;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some(p);
            star_text = t;
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some(s) = star {
            p = s + 1;
            star_text += 1;
            t = star_text;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

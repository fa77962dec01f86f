//! Deterministic cache key construction.
//!
//! Keys have the shape `namespace:entity_id[:attribute]`. Every segment is
//! validated so that a key can never contain the delimiter or be mistaken
//! for an invalidation pattern.

use crate::{CacheError, CacheResult, Namespace};
use std::fmt;
use std::str::FromStr;

/// Segment delimiter.
pub const DELIMITER: char = ':';

/// Maximum length of a single segment in bytes.
pub const MAX_SEGMENT_LEN: usize = 256;

/// Characters with meaning in Redis `MATCH` globs.
const GLOB_METACHARACTERS: [char; 5] = ['*', '?', '[', ']', '\\'];

/// Validates one key (`allow_wildcard = false`) or pattern segment.
pub(crate) fn validate_segment(segment: &str, allow_wildcard: bool) -> CacheResult<()> {
    if segment.is_empty() {
        return Err(CacheError::invalid_segment(segment, "segment is empty"));
    }
    if segment.len() > MAX_SEGMENT_LEN {
        return Err(CacheError::invalid_segment(segment, "segment exceeds 256 bytes"));
    }
    for c in segment.chars() {
        if c == DELIMITER {
            return Err(CacheError::invalid_segment(segment, "segment contains the ':' delimiter"));
        }
        if c.is_whitespace() || c.is_control() {
            return Err(CacheError::invalid_segment(segment, "segment contains whitespace or control characters"));
        }
        if c == '*' && allow_wildcard {
            continue;
        }
        if GLOB_METACHARACTERS.contains(&c) {
            return Err(CacheError::invalid_segment(segment, "segment contains a glob metacharacter"));
        }
    }
    Ok(())
}

/// A validated, immutable cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: Namespace,
    entity_id: String,
    attribute: Option<String>,
    rendered: String,
}

impl CacheKey {
    /// Builds a key from its segments.
    pub fn new(namespace: Namespace, entity_id: &str, attribute: Option<&str>) -> CacheResult<Self> {
        validate_segment(entity_id, false)?;
        if let Some(attr) = attribute {
            validate_segment(attr, false)?;
        }

        let rendered = match attribute {
            Some(attr) => format!("{}{DELIMITER}{}{DELIMITER}{}", namespace.as_str(), entity_id, attr),
            None => format!("{}{DELIMITER}{}", namespace.as_str(), entity_id),
        };

        Ok(Self {
            namespace,
            entity_id: entity_id.to_string(),
            attribute: attribute.map(str::to_string),
            rendered,
        })
    }

    /// Parses a rendered key, validating every segment.
    pub fn parse(raw: &str) -> CacheResult<Self> {
        let mut parts = raw.split(DELIMITER);
        let namespace: Namespace = parts.next().unwrap_or_default().parse()?;
        let entity_id = parts
            .next()
            .ok_or_else(|| CacheError::invalid_segment(raw, "key has no entity segment"))?;
        let attribute = parts.next();
        if parts.next().is_some() {
            return Err(CacheError::invalid_segment(raw, "key has more than three segments"));
        }
        Self::new(namespace, entity_id, attribute)
    }

    #[must_use]
    pub const fn namespace(&self) -> Namespace {
        self.namespace
    }

    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    #[must_use]
    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// Returns the rendered key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.rendered
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.rendered
    }
}

impl FromStr for CacheKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Builds a cache key.
pub fn build_key(namespace: Namespace, entity_id: &str, attribute: Option<&str>) -> CacheResult<CacheKey> {
    CacheKey::new(namespace, entity_id, attribute)
}

/// Builds a cache key from an untyped namespace name.
pub fn build_key_str(namespace: &str, entity_id: &str, attribute: Option<&str>) -> CacheResult<CacheKey> {
    CacheKey::new(namespace.parse()?, entity_id, attribute)
}

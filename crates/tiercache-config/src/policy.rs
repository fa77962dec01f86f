//! Per-namespace caching policy.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tiercache_core::{CacheError, CacheResult, Namespace};
use tracing::warn;

/// Longest TTL any entry may carry, one year in seconds.
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Configured overrides keyed by namespace.
pub type NamespacePolicies = HashMap<Namespace, NamespaceOverride>;

/// Partial policy read from configuration.
///
/// Unset fields keep the built-in default for that namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamespaceOverride {
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub compressible: Option<bool>,
    #[serde(default)]
    pub hot_cache_eligible: Option<bool>,
    #[serde(default)]
    pub cacheable: Option<bool>,
    /// Attribute-specific TTLs in seconds (e.g. `enrichment = 604800`).
    #[serde(default)]
    pub attributes: BTreeMap<String, u64>,
}

/// Effective policy for one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePolicy {
    /// Distributed tier TTL in seconds.
    pub ttl_secs: u64,
    /// Whether large payloads are compressed.
    pub compressible: bool,
    /// Whether values are also kept in the hot tier.
    pub hot_cache_eligible: bool,
    /// Whether values are cached at all.
    pub cacheable: bool,
    /// Attribute-specific TTLs in seconds.
    pub attributes: BTreeMap<String, u64>,
}

impl NamespacePolicy {
    fn cached(ttl_secs: u64) -> Self {
        Self {
            ttl_secs,
            compressible: true,
            hot_cache_eligible: true,
            cacheable: true,
            attributes: BTreeMap::new(),
        }
    }

    fn never_cached() -> Self {
        Self {
            ttl_secs: 0,
            compressible: false,
            hot_cache_eligible: false,
            cacheable: false,
            attributes: BTreeMap::new(),
        }
    }

    /// Built-in policy for a namespace.
    #[must_use]
    pub fn default_for(namespace: Namespace) -> Self {
        match namespace {
            Namespace::User | Namespace::Workspace | Namespace::Analytics => Self::cached(300),
            Namespace::Lead => {
                let mut policy = Self::cached(3600);
                policy.attributes.insert("enrichment".to_string(), 604_800);
                policy
            }
            Namespace::Campaign => Self::cached(600),
            Namespace::Ai => Self {
                hot_cache_eligible: false,
                ..Self::cached(86_400)
            },
            Namespace::Session => Self::never_cached(),
        }
    }

    /// TTL for an entry, honouring attribute overrides. Never above
    /// [`MAX_TTL_SECS`].
    #[must_use]
    pub fn ttl_secs_for(&self, attribute: Option<&str>) -> u64 {
        attribute
            .and_then(|attr| self.attributes.get(attr).copied())
            .unwrap_or(self.ttl_secs)
            .min(MAX_TTL_SECS)
    }

    /// [`ttl_secs_for`](Self::ttl_secs_for) as the signed seconds the
    /// distributed tier takes.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn store_ttl_secs(&self, attribute: Option<&str>) -> i64 {
        // Bounded by MAX_TTL_SECS, so the cast cannot wrap.
        self.ttl_secs_for(attribute) as i64
    }

    #[must_use]
    pub fn ttl_for(&self, attribute: Option<&str>) -> Duration {
        Duration::from_secs(self.ttl_secs_for(attribute))
    }

    fn apply(&mut self, overrides: &NamespaceOverride) {
        if let Some(ttl) = overrides.ttl_secs {
            self.ttl_secs = ttl;
        }
        if let Some(compressible) = overrides.compressible {
            self.compressible = compressible;
        }
        if let Some(eligible) = overrides.hot_cache_eligible {
            self.hot_cache_eligible = eligible;
        }
        if let Some(cacheable) = overrides.cacheable {
            self.cacheable = cacheable;
        }
        for (attr, ttl) in &overrides.attributes {
            self.attributes.insert(attr.clone(), *ttl);
        }
    }
}

fn clamp_ttl(namespace: &Namespace, attribute: Option<&str>, ttl_secs: &mut u64) {
    if *ttl_secs > MAX_TTL_SECS {
        warn!(
            namespace = %namespace,
            attribute = attribute.unwrap_or("-"),
            ttl_secs = *ttl_secs,
            max_ttl_secs = MAX_TTL_SECS,
            "Configured TTL exceeds the maximum, clamping"
        );
        *ttl_secs = MAX_TTL_SECS;
    }
}

/// Effective policies for every namespace.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: HashMap<Namespace, NamespacePolicy>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            policies: Namespace::all()
                .into_iter()
                .map(|ns| (ns, NamespacePolicy::default_for(ns)))
                .collect(),
        }
    }
}

impl PolicyTable {
    /// Merges configured overrides over the built-in defaults.
    ///
    /// Fails if an override would make `session` cacheable or give a
    /// cacheable namespace a zero TTL.
    pub fn from_overrides(overrides: &NamespacePolicies) -> CacheResult<Self> {
        let mut table = Self::default();

        for (namespace, partial) in overrides {
            if !namespace.is_ever_cacheable() && partial.cacheable == Some(true) {
                return Err(CacheError::Configuration(format!(
                    "namespace '{namespace}' can never be cached"
                )));
            }
            if let Some(policy) = table.policies.get_mut(namespace) {
                policy.apply(partial);
            }
        }

        for (namespace, policy) in &mut table.policies {
            if !namespace.is_ever_cacheable() {
                *policy = NamespacePolicy::never_cached();
                continue;
            }
            if !policy.cacheable {
                continue;
            }
            if policy.ttl_secs == 0 {
                return Err(CacheError::Configuration(format!(
                    "namespace '{namespace}' has a zero TTL; permanent entries are not allowed"
                )));
            }
            if let Some((attr, _)) = policy.attributes.iter().find(|(_, ttl)| **ttl == 0) {
                return Err(CacheError::Configuration(format!(
                    "attribute '{namespace}:{attr}' has a zero TTL; permanent entries are not allowed"
                )));
            }
            clamp_ttl(namespace, None, &mut policy.ttl_secs);
            for (attr, ttl) in &mut policy.attributes {
                clamp_ttl(namespace, Some(attr.as_str()), ttl);
            }
        }

        Ok(table)
    }

    /// Policy for a namespace.
    #[must_use]
    pub fn get(&self, namespace: Namespace) -> &NamespacePolicy {
        // Every namespace is inserted on construction.
        &self.policies[&namespace]
    }
}

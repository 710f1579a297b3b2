use std::collections::{BTreeMap, BTreeSet, HashSet};

use regex::Regex;
use tokio::sync::RwLock;

use cms_types::{AgentId, CmsError, PropertyKey, PropertyQueryFilter};

/// Sorted listing of every distinct path component known to the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathSnapshot {
    pub namespaces: Vec<String>,
    pub services: Vec<String>,
    pub app_ids: Vec<String>,
    pub keys: Vec<String>,
}

#[derive(Default)]
struct PathSets {
    namespaces: BTreeSet<String>,
    services: BTreeSet<String>,
    app_ids: BTreeSet<String>,
    /// leaf → number of stored properties using it
    keys: BTreeMap<String, usize>,
}

/// Component sets that matched a [`CompiledFilter`]. Owned, so the caller
/// can keep scanning after the index lock is gone.
pub(crate) struct MatchedPaths {
    pub namespaces: HashSet<String>,
    pub services: HashSet<String>,
    pub app_ids: HashSet<String>,
    pub keys: HashSet<String>,
}

impl MatchedPaths {
    pub(crate) fn admits(&self, key: &PropertyKey) -> bool {
        self.namespaces.contains(&key.namespace)
            && self.services.contains(&key.service)
            && self.app_ids.contains(&key.app_id)
            && self.keys.contains(&key.key)
    }
}

/// Denormalized index of distinct namespace/service/app_id/key values.
///
/// Namespace, service and app_id entries are only ever added. Leaf keys are
/// reference counted and pruned once no stored property uses them.
pub struct PathIndex {
    inner: RwLock<PathSets>,
}

impl PathIndex {
    pub fn new() -> Self {
        PathIndex { inner: RwLock::new(PathSets::default()) }
    }

    /// Record a newly stored key. Must be called once per distinct key.
    pub async fn add(&self, key: &PropertyKey) {
        let mut g = self.inner.write().await;
        g.namespaces.insert(key.namespace.clone());
        g.services.insert(key.service.clone());
        g.app_ids.insert(key.app_id.clone());
        *g.keys.entry(key.key.clone()).or_insert(0) += 1;
    }

    /// Retract a removed key. Only the leaf is ever pruned.
    pub async fn remove_leaf(&self, key: &PropertyKey) {
        let mut g = self.inner.write().await;
        if let Some(count) = g.keys.get_mut(&key.key) {
            *count -= 1;
            if *count == 0 {
                g.keys.remove(&key.key);
            }
        }
    }

    /// Make an agent's triple visible for enumeration before it owns any
    /// property.
    pub async fn register_agent(&self, agent: &AgentId) {
        let mut g = self.inner.write().await;
        g.namespaces.insert(agent.namespace.clone());
        g.services.insert(agent.service.clone());
        g.app_ids.insert(agent.app_id.clone());
    }

    pub async fn snapshot(&self) -> PathSnapshot {
        let g = self.inner.read().await;
        PathSnapshot {
            namespaces: g.namespaces.iter().cloned().collect(),
            services: g.services.iter().cloned().collect(),
            app_ids: g.app_ids.iter().cloned().collect(),
            keys: g.keys.keys().cloned().collect(),
        }
    }

    pub(crate) async fn matching(&self, filter: &CompiledFilter) -> MatchedPaths {
        let g = self.inner.read().await;
        MatchedPaths {
            namespaces: select(g.namespaces.iter(), filter.namespace.as_ref()),
            services: select(g.services.iter(), filter.service.as_ref()),
            app_ids: select(g.app_ids.iter(), filter.app_id.as_ref()),
            keys: select(g.keys.keys(), filter.key.as_ref()),
        }
    }
}

impl Default for PathIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn select<'a>(values: impl Iterator<Item = &'a String>, regex: Option<&Regex>) -> HashSet<String> {
    values
        .filter(|v| regex.map_or(true, |re| re.is_match(v)))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// CompiledFilter
// ---------------------------------------------------------------------------

/// A [`PropertyQueryFilter`] with its dimension regexes compiled as
/// whole-string matches. `value_regex` is not compiled: the engine does not
/// filter on values.
#[derive(Debug)]
pub struct CompiledFilter {
    namespace: Option<Regex>,
    service: Option<Regex>,
    app_id: Option<Regex>,
    key: Option<Regex>,
    limit: usize,
}

impl CompiledFilter {
    pub fn compile(filter: &PropertyQueryFilter) -> Result<Self, CmsError> {
        Ok(CompiledFilter {
            namespace: anchored(filter.namespace_regex.as_deref())?,
            service: anchored(filter.service_regex.as_deref())?,
            app_id: anchored(filter.app_id_regex.as_deref())?,
            key: anchored(filter.key_regex.as_deref())?,
            limit: filter.effective_limit(),
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

fn anchored(pattern: Option<&str>) -> Result<Option<Regex>, CmsError> {
    match pattern {
        None | Some("") => Ok(None),
        Some(p) => Regex::new(&format!("^(?:{p})$"))
            .map(Some)
            .map_err(|e| CmsError::Query(format!("invalid regex '{p}': {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ns: &str, svc: &str, app: &str, k: &str) -> PropertyKey {
        PropertyKey::new(ns, svc, app, k)
    }

    #[tokio::test]
    async fn add_populates_all_four_sets() {
        let index = PathIndex::new();
        index.add(&key("prod", "billing", "api", "timeout")).await;
        index.add(&key("dev", "billing", "api", "retries")).await;

        let snap = index.snapshot().await;
        assert_eq!(snap.namespaces, vec!["dev", "prod"]);
        assert_eq!(snap.services, vec!["billing"]);
        assert_eq!(snap.app_ids, vec!["api"]);
        assert_eq!(snap.keys, vec!["retries", "timeout"]);
    }

    #[tokio::test]
    async fn removal_prunes_only_the_leaf() {
        let index = PathIndex::new();
        let k = key("prod", "billing", "api", "timeout");
        index.add(&k).await;
        index.remove_leaf(&k).await;

        let snap = index.snapshot().await;
        assert!(snap.keys.is_empty());
        assert_eq!(snap.namespaces, vec!["prod"]);
        assert_eq!(snap.services, vec!["billing"]);
        assert_eq!(snap.app_ids, vec!["api"]);
    }

    #[tokio::test]
    async fn shared_leaf_survives_until_last_user_is_removed() {
        let index = PathIndex::new();
        let a = key("prod", "billing", "api", "timeout");
        let b = key("dev", "billing", "api", "timeout");
        index.add(&a).await;
        index.add(&b).await;

        index.remove_leaf(&a).await;
        assert_eq!(index.snapshot().await.keys, vec!["timeout"]);
        index.remove_leaf(&b).await;
        assert!(index.snapshot().await.keys.is_empty());
    }

    #[tokio::test]
    async fn removing_unknown_leaf_is_harmless() {
        let index = PathIndex::new();
        index.remove_leaf(&key("a", "b", "c", "d")).await;
        assert_eq!(index.snapshot().await, PathSnapshot::default());
    }

    #[tokio::test]
    async fn register_agent_skips_leaf_set() {
        let index = PathIndex::new();
        index.register_agent(&AgentId::new("prod", "billing", "api")).await;
        let snap = index.snapshot().await;
        assert_eq!(snap.namespaces, vec!["prod"]);
        assert!(snap.keys.is_empty());
    }

    #[tokio::test]
    async fn matching_uses_whole_string_semantics() {
        let index = PathIndex::new();
        index.add(&key("prod", "s", "a", "k")).await;
        index.add(&key("preprod", "s", "a", "k2")).await;

        let filter = PropertyQueryFilter {
            namespace_regex: Some("prod".into()),
            ..Default::default()
        };
        let matched = index.matching(&CompiledFilter::compile(&filter).unwrap()).await;
        assert_eq!(matched.namespaces, HashSet::from(["prod".to_string()]));
        assert_eq!(matched.keys.len(), 2);
    }

    #[test]
    fn invalid_regex_is_a_query_error() {
        let filter = PropertyQueryFilter { key_regex: Some("(".into()), ..Default::default() };
        assert!(matches!(CompiledFilter::compile(&filter), Err(CmsError::Query(_))));
    }

    #[test]
    fn value_regex_is_never_compiled() {
        // Even an invalid value regex is accepted: the engine ignores it.
        let filter = PropertyQueryFilter { value_regex: Some("(".into()), ..Default::default() };
        assert!(CompiledFilter::compile(&filter).is_ok());
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use cms_types::{CmsError, PropertyEntry, PropertyKey, PropertyQueryFilter, PropertyValue};

use crate::path_index::{CompiledFilter, PathIndex};

/// Authoritative in-memory property map plus its path index.
///
/// Writers hold the map's write lock across the index update, so a key is
/// never visible to `get` without being visible to `query_by_filter`, or the
/// other way round. Lock order is always map, then index.
pub struct PropertyStore {
    data: RwLock<HashMap<PropertyKey, PropertyValue>>,
    paths: Arc<PathIndex>,
}

impl PropertyStore {
    pub fn new(paths: Arc<PathIndex>) -> Self {
        PropertyStore { data: RwLock::new(HashMap::new()), paths }
    }

    pub fn paths(&self) -> &Arc<PathIndex> {
        &self.paths
    }

    /// Upsert. Returns the replaced value, if any.
    pub async fn put(&self, key: PropertyKey, value: PropertyValue) -> Option<PropertyValue> {
        let mut g = self.data.write().await;
        let previous = g.insert(key.clone(), value);
        if previous.is_none() {
            self.paths.add(&key).await;
        }
        tracing::debug!(key = %key, replaced = previous.is_some(), "stored property");
        previous
    }

    pub async fn get(&self, key: &PropertyKey) -> Option<PropertyValue> {
        self.data.read().await.get(key).cloned()
    }

    pub async fn remove(&self, key: &PropertyKey) -> Option<PropertyValue> {
        let mut g = self.data.write().await;
        let removed = g.remove(key);
        if removed.is_some() {
            self.paths.remove_leaf(key).await;
            tracing::debug!(key = %key, "removed property");
        }
        removed
    }

    /// Index-assisted full scan: resolve the matching component sets, then
    /// walk the map once keeping entries whose four components all matched.
    /// The result is materialized under the read lock.
    pub async fn query_by_filter(
        &self,
        filter: &PropertyQueryFilter,
    ) -> Result<Vec<PropertyEntry>, CmsError> {
        let compiled = CompiledFilter::compile(filter)?;
        if compiled.limit() == 0 {
            return Ok(Vec::new());
        }
        let g = self.data.read().await;
        let matched = self.paths.matching(&compiled).await;
        Ok(g.iter()
            .filter(|(k, _)| matched.admits(k))
            .take(compiled.limit())
            .map(|(k, v)| PropertyEntry { key: k.clone(), value: v.clone() })
            .collect())
    }

    /// Exact-match scan of every property owned by one agent triple.
    pub async fn snapshot_for_agent(
        &self,
        namespace: &str,
        service: &str,
        app_id: &str,
    ) -> Vec<PropertyEntry> {
        let g = self.data.read().await;
        g.iter()
            .filter(|(k, _)| k.belongs_to(namespace, service, app_id))
            .map(|(k, v)| PropertyEntry { key: k.clone(), value: v.clone() })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn store() -> PropertyStore {
        PropertyStore::new(Arc::new(PathIndex::new()))
    }

    fn key(ns: &str, k: &str) -> PropertyKey {
        PropertyKey::new(ns, "svc", "app", k)
    }

    async fn seeded() -> PropertyStore {
        let s = store();
        for ns in ["prod", "dev", "test"] {
            for i in 0..4 {
                s.put(key(ns, &format!("k{i}")), PropertyValue::new(format!("{ns}-{i}"), i)).await;
            }
        }
        s
    }

    fn as_set(entries: &[PropertyEntry]) -> HashSet<String> {
        entries.iter().map(|e| e.key.to_string()).collect()
    }

    #[tokio::test]
    async fn put_then_get_is_stable() {
        let s = store();
        let k = key("ns", "greeting");
        let v = PropertyValue::new("hello", 100);
        assert!(s.put(k.clone(), v.clone()).await.is_none());
        for _ in 0..3 {
            assert_eq!(s.get(&k).await, Some(v.clone()));
        }

        let v2 = PropertyValue::new("bye", 200);
        assert_eq!(s.put(k.clone(), v2.clone()).await, Some(v));
        assert_eq!(s.get(&k).await, Some(v2));
    }

    #[tokio::test]
    async fn remove_then_get_is_absent() {
        let s = store();
        let k = key("ns", "greeting");
        s.put(k.clone(), PropertyValue::new("hello", 1)).await;
        assert!(s.remove(&k).await.is_some());
        assert!(s.get(&k).await.is_none());
        assert!(s.remove(&k).await.is_none());
    }

    #[tokio::test]
    async fn remove_keeps_upper_path_components() {
        let s = store();
        let k = key("prod", "timeout");
        s.put(k.clone(), PropertyValue::new("5s", 1)).await;
        s.remove(&k).await;

        let snap = s.paths().snapshot().await;
        assert!(!snap.keys.contains(&"timeout".to_string()));
        assert_eq!(snap.namespaces, vec!["prod"]);
        assert_eq!(snap.services, vec!["svc"]);
        assert_eq!(snap.app_ids, vec!["app"]);
    }

    #[tokio::test]
    async fn overwrite_does_not_double_count_leaf() {
        let s = store();
        let k = key("prod", "timeout");
        s.put(k.clone(), PropertyValue::new("1", 1)).await;
        s.put(k.clone(), PropertyValue::new("2", 2)).await;
        s.remove(&k).await;
        assert!(s.paths().snapshot().await.keys.is_empty());
    }

    #[tokio::test]
    async fn unfiltered_query_returns_whole_store() {
        let s = seeded().await;
        let filter = PropertyQueryFilter { limit: 100, ..Default::default() };
        let all = s.query_by_filter(&filter).await.unwrap();
        assert_eq!(all.len(), 12);
        assert_eq!(all.len(), s.len().await);
        assert_eq!(as_set(&all).len(), 12);
    }

    #[tokio::test]
    async fn limit_caps_matches() {
        let s = seeded().await;
        let filter = PropertyQueryFilter {
            namespace_regex: Some("prod|dev".into()),
            key_regex: Some("k[0-2]".into()),
            limit: 3,
            ..Default::default()
        };
        let hits = s.query_by_filter(&filter).await.unwrap();
        assert_eq!(hits.len(), 3);
        for e in &hits {
            assert!(e.key.namespace == "prod" || e.key.namespace == "dev");
            assert!(["k0", "k1", "k2"].contains(&e.key.key.as_str()));
        }
    }

    #[tokio::test]
    async fn namespace_filter_selects_only_that_namespace() {
        let s = seeded().await;
        let filter = PropertyQueryFilter {
            namespace_regex: Some("prod".into()),
            limit: 10,
            ..Default::default()
        };
        let hits = s.query_by_filter(&filter).await.unwrap();
        assert_eq!(hits.len(), 4);
        assert!(hits.iter().all(|e| e.key.namespace == "prod"));
    }

    #[tokio::test]
    async fn zero_and_negative_limits_yield_nothing() {
        let s = seeded().await;
        for limit in [0, -7] {
            let filter = PropertyQueryFilter { limit, ..Default::default() };
            assert!(s.query_by_filter(&filter).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn value_regex_is_not_applied() {
        let s = seeded().await;
        let filter = PropertyQueryFilter {
            namespace_regex: Some("prod".into()),
            value_regex: Some("no-value-looks-like-this".into()),
            limit: 10,
            ..Default::default()
        };
        assert_eq!(s.query_by_filter(&filter).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn removed_leaf_drops_out_of_queries() {
        let s = seeded().await;
        for ns in ["prod", "dev", "test"] {
            s.remove(&key(ns, "k0")).await;
        }
        let filter = PropertyQueryFilter { limit: 100, ..Default::default() };
        let hits = s.query_by_filter(&filter).await.unwrap();
        assert_eq!(hits.len(), 9);
        assert!(hits.iter().all(|e| e.key.key != "k0"));
    }

    #[tokio::test]
    async fn invalid_regex_fails_the_query() {
        let s = seeded().await;
        let filter = PropertyQueryFilter { service_regex: Some("[".into()), ..Default::default() };
        assert!(matches!(s.query_by_filter(&filter).await, Err(CmsError::Query(_))));
    }

    #[tokio::test]
    async fn agent_snapshot_is_exact_match() {
        let s = seeded().await;
        s.put(PropertyKey::new("prod", "svc", "app2", "k0"), PropertyValue::new("x", 1)).await;
        s.put(PropertyKey::new("prod.*", "svc", "app", "k0"), PropertyValue::new("y", 1)).await;

        let snap = s.snapshot_for_agent("prod", "svc", "app").await;
        assert_eq!(snap.len(), 4);
        assert!(snap.iter().all(|e| e.key.belongs_to("prod", "svc", "app")));
        assert!(s.snapshot_for_agent("nobody", "svc", "app").await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_writers_and_queries() {
        let s = Arc::new(store());
        let mut handles = Vec::new();
        for w in 0..8 {
            let s = s.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    let pause = std::time::Duration::from_micros(rand::random::<u64>() % 200);
                    tokio::time::sleep(pause).await;
                    let k = key(&format!("ns{w}"), &format!("k{i}"));
                    s.put(k, PropertyValue::new("v", i)).await;
                }
            }));
        }
        for _ in 0..4 {
            let s = s.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let filter = PropertyQueryFilter { limit: 1000, ..Default::default() };
                    let hits = s.query_by_filter(&filter).await.unwrap();
                    // every hit must be fetchable: map and index agree
                    for e in hits.iter().take(5) {
                        assert!(s.get(&e.key).await.is_some());
                    }
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(s.len().await, 400);
    }
}

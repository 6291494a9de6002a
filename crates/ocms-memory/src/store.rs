use crate::cache_type::CacheType;
use crate::group_list::GroupListCache;
use crate::model::OrganizationalUnit;
use crate::size::{estimate_size_lossy, CacheValue};
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::any::Any;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Uniform view over a single cache instance, used for bulk flushing and reporting.
pub trait FlushableCache: Send + Sync {
    fn flush(&self);

    fn size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Configured capacity, or `None` when unbounded.
    fn limit(&self) -> Option<usize> {
        None
    }

    /// Best-effort estimate of the memory held by the cached values.
    fn estimated_bytes(&self) -> usize;
}

/// A cached value, reachable both as `Any` (for typed reads) and as [`CacheValue`] (for sizing).
#[derive(Clone)]
pub(crate) struct StoredValue {
    any: Arc<dyn Any + Send + Sync>,
    sized: Arc<dyn CacheValue>,
}

impl StoredValue {
    pub(crate) fn new<V: CacheValue>(value: Arc<V>) -> Self {
        Self {
            any: value.clone(),
            sized: value,
        }
    }

    pub(crate) fn downcast<V: CacheValue>(&self) -> Option<Arc<V>> {
        Arc::clone(&self.any).downcast::<V>().ok()
    }
}

enum Backing {
    Bounded(Mutex<LruCache<String, StoredValue>>),
    Unbounded(DashMap<String, StoredValue>),
}

/// String-keyed store backing one [`CacheType`]: LRU when a capacity is configured, a plain
/// concurrent map otherwise.
pub struct CacheStore {
    ty: CacheType,
    backing: Backing,
}

impl CacheStore {
    pub fn new(ty: CacheType, limit: usize) -> Self {
        let backing = match NonZeroUsize::new(limit) {
            Some(limit) => Backing::Bounded(Mutex::new(LruCache::new(limit))),
            None => Backing::Unbounded(DashMap::new()),
        };
        Self { ty, backing }
    }

    pub fn cache_type(&self) -> CacheType {
        self.ty
    }

    pub(crate) fn insert(&self, key: String, value: StoredValue) {
        match &self.backing {
            Backing::Bounded(cache) => {
                cache.lock().put(key, value);
            }
            Backing::Unbounded(map) => {
                map.insert(key, value);
            }
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<StoredValue> {
        match &self.backing {
            Backing::Bounded(cache) => cache.lock().get(key).cloned(),
            Backing::Unbounded(map) => map.get(key).map(|value| value.value().clone()),
        }
    }

    pub(crate) fn remove(&self, key: &str) {
        match &self.backing {
            Backing::Bounded(cache) => {
                cache.lock().pop(key);
            }
            Backing::Unbounded(map) => {
                map.remove(key);
            }
        }
    }

    /// Remove every entry whose key satisfies `predicate`.
    pub(crate) fn remove_matching(&self, predicate: impl Fn(&str) -> bool) {
        match &self.backing {
            Backing::Bounded(cache) => {
                let mut cache = cache.lock();
                let doomed: Vec<String> = cache
                    .iter()
                    .filter(|(key, _)| predicate(key))
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in doomed {
                    cache.pop(&key);
                }
            }
            Backing::Unbounded(map) => map.retain(|key, _| !predicate(key)),
        }
    }

    pub(crate) fn values(&self) -> Vec<StoredValue> {
        match &self.backing {
            Backing::Bounded(cache) => cache.lock().iter().map(|(_, value)| value.clone()).collect(),
            Backing::Unbounded(map) => map.iter().map(|entry| entry.value().clone()).collect(),
        }
    }
}

impl FlushableCache for CacheStore {
    fn flush(&self) {
        match &self.backing {
            Backing::Bounded(cache) => cache.lock().clear(),
            Backing::Unbounded(map) => map.clear(),
        }
    }

    fn size(&self) -> usize {
        match &self.backing {
            Backing::Bounded(cache) => cache.lock().len(),
            Backing::Unbounded(map) => map.len(),
        }
    }

    fn limit(&self) -> Option<usize> {
        match &self.backing {
            Backing::Bounded(cache) => Some(cache.lock().cap().get()),
            Backing::Unbounded(_) => None,
        }
    }

    fn estimated_bytes(&self) -> usize {
        // Snapshot first so sizing never runs under the store lock.
        self.values()
            .iter()
            .map(|value| estimate_size_lossy(value.sized.as_ref()))
            .fold(0usize, usize::saturating_add)
    }
}

impl FlushableCache for GroupListCache {
    fn flush(&self) {
        self.clear();
    }

    fn size(&self) -> usize {
        GroupListCache::size(self)
    }

    fn estimated_bytes(&self) -> usize {
        self.value_bytes()
    }
}

/// Get-or-create cache for org units derived from resources. Entries are computed from role
/// assignments, so this cache is flushed together with [`CacheType::RoleList`].
#[derive(Debug, Default)]
pub struct ResourceOuCache {
    entries: DashMap<String, Arc<Vec<OrganizationalUnit>>>,
}

impl ResourceOuCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached units for `key`, computing them with `load` on a miss.
    ///
    /// `load` runs at most once per key while the shard lock is held.
    pub fn get_or_load(
        &self,
        key: &str,
        load: impl FnOnce() -> Vec<OrganizationalUnit>,
    ) -> Arc<Vec<OrganizationalUnit>> {
        if let Some(hit) = self.entries.get(key) {
            return Arc::clone(hit.value());
        }
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(load()));
        Arc::clone(entry.value())
    }
}

impl FlushableCache for ResourceOuCache {
    fn flush(&self) {
        self.entries.clear();
    }

    fn size(&self) -> usize {
        self.entries.len()
    }

    fn estimated_bytes(&self) -> usize {
        let values: Vec<Arc<Vec<OrganizationalUnit>>> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        values
            .iter()
            .map(|units| estimate_size_lossy(units.as_ref()))
            .fold(0usize, usize::saturating_add)
    }
}

/// A cache whose flush also invalidates caches derived from it.
pub struct CascadingCache {
    primary: Arc<dyn FlushableCache>,
    dependents: Vec<Arc<dyn FlushableCache>>,
}

impl CascadingCache {
    pub fn new(primary: Arc<dyn FlushableCache>, dependents: Vec<Arc<dyn FlushableCache>>) -> Self {
        Self {
            primary,
            dependents,
        }
    }
}

impl FlushableCache for CascadingCache {
    fn flush(&self) {
        self.primary.flush();
        for dependent in &self.dependents {
            dependent.flush();
        }
    }

    fn size(&self) -> usize {
        self.primary.size()
    }

    fn limit(&self) -> Option<usize> {
        self.primary.limit()
    }

    fn estimated_bytes(&self) -> usize {
        self.dependents
            .iter()
            .map(|dependent| dependent.estimated_bytes())
            .fold(self.primary.estimated_bytes(), usize::saturating_add)
    }
}

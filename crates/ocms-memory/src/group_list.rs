use crate::model::{CmsUuid, Group};
use crate::size::{estimate_size_lossy, FLAG_SIZE};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct PrincipalEntry {
    groups: DashMap<String, Arc<[Group]>>,
    roles: DashMap<String, bool>,
}

/// Two-level cache of group memberships and role checks, keyed by principal id first.
///
/// A principal's entry is created on first write and only ever removed as a whole. There is no
/// lock across the two levels: a [`GroupListCache::clear_user`] racing a write may drop that
/// write, which only costs a cache miss.
#[derive(Debug, Default)]
pub struct GroupListCache {
    entries: DashMap<CmsUuid, Arc<PrincipalEntry>>,
}

impl GroupListCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_groups(&self, principal: &CmsUuid, sub_key: &str) -> Option<Arc<[Group]>> {
        let entry = self.existing(principal)?;
        let groups = entry.groups.get(sub_key)?;
        Some(Arc::clone(groups.value()))
    }

    /// Store a copy of `groups` for `principal` under `sub_key`.
    pub fn put(&self, principal: CmsUuid, sub_key: impl Into<String>, groups: &[Group]) {
        self.entry(principal)
            .groups
            .insert(sub_key.into(), Arc::from(groups));
    }

    pub fn get_has_role(&self, principal: &CmsUuid, role_key: &str) -> Option<bool> {
        let entry = self.existing(principal)?;
        let has_role = entry.roles.get(role_key).map(|value| *value);
        has_role
    }

    pub fn set_has_role(&self, principal: CmsUuid, role_key: impl Into<String>, value: bool) {
        self.entry(principal).roles.insert(role_key.into(), value);
    }

    /// Drop everything cached for `principal`.
    pub fn clear_user(&self, principal: &CmsUuid) {
        self.entries.remove(principal);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of principals with an entry (not the number of cached lists).
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Estimated bytes held by all cached group lists and role flags.
    pub(crate) fn value_bytes(&self) -> usize {
        let entries: Vec<Arc<PrincipalEntry>> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut total = 0usize;
        for entry in entries {
            for list in entry.groups.iter() {
                let groups = list.value().to_vec();
                total = total.saturating_add(estimate_size_lossy(&groups));
            }
            total = total.saturating_add(entry.roles.len() * FLAG_SIZE);
        }
        total
    }

    fn existing(&self, principal: &CmsUuid) -> Option<Arc<PrincipalEntry>> {
        self.entries
            .get(principal)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn entry(&self, principal: CmsUuid) -> Arc<PrincipalEntry> {
        // `entry` holds the shard lock, so concurrent first writers share one entry.
        Arc::clone(self.entries.entry(principal).or_default().value())
    }
}

use crate::cache_type::{CacheSettings, CacheType};
use crate::group_list::GroupListCache;
use crate::model::{
    AccessControlList, CmsUuid, Group, Lock, OrganizationalUnit, PermissionSet, Project,
    Property, PublishJob, Resource, User,
};
use crate::size::{ByteContent, CacheValue};
use crate::store::{CacheStore, CascadingCache, FlushableCache, ResourceOuCache, StoredValue};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const ONLINE_PREFIX: &str = "online";
const OFFLINE_PREFIX: &str = "offline";

/// Caches whose keys are built with [`cache_key`] and can be cleared per project side.
const PROJECT_KEYED: [CacheType; 6] = [
    CacheType::Resource,
    CacheType::ResourceList,
    CacheType::Property,
    CacheType::PropertyList,
    CacheType::Permission,
    CacheType::Acl,
];

/// Everything derived from users, groups, org units or their memberships.
const PRINCIPAL_SCOPE: [CacheType; 10] = [
    CacheType::User,
    CacheType::Group,
    CacheType::OrgUnit,
    CacheType::Acl,
    CacheType::Permission,
    CacheType::HasRole,
    CacheType::RoleList,
    CacheType::UserGroups,
    CacheType::UserList,
    CacheType::ResourceList,
];

const RESOURCE_SCOPE: [CacheType; 4] = [
    CacheType::Resource,
    CacheType::ResourceList,
    CacheType::HasRole,
    CacheType::RoleList,
];

const PUBLISH_SCOPE: [CacheType; 9] = [
    CacheType::Resource,
    CacheType::ResourceList,
    CacheType::Property,
    CacheType::PropertyList,
    CacheType::ProjectResources,
    CacheType::PublishedResources,
    CacheType::Permission,
    CacheType::HasRole,
    CacheType::RoleList,
];

const ACCESS_CONTROL_SCOPE: [CacheType; 2] = [CacheType::Acl, CacheType::Permission];

/// Build a project-aware cache key: `online_<part>_<part>` or `offline_<part>_<part>`.
pub fn cache_key(online: bool, parts: &[&str]) -> String {
    let mut key = String::from(if online { ONLINE_PREFIX } else { OFFLINE_PREFIX });
    for part in parts {
        key.push('_');
        key.push_str(part);
    }
    key
}

/// Per-cache figures reported by the memory monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatistics {
    pub cache_type: CacheType,
    pub entries: usize,
    /// `None` for unbounded caches.
    pub limit: Option<usize>,
    pub estimated_bytes: usize,
}

/// Owner of every named cache.
///
/// Each [`CacheType`] maps to exactly one backing cache, registered at construction. A disabled
/// type drops all writes and answers every read with `None` until it is enabled again.
///
/// The registry is a plain value: construct one at the composition root and hand out `Arc`s.
pub struct CacheRegistry {
    settings: CacheSettings,
    stores: HashMap<CacheType, Arc<CacheStore>>,
    flushers: HashMap<CacheType, Arc<dyn FlushableCache>>,
    group_lists: Arc<GroupListCache>,
    resource_ou: Arc<ResourceOuCache>,
    disabled: RwLock<HashSet<CacheType>>,
}

impl CacheRegistry {
    pub fn new(settings: CacheSettings) -> Self {
        let group_lists = Arc::new(GroupListCache::new());
        let resource_ou = Arc::new(ResourceOuCache::new());
        let mut stores = HashMap::new();
        let mut flushers: HashMap<CacheType, Arc<dyn FlushableCache>> = HashMap::new();

        for ty in CacheType::ALL {
            if ty.is_group_list() {
                flushers.insert(ty, group_lists.clone());
                continue;
            }
            let store = Arc::new(CacheStore::new(ty, settings.limit(ty)));
            let flusher: Arc<dyn FlushableCache> = if ty == CacheType::RoleList {
                // Org units derived from resources are computed from role assignments.
                let dependents: Vec<Arc<dyn FlushableCache>> = vec![resource_ou.clone()];
                Arc::new(CascadingCache::new(store.clone(), dependents))
            } else {
                store.clone()
            };
            stores.insert(ty, store);
            flushers.insert(ty, flusher);
        }

        Self {
            settings,
            stores,
            flushers,
            group_lists,
            resource_ou,
            disabled: RwLock::new(HashSet::new()),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn is_enabled(&self, ty: CacheType) -> bool {
        !self.disabled.read().contains(&ty)
    }

    /// Disable `types`: their contents are dropped and later writes are ignored.
    ///
    /// A write that passed its enabled check before the mark may still land after the flush.
    /// It stays unreadable while the type is disabled and is dropped by [`Self::enable_cache`].
    pub fn disable_cache(&self, types: &[CacheType]) {
        self.disabled.write().extend(types.iter().copied());
        self.flush_cache(types);
        for ty in types {
            tracing::info!(target: "ocms.memory", cache = %ty, "cache disabled");
        }
    }

    /// Re-enable `types`. Previously cached values are not restored.
    pub fn enable_cache(&self, types: &[CacheType]) {
        let mut disabled = self.disabled.write();
        for ty in types {
            if !disabled.contains(ty) {
                continue;
            }
            // Writes that landed while disabled.
            if let Some(cache) = self.flushers.get(ty) {
                cache.flush();
            }
            disabled.remove(ty);
            tracing::info!(target: "ocms.memory", cache = %ty, "cache enabled");
        }
    }

    pub fn flush_cache(&self, types: &[CacheType]) {
        for ty in types {
            if let Some(cache) = self.flushers.get(ty) {
                cache.flush();
                tracing::debug!(target: "ocms.memory", cache = %ty, "flushed cache");
            }
        }
    }

    pub fn flush_all(&self) {
        self.flush_cache(&CacheType::ALL);
    }

    /// Number of entries held for `ty` (principals, for the group-list backed types).
    pub fn size(&self, ty: CacheType) -> usize {
        self.flushers.get(&ty).map_or(0, |cache| cache.size())
    }

    pub fn limit(&self, ty: CacheType) -> Option<usize> {
        self.flushers.get(&ty).and_then(|cache| cache.limit())
    }

    /// Whether `ty` has a backing cache. Always true for every [`CacheType`].
    pub fn is_registered(&self, ty: CacheType) -> bool {
        self.flushers.contains_key(&ty)
    }

    pub fn cache_statistics(&self) -> Vec<CacheStatistics> {
        CacheType::ALL
            .iter()
            .filter_map(|ty| {
                let cache = self.flushers.get(ty)?;
                Some(CacheStatistics {
                    cache_type: *ty,
                    entries: cache.size(),
                    limit: cache.limit(),
                    estimated_bytes: cache.estimated_bytes(),
                })
            })
            .collect()
    }

    // --- generic access ---

    /// Cache `value` under `key`. A no-op while `ty` is disabled, and for the group-list backed
    /// types, which have their own operations.
    pub fn cache<V: CacheValue>(&self, ty: CacheType, key: impl Into<String>, value: V) {
        self.cache_arc(ty, key, Arc::new(value));
    }

    pub fn cache_arc<V: CacheValue>(&self, ty: CacheType, key: impl Into<String>, value: Arc<V>) {
        if !self.is_enabled(ty) {
            return;
        }
        if let Some(store) = self.stores.get(&ty) {
            store.insert(key.into(), StoredValue::new(value));
        }
    }

    /// The value cached under `key`, if present and of type `V`.
    pub fn get_cached<V: CacheValue>(&self, ty: CacheType, key: &str) -> Option<Arc<V>> {
        if !self.is_enabled(ty) {
            return None;
        }
        self.stores.get(&ty)?.get(key)?.downcast::<V>()
    }

    pub fn uncache(&self, ty: CacheType, key: &str) {
        if let Some(store) = self.stores.get(&ty) {
            store.remove(key);
        }
    }

    fn cached_values<V: CacheValue>(&self, ty: CacheType) -> Vec<Arc<V>> {
        if !self.is_enabled(ty) {
            return Vec::new();
        }
        self.stores.get(&ty).map_or_else(Vec::new, |store| {
            store
                .values()
                .iter()
                .filter_map(|value| value.downcast::<V>())
                .collect()
        })
    }

    // --- security ---

    pub fn cache_acl(&self, key: impl Into<String>, acl: AccessControlList) {
        self.cache(CacheType::Acl, key, acl);
    }

    pub fn get_cached_acl(&self, key: &str) -> Option<Arc<AccessControlList>> {
        self.get_cached(CacheType::Acl, key)
    }

    pub fn cache_permission(&self, key: impl Into<String>, permissions: PermissionSet) {
        self.cache(CacheType::Permission, key, permissions);
    }

    pub fn get_cached_permission(&self, key: &str) -> Option<Arc<PermissionSet>> {
        self.get_cached(CacheType::Permission, key)
    }

    pub fn cache_role_list(&self, key: impl Into<String>, roles: Vec<String>) {
        self.cache(CacheType::RoleList, key, roles);
    }

    pub fn get_cached_role_list(&self, key: &str) -> Option<Arc<Vec<String>>> {
        self.get_cached(CacheType::RoleList, key)
    }

    pub fn cache_has_role(&self, principal: CmsUuid, role_key: impl Into<String>, value: bool) {
        if self.is_enabled(CacheType::HasRole) {
            self.group_lists.set_has_role(principal, role_key, value);
        }
    }

    pub fn get_cached_has_role(&self, principal: &CmsUuid, role_key: &str) -> Option<bool> {
        if !self.is_enabled(CacheType::HasRole) {
            return None;
        }
        self.group_lists.get_has_role(principal, role_key)
    }

    /// Org units owning the resource behind `key`, computed by `load` on a miss.
    ///
    /// Entries are dropped whenever [`CacheType::RoleList`] is flushed; while it is disabled
    /// `load` runs on every call.
    pub fn get_or_load_resource_ou(
        &self,
        key: &str,
        load: impl FnOnce() -> Vec<OrganizationalUnit>,
    ) -> Arc<Vec<OrganizationalUnit>> {
        if !self.is_enabled(CacheType::RoleList) {
            return Arc::new(load());
        }
        self.resource_ou.get_or_load(key, load)
    }

    // --- principals ---

    /// Cache `user` under both its name and its id.
    pub fn cache_user(&self, user: User) {
        let user = Arc::new(user);
        self.cache_arc(CacheType::User, user.name.clone(), user.clone());
        self.cache_arc(CacheType::User, user.id.to_string(), user);
    }

    /// Look up a user by name or by id.
    pub fn get_cached_user(&self, key: &str) -> Option<Arc<User>> {
        self.get_cached(CacheType::User, key)
    }

    pub fn uncache_user(&self, user: &User) {
        self.uncache(CacheType::User, &user.name);
        self.uncache(CacheType::User, &user.id.to_string());
    }

    pub fn cache_user_list(&self, key: impl Into<String>, users: Vec<User>) {
        self.cache(CacheType::UserList, key, users);
    }

    pub fn get_cached_user_list(&self, key: &str) -> Option<Arc<Vec<User>>> {
        self.get_cached(CacheType::UserList, key)
    }

    pub fn cache_user_groups(&self, principal: CmsUuid, key: impl Into<String>, groups: &[Group]) {
        if self.is_enabled(CacheType::UserGroups) {
            self.group_lists.put(principal, key, groups);
        }
    }

    pub fn get_cached_user_groups(&self, principal: &CmsUuid, key: &str) -> Option<Arc<[Group]>> {
        if !self.is_enabled(CacheType::UserGroups) {
            return None;
        }
        self.group_lists.get_groups(principal, key)
    }

    /// Cache `group` under both its name and its id.
    pub fn cache_group(&self, group: Group) {
        let group = Arc::new(group);
        self.cache_arc(CacheType::Group, group.name.clone(), group.clone());
        self.cache_arc(CacheType::Group, group.id.to_string(), group);
    }

    pub fn get_cached_group(&self, key: &str) -> Option<Arc<Group>> {
        self.get_cached(CacheType::Group, key)
    }

    pub fn uncache_group(&self, group: &Group) {
        self.uncache(CacheType::Group, &group.name);
        self.uncache(CacheType::Group, &group.id.to_string());
    }

    /// Cache `unit` under both its fully qualified name and its id.
    pub fn cache_org_unit(&self, unit: OrganizationalUnit) {
        let unit = Arc::new(unit);
        self.cache_arc(CacheType::OrgUnit, unit.fqn.clone(), unit.clone());
        self.cache_arc(CacheType::OrgUnit, unit.id.to_string(), unit);
    }

    pub fn get_cached_org_unit(&self, key: &str) -> Option<Arc<OrganizationalUnit>> {
        self.get_cached(CacheType::OrgUnit, key)
    }

    pub fn uncache_org_unit(&self, unit: &OrganizationalUnit) {
        self.uncache(CacheType::OrgUnit, &unit.fqn);
        self.uncache(CacheType::OrgUnit, &unit.id.to_string());
    }

    // --- projects ---

    /// Cache `project` under both its name and its id.
    pub fn cache_project(&self, project: Project) {
        let project = Arc::new(project);
        self.cache_arc(CacheType::Project, project.name.clone(), project.clone());
        self.cache_arc(CacheType::Project, project.id.to_string(), project);
    }

    pub fn get_cached_project(&self, key: &str) -> Option<Arc<Project>> {
        self.get_cached(CacheType::Project, key)
    }

    pub fn uncache_project(&self, project: &Project) {
        self.uncache(CacheType::Project, &project.name);
        self.uncache(CacheType::Project, &project.id.to_string());
    }

    pub fn cache_project_resources(&self, key: impl Into<String>, root_paths: Vec<String>) {
        self.cache(CacheType::ProjectResources, key, root_paths);
    }

    pub fn get_cached_project_resources(&self, key: &str) -> Option<Arc<Vec<String>>> {
        self.get_cached(CacheType::ProjectResources, key)
    }

    // --- resources ---

    pub fn cache_resource(&self, key: impl Into<String>, resource: Resource) {
        self.cache(CacheType::Resource, key, resource);
    }

    pub fn get_cached_resource(&self, key: &str) -> Option<Arc<Resource>> {
        self.get_cached(CacheType::Resource, key)
    }

    pub fn cache_resource_list(&self, key: impl Into<String>, resources: Vec<Resource>) {
        self.cache(CacheType::ResourceList, key, resources);
    }

    pub fn get_cached_resource_list(&self, key: &str) -> Option<Arc<Vec<Resource>>> {
        self.get_cached(CacheType::ResourceList, key)
    }

    pub fn cache_property(&self, key: impl Into<String>, property: Property) {
        self.cache(CacheType::Property, key, property);
    }

    pub fn get_cached_property(&self, key: &str) -> Option<Arc<Property>> {
        self.get_cached(CacheType::Property, key)
    }

    pub fn uncache_property(&self, key: &str) {
        self.uncache(CacheType::Property, key);
    }

    pub fn cache_property_list(&self, key: impl Into<String>, properties: Vec<Property>) {
        self.cache(CacheType::PropertyList, key, properties);
    }

    pub fn get_cached_property_list(&self, key: &str) -> Option<Arc<Vec<Property>>> {
        self.get_cached(CacheType::PropertyList, key)
    }

    /// Cache `lock` under the root path of the locked resource.
    pub fn cache_lock(&self, lock: Lock) {
        let key = lock.root_path.clone();
        self.cache(CacheType::Lock, key, lock);
    }

    pub fn get_cached_lock(&self, root_path: &str) -> Option<Arc<Lock>> {
        self.get_cached(CacheType::Lock, root_path)
    }

    pub fn uncache_lock(&self, root_path: &str) {
        self.uncache(CacheType::Lock, root_path);
    }

    /// Every cached lock, in no particular order.
    pub fn cached_locks(&self) -> Vec<Arc<Lock>> {
        self.cached_values(CacheType::Lock)
    }

    // --- publishing ---

    pub fn cache_published_resources(&self, key: impl Into<String>, root_paths: Vec<String>) {
        self.cache(CacheType::PublishedResources, key, root_paths);
    }

    pub fn get_cached_published_resources(&self, key: &str) -> Option<Arc<Vec<String>>> {
        self.get_cached(CacheType::PublishedResources, key)
    }

    pub fn cache_publish_job(&self, job: PublishJob) {
        let key = job.id.to_string();
        self.cache(CacheType::PublishQueue, key, job);
    }

    pub fn get_cached_publish_job(&self, id: &CmsUuid) -> Option<Arc<PublishJob>> {
        self.get_cached(CacheType::PublishQueue, &id.to_string())
    }

    pub fn uncache_publish_job(&self, id: &CmsUuid) {
        self.uncache(CacheType::PublishQueue, &id.to_string());
    }

    /// Queued publish jobs, oldest first.
    pub fn cached_publish_jobs(&self) -> Vec<Arc<PublishJob>> {
        let mut jobs: Vec<Arc<PublishJob>> = self.cached_values(CacheType::PublishQueue);
        jobs.sort_by_key(|job| job.enqueued_at_millis);
        jobs
    }

    pub fn cache_publish_job_in_history(&self, job: PublishJob) {
        let key = job.id.to_string();
        self.cache(CacheType::PublishHistory, key, job);
    }

    pub fn get_cached_publish_job_in_history(&self, id: &CmsUuid) -> Option<Arc<PublishJob>> {
        self.get_cached(CacheType::PublishHistory, &id.to_string())
    }

    pub fn uncache_publish_job_in_history(&self, id: &CmsUuid) {
        self.uncache(CacheType::PublishHistory, &id.to_string());
    }

    /// Finished publish jobs still in the history cache, oldest first.
    pub fn cached_publish_jobs_in_history(&self) -> Vec<Arc<PublishJob>> {
        let mut jobs: Vec<Arc<PublishJob>> = self.cached_values(CacheType::PublishHistory);
        jobs.sort_by_key(|job| job.enqueued_at_millis);
        jobs
    }

    // --- content ---

    pub fn cache_content_definition<V: CacheValue>(&self, key: impl Into<String>, value: V) {
        self.cache(CacheType::ContentDefinition, key, value);
    }

    pub fn get_cached_content_definition<V: CacheValue>(&self, key: &str) -> Option<Arc<V>> {
        self.get_cached(CacheType::ContentDefinition, key)
    }

    pub fn cache_memory_object<V: CacheValue>(&self, key: impl Into<String>, value: V) {
        self.cache(CacheType::MemoryObject, key, value);
    }

    pub fn get_cached_memory_object<V: CacheValue>(&self, key: &str) -> Option<Arc<V>> {
        self.get_cached(CacheType::MemoryObject, key)
    }

    pub fn cache_vfs_object<V: CacheValue>(&self, key: impl Into<String>, value: V) {
        self.cache(CacheType::VfsObject, key, value);
    }

    pub fn get_cached_vfs_object<V: CacheValue>(&self, key: &str) -> Option<Arc<V>> {
        self.get_cached(CacheType::VfsObject, key)
    }

    pub fn uncache_vfs_object(&self, key: &str) {
        self.uncache(CacheType::VfsObject, key);
    }

    /// Cache XML entity content that survives publishing (e.g. schema includes).
    pub fn cache_xml_permanent_entity(&self, system_id: impl Into<String>, content: ByteContent) {
        self.cache(CacheType::XmlEntityPermanent, system_id, content);
    }

    pub fn get_cached_xml_permanent_entity(&self, system_id: &str) -> Option<Arc<ByteContent>> {
        self.get_cached(CacheType::XmlEntityPermanent, system_id)
    }

    pub fn cache_xml_temporary_entity(&self, system_id: impl Into<String>, content: ByteContent) {
        self.cache(CacheType::XmlEntityTemporary, system_id, content);
    }

    pub fn get_cached_xml_temporary_entity(&self, system_id: &str) -> Option<Arc<ByteContent>> {
        self.get_cached(CacheType::XmlEntityTemporary, system_id)
    }

    // --- invalidation scopes ---

    /// Flush everything derived from users, groups, org units or memberships.
    pub fn clear_principals_cache(&self) {
        self.flush_cache(&PRINCIPAL_SCOPE);
    }

    /// Flush resources, resource lists and the role caches computed from them.
    pub fn clear_resource_cache(&self) {
        self.flush_cache(&RESOURCE_SCOPE);
    }

    /// Flush everything a publish operation can make stale.
    pub fn clear_cache_for_publishing(&self) {
        self.flush_cache(&PUBLISH_SCOPE);
    }

    /// Flush ACLs and permissions, then the resource scope.
    pub fn clear_access_control_list_cache(&self) {
        self.flush_cache(&ACCESS_CONTROL_SCOPE);
        self.clear_resource_cache();
    }

    /// Drop `user` by name and id together with its group-list entry and any cached user lists.
    pub fn clear_user_cache(&self, user: &User) {
        self.uncache_user(user);
        self.group_lists.clear_user(&user.id);
        self.flush_cache(&[CacheType::UserList]);
    }

    /// Drop the offline-keyed entries of the project-keyed caches.
    pub fn clear_offline_caches(&self) {
        self.clear_project_side(OFFLINE_PREFIX);
    }

    /// Drop the online-keyed entries of the project-keyed caches.
    pub fn clear_online_caches(&self) {
        self.clear_project_side(ONLINE_PREFIX);
    }

    fn clear_project_side(&self, prefix: &str) {
        for ty in PROJECT_KEYED {
            if let Some(store) = self.stores.get(&ty) {
                store.remove_matching(|key| {
                    key.strip_prefix(prefix)
                        .is_some_and(|rest| rest.is_empty() || rest.starts_with('_'))
                });
            }
        }
        tracing::debug!(target: "ocms.memory", side = prefix, "cleared project keyed caches");
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new(CacheSettings::default())
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("settings", &self.settings)
            .field("disabled", &*self.disabled.read())
            .finish_non_exhaustive()
    }
}

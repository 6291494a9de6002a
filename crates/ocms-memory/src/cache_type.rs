use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Closed set of cache roles held by the [`crate::CacheRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    Acl,
    ContentDefinition,
    Group,
    HasRole,
    Lock,
    MemoryObject,
    OrgUnit,
    Permission,
    Project,
    ProjectResources,
    Property,
    PropertyList,
    PublishHistory,
    PublishQueue,
    PublishedResources,
    Resource,
    ResourceList,
    RoleList,
    User,
    UserGroups,
    UserList,
    VfsObject,
    XmlEntityPermanent,
    XmlEntityTemporary,
}

impl CacheType {
    pub const ALL: [CacheType; 24] = [
        CacheType::Acl,
        CacheType::ContentDefinition,
        CacheType::Group,
        CacheType::HasRole,
        CacheType::Lock,
        CacheType::MemoryObject,
        CacheType::OrgUnit,
        CacheType::Permission,
        CacheType::Project,
        CacheType::ProjectResources,
        CacheType::Property,
        CacheType::PropertyList,
        CacheType::PublishHistory,
        CacheType::PublishQueue,
        CacheType::PublishedResources,
        CacheType::Resource,
        CacheType::ResourceList,
        CacheType::RoleList,
        CacheType::User,
        CacheType::UserGroups,
        CacheType::UserList,
        CacheType::VfsObject,
        CacheType::XmlEntityPermanent,
        CacheType::XmlEntityTemporary,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CacheType::Acl => "ACL",
            CacheType::ContentDefinition => "CONTENT_DEFINITION",
            CacheType::Group => "GROUP",
            CacheType::HasRole => "HAS_ROLE",
            CacheType::Lock => "LOCK",
            CacheType::MemoryObject => "MEMORY_OBJECT",
            CacheType::OrgUnit => "ORG_UNIT",
            CacheType::Permission => "PERMISSION",
            CacheType::Project => "PROJECT",
            CacheType::ProjectResources => "PROJECT_RESOURCES",
            CacheType::Property => "PROPERTY",
            CacheType::PropertyList => "PROPERTY_LIST",
            CacheType::PublishHistory => "PUBLISH_HISTORY",
            CacheType::PublishQueue => "PUBLISH_QUEUE",
            CacheType::PublishedResources => "PUBLISHED_RESOURCES",
            CacheType::Resource => "RESOURCE",
            CacheType::ResourceList => "RESOURCE_LIST",
            CacheType::RoleList => "ROLE_LIST",
            CacheType::User => "USER",
            CacheType::UserGroups => "USERGROUPS",
            CacheType::UserList => "USER_LIST",
            CacheType::VfsObject => "VFS_OBJECT",
            CacheType::XmlEntityPermanent => "XML_ENTITY_PERM",
            CacheType::XmlEntityTemporary => "XML_ENTITY_TEMP",
        }
    }

    /// Whether this type is stored in the two-level [`crate::GroupListCache`].
    pub fn is_group_list(self) -> bool {
        matches!(self, CacheType::UserGroups | CacheType::HasRole)
    }

    /// Default capacity; `0` means the cache is unbounded until explicitly flushed.
    pub fn default_limit(self) -> usize {
        match self {
            CacheType::Acl => 1024,
            CacheType::ContentDefinition => 256,
            CacheType::Group => 64,
            CacheType::HasRole => 0,
            CacheType::Lock => 0,
            CacheType::MemoryObject => 128,
            CacheType::OrgUnit => 64,
            CacheType::Permission => 4096,
            CacheType::Project => 32,
            CacheType::ProjectResources => 128,
            CacheType::Property => 1024,
            CacheType::PropertyList => 1024,
            CacheType::PublishHistory => 100,
            CacheType::PublishQueue => 0,
            CacheType::PublishedResources => 100,
            CacheType::Resource => 8192,
            CacheType::ResourceList => 256,
            CacheType::RoleList => 64,
            CacheType::User => 64,
            CacheType::UserGroups => 0,
            CacheType::UserList => 32,
            CacheType::VfsObject => 128,
            CacheType::XmlEntityPermanent => 0,
            CacheType::XmlEntityTemporary => 128,
        }
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-type capacity overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSettings {
    limits: HashMap<CacheType, usize>,
}

impl CacheSettings {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_limit(mut self, ty: CacheType, limit: usize) -> Self {
        self.limits.insert(ty, limit);
        self
    }

    pub fn set_limit(&mut self, ty: CacheType, limit: usize) {
        self.limits.insert(ty, limit);
    }

    /// Effective capacity for `ty`; `0` means unbounded.
    pub fn limit(&self, ty: CacheType) -> usize {
        self.limits
            .get(&ty)
            .copied()
            .unwrap_or_else(|| ty.default_limit())
    }
}

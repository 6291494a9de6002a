//! Read-only records that the security, resource and publish layers keep in the cache registry.

use crate::size::{CacheValue, ValueShape};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const UUID_SIZE: usize = 184;
pub const PERMISSION_SET_SIZE: usize = 16;
pub const RESOURCE_SIZE: usize = 1024;
pub const USER_SIZE: usize = 2048;
pub const GROUP_SIZE: usize = 512;
pub const PROJECT_SIZE: usize = 512;
pub const PROPERTY_SIZE: usize = 1024;
pub const PROPERTY_DEFINITION_SIZE: usize = 64;
pub const LOCK_SIZE: usize = 1024;
pub const ACCESS_CONTROL_ENTRY_SIZE: usize = 256;
pub const ACCESS_CONTROL_LIST_SIZE: usize = 1024;
pub const ORG_UNIT_SIZE: usize = 512;
pub const PUBLISH_JOB_SIZE: usize = 512;

/// Identifier of a principal, resource, project or publish job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CmsUuid(Uuid);

impl CmsUuid {
    pub const NULL: CmsUuid = CmsUuid(Uuid::nil());

    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for CmsUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CmsUuid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl CacheValue for CmsUuid {
    fn shape(&self) -> ValueShape<'_> {
        ValueShape::Fixed(UUID_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub structure_id: CmsUuid,
    pub resource_id: CmsUuid,
    pub root_path: String,
    pub type_id: i32,
    pub is_folder: bool,
    pub flags: i32,
    pub date_last_modified: i64,
    pub length: i64,
}

impl CacheValue for Resource {
    fn shape(&self) -> ValueShape<'_> {
        ValueShape::Fixed(RESOURCE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: CmsUuid,
    /// Fully qualified name (`ou/name`).
    pub name: String,
    pub email: String,
}

impl CacheValue for User {
    fn shape(&self) -> ValueShape<'_> {
        ValueShape::Fixed(USER_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: CmsUuid,
    pub name: String,
    pub description: String,
}

impl CacheValue for Group {
    fn shape(&self) -> ValueShape<'_> {
        ValueShape::Fixed(GROUP_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: CmsUuid,
    pub name: String,
    pub is_online: bool,
}

impl CacheValue for Project {
    fn shape(&self) -> ValueShape<'_> {
        ValueShape::Fixed(PROJECT_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub structure_value: Option<String>,
    pub resource_value: Option<String>,
}

impl Property {
    /// The effective value: the structure (individual) value wins over the resource value.
    pub fn value(&self) -> Option<&str> {
        self.structure_value
            .as_deref()
            .or(self.resource_value.as_deref())
    }
}

impl CacheValue for Property {
    fn shape(&self) -> ValueShape<'_> {
        ValueShape::Fixed(PROPERTY_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub id: CmsUuid,
    pub name: String,
}

impl CacheValue for PropertyDefinition {
    fn shape(&self) -> ValueShape<'_> {
        ValueShape::Fixed(PROPERTY_DEFINITION_SIZE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    Exclusive,
    Inherited,
    Shared,
    Temporary,
    Publish,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub root_path: String,
    pub user_id: CmsUuid,
    pub project_id: CmsUuid,
    pub lock_type: LockType,
}

impl CacheValue for Lock {
    fn shape(&self) -> ValueShape<'_> {
        ValueShape::Fixed(LOCK_SIZE)
    }
}

/// Allowed and denied permission bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionSet {
    pub allowed: u32,
    pub denied: u32,
}

impl PermissionSet {
    pub const READ: u32 = 1;
    pub const WRITE: u32 = 2;
    pub const VIEW: u32 = 4;
    pub const CONTROL: u32 = 8;
    pub const DIRECT_PUBLISH: u32 = 16;

    pub fn new(allowed: u32, denied: u32) -> Self {
        Self { allowed, denied }
    }

    /// Effective permissions: allowed bits minus denied bits.
    pub fn permissions(&self) -> u32 {
        self.allowed & !self.denied
    }

    pub fn requires(&self, required: u32) -> bool {
        self.permissions() & required == required
    }
}

impl CacheValue for PermissionSet {
    fn shape(&self) -> ValueShape<'_> {
        ValueShape::Fixed(PERMISSION_SET_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlEntry {
    pub resource: CmsUuid,
    pub principal: CmsUuid,
    pub permissions: PermissionSet,
    pub flags: u32,
}

impl CacheValue for AccessControlEntry {
    fn shape(&self) -> ValueShape<'_> {
        ValueShape::Fixed(ACCESS_CONTROL_ENTRY_SIZE)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlList {
    pub entries: Vec<AccessControlEntry>,
}

impl AccessControlList {
    /// Combined permissions granted to any of `principals`.
    pub fn permissions_for(&self, principals: &[CmsUuid]) -> PermissionSet {
        self.entries
            .iter()
            .filter(|entry| principals.contains(&entry.principal))
            .fold(PermissionSet::default(), |acc, entry| PermissionSet {
                allowed: acc.allowed | entry.permissions.allowed,
                denied: acc.denied | entry.permissions.denied,
            })
    }
}

impl CacheValue for AccessControlList {
    fn shape(&self) -> ValueShape<'_> {
        ValueShape::Fixed(
            ACCESS_CONTROL_LIST_SIZE + self.entries.len() * ACCESS_CONTROL_ENTRY_SIZE,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationalUnit {
    pub id: CmsUuid,
    /// Fully qualified name, always ending with `/` (the root unit is the empty string).
    pub fqn: String,
    pub description: String,
}

impl CacheValue for OrganizationalUnit {
    fn shape(&self) -> ValueShape<'_> {
        ValueShape::Fixed(ORG_UNIT_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishJob {
    pub id: CmsUuid,
    pub project_name: String,
    pub user_id: CmsUuid,
    pub size: usize,
    pub enqueued_at_millis: u64,
}

impl CacheValue for PublishJob {
    fn shape(&self) -> ValueShape<'_> {
        ValueShape::Fixed(PUBLISH_JOB_SIZE)
    }
}

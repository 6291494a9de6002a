//! In-process caches for the CMS and the memory monitor that guards them.
//!
//! - [`CacheRegistry`] owns one backing cache per [`CacheType`]; each type can be disabled,
//!   flushed and inspected independently.
//! - [`MemoryMonitor`] samples [`MemoryStatus`] on a schedule and flushes every cache when usage
//!   crosses the configured limit.
//! - Cached values describe their layout through [`CacheValue`] so the monitor can report an
//!   approximate footprint per cache without reflection.

mod cache_type;
mod error;
mod events;
mod group_list;
mod model;
mod monitor;
mod notify;
mod registry;
mod report;
mod size;
mod status;
mod store;
mod util;

pub use cache_type::{CacheSettings, CacheType};
pub use error::{MonitorError, NotifyError};
pub use events::{CmsEvent, EventBus, EventKind, EventListener};
pub use group_list::GroupListCache;
pub use model::{
    AccessControlEntry, AccessControlList, CmsUuid, Group, Lock, LockType, OrganizationalUnit,
    PermissionSet, Project, Property, PropertyDefinition, PublishJob, Resource, User,
};
pub use monitor::{
    JobContext, LaunchReport, MemoryMonitor, MonitorSettings, ScheduledJob, CACHE_CLEAR_COOLDOWN,
};
pub use notify::{LogNotifier, StatusMessage, StatusNotifier};
pub use registry::{cache_key, CacheRegistry, CacheStatistics};
pub use report::{status_report, warning_report};
pub use size::{
    byte_array_size, estimate_container_size, estimate_size, estimate_size_lossy, string_size,
    ByteContent, CacheValue, ValueShape, DEFAULT_MAX_DEPTH, FLAG_SIZE, OPAQUE_SIZE,
};
pub use status::{
    parse_cgroup_memory_limit, MemorySampler, MemoryStatus, RawMemory, SystemMemorySampler, MB,
};
pub use store::{CacheStore, CascadingCache, FlushableCache, ResourceOuCache};
pub use util::now_millis;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// System-wide events the cache layer fires or reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Every cache should drop its derived state.
    ClearCaches,
    ClearOfflineCaches,
    ClearOnlineCaches,
    PublishProject,
    UserModified,
    GroupModified,
    OuModified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmsEvent {
    pub kind: EventKind,
    pub data: BTreeMap<String, String>,
}

impl CmsEvent {
    /// An event with an empty payload.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            data: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

pub type EventListener = Arc<dyn Fn(&CmsEvent) + Send + Sync>;

/// In-process fan-out of [`CmsEvent`]s to subscribed listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<EventListener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: EventListener) {
        self.listeners.lock().push(listener);
    }

    /// Deliver `event` to every listener, in subscription order.
    pub fn fire(&self, event: &CmsEvent) {
        // Listeners may subscribe or fire further events.
        let listeners: Vec<EventListener> = self.listeners.lock().clone();
        tracing::debug!(
            target: "ocms.memory",
            kind = ?event.kind,
            listeners = listeners.len(),
            "firing event"
        );
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

//! Arena of live sessions, addressed by id.
//!
//! A connection's notification sink holds a [`SessionId`], never the session
//! itself. Notifications for a session that has not been installed yet are
//! buffered and replayed on install; notifications for a removed session are
//! dropped.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use logging::trace_session;
use protocol::Notification;

use crate::handler::NotificationHandler;

/// Stable handle of a session in a [`SessionRegistry`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

enum Slot {
    Reserved(Vec<Notification>),
    Active(Arc<dyn NotificationHandler>),
}

/// Owner of every session that can still receive notifications.
#[derive(Default)]
pub struct SessionRegistry {
    slots: DashMap<SessionId, Slot>,
    next: AtomicU64,
}

impl SessionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an id whose notifications are buffered until [`install`](Self::install).
    pub fn reserve(&self) -> SessionId {
        let id = SessionId(self.next.fetch_add(1, Ordering::Relaxed) + 1);
        self.slots.insert(id, Slot::Reserved(Vec::new()));
        trace_session!(session = %id, "session reserved");
        id
    }

    /// Binds `handler` to `id` and replays what arrived before it, in order.
    ///
    /// Returns `false` when `id` is not reserved.
    pub fn install(&self, id: SessionId, handler: Arc<dyn NotificationHandler>) -> bool {
        loop {
            let backlog = {
                let Some(mut slot) = self.slots.get_mut(&id) else {
                    return false;
                };
                match &mut *slot {
                    Slot::Reserved(buffered) if buffered.is_empty() => {
                        *slot = Slot::Active(Arc::clone(&handler));
                        trace_session!(session = %id, "session installed");
                        return true;
                    }
                    Slot::Reserved(buffered) => std::mem::take(buffered),
                    Slot::Active(_) => return false,
                }
            };
            trace_session!(session = %id, count = backlog.len(), "replaying early notifications");
            for notification in backlog {
                handler.handle(notification);
            }
        }
    }

    /// Routes `notification` to the session `id`.
    pub fn deliver(&self, id: SessionId, notification: Notification) {
        let handler = {
            let Some(mut slot) = self.slots.get_mut(&id) else {
                trace_session!(session = %id, notification = notification.name(), "notification for unknown session dropped");
                return;
            };
            match &mut *slot {
                Slot::Reserved(buffered) => {
                    buffered.push(notification);
                    return;
                }
                Slot::Active(handler) => Arc::clone(handler),
            }
        };
        handler.handle(notification);
    }

    /// Forgets the session `id`. Returns whether it was present.
    pub fn remove(&self, id: SessionId) -> bool {
        let removed = self.slots.remove(&id).is_some();
        if removed {
            trace_session!(session = %id, "session removed");
        }
        removed
    }

    /// Whether `id` is reserved or installed.
    #[must_use]
    pub fn contains(&self, id: SessionId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Number of reserved and installed sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no session is reserved or installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry").field("sessions", &self.slots.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<&'static str>>);

    impl NotificationHandler for Recorder {
        fn handle(&self, notification: Notification) {
            self.0.lock().unwrap().push(notification.name());
        }
    }

    fn finished(bundle: &str) -> Notification {
        Notification::BundleFinished {
            err_code: 0,
            bundle_name: bundle.to_owned(),
        }
    }

    #[test]
    fn early_notifications_are_replayed_in_order() {
        let registry = SessionRegistry::new();
        let id = registry.reserve();
        registry.deliver(id, Notification::BundleStarted {
            err_code: 0,
            bundle_name: "a".into(),
        });
        registry.deliver(id, finished("a"));

        let recorder = Arc::new(Recorder::default());
        assert!(registry.install(id, recorder.clone()));
        registry.deliver(id, Notification::AllBundlesFinished { err_code: 0 });

        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2], Notification::AllBundlesFinished { err_code: 0 }.name());
        assert_eq!(seen[1], finished("a").name());
    }

    #[test]
    fn removed_sessions_drop_notifications() {
        let registry = SessionRegistry::new();
        let id = registry.reserve();
        let recorder = Arc::new(Recorder::default());
        registry.install(id, recorder.clone());

        assert!(registry.remove(id));
        registry.deliver(id, finished("a"));

        assert!(recorder.0.lock().unwrap().is_empty());
        assert!(registry.is_empty());
        assert!(!registry.remove(id));
    }

    #[test]
    fn ids_are_distinct_and_install_needs_reservation() {
        let registry = SessionRegistry::new();
        let first = registry.reserve();
        let second = registry.reserve();
        assert_ne!(first, second);

        registry.remove(second);
        assert!(!registry.install(second, Arc::new(Recorder::default())));
        assert!(registry.contains(first));
    }
}

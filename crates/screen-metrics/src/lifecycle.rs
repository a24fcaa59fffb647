//! Screen lifecycle notifications and the container that publishes them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::types::{ScreenInfo, SurfaceId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    Created,
    Started,
    Resumed,
    Paused,
    Stopped,
    Destroyed,
}

impl LifecycleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Resumed => "resumed",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Destroyed => "destroyed",
        }
    }
}

/// One lifecycle transition of one screen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub kind: LifecycleKind,
    pub screen: ScreenInfo,
    /// `None` when the screen is not currently attached to a surface
    pub surface: Option<SurfaceId>,
}

impl LifecycleEvent {
    pub fn new(kind: LifecycleKind, screen: ScreenInfo, surface: Option<SurfaceId>) -> Self {
        Self {
            kind,
            screen,
            surface,
        }
    }
}

pub trait LifecycleObserver: Send + Sync {
    fn on_lifecycle_event(&self, event: &LifecycleEvent);
}

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique handle for one observer registration.
///
/// Unregistering an id on a source that did not issue it matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Anything that reports screen lifecycle transitions.
pub trait LifecycleSource: Send + Sync {
    fn register(&self, observer: Arc<dyn LifecycleObserver>) -> SubscriptionId;

    /// Remove a subscription. Unknown ids are ignored and yield `false`.
    fn unregister(&self, subscription: SubscriptionId) -> bool;
}

/// The two calls a screen visit is reduced to, plus destruction.
pub trait ScreenLifecycleCallbacks: Send + Sync {
    fn on_screen_started(&self, screen: &ScreenInfo, surface: Option<SurfaceId>);

    fn on_screen_stopped(&self, screen: &ScreenInfo, surface: Option<SurfaceId>);

    fn on_screen_destroyed(&self, _screen: &ScreenInfo) {}
}

/// In-process lifecycle publisher driven by the host.
///
/// Observers run on the dispatching thread, outside the subscriber lock,
/// so they may register or unregister while being notified.
#[derive(Default)]
pub struct ScreenContainer {
    observers: Mutex<Vec<(SubscriptionId, Arc<dyn LifecycleObserver>)>>,
}

impl ScreenContainer {
    pub fn new() -> Self {
        Self::default()
    }

    fn observers(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Arc<dyn LifecycleObserver>)>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn observer_count(&self) -> usize {
        self.observers().len()
    }

    pub fn dispatch(&self, event: &LifecycleEvent) {
        let snapshot: Vec<_> = self
            .observers()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        log::trace!(
            "dispatching {} for {} to {} observer(s)",
            event.kind.as_str(),
            event.screen,
            snapshot.len()
        );
        for observer in snapshot {
            observer.on_lifecycle_event(event);
        }
    }

    pub fn screen_created(&self, screen: &ScreenInfo, surface: Option<SurfaceId>) {
        self.notify(LifecycleKind::Created, screen, surface);
    }

    pub fn screen_started(&self, screen: &ScreenInfo, surface: Option<SurfaceId>) {
        self.notify(LifecycleKind::Started, screen, surface);
    }

    pub fn screen_stopped(&self, screen: &ScreenInfo, surface: Option<SurfaceId>) {
        self.notify(LifecycleKind::Stopped, screen, surface);
    }

    pub fn screen_destroyed(&self, screen: &ScreenInfo, surface: Option<SurfaceId>) {
        self.notify(LifecycleKind::Destroyed, screen, surface);
    }

    fn notify(&self, kind: LifecycleKind, screen: &ScreenInfo, surface: Option<SurfaceId>) {
        self.dispatch(&LifecycleEvent::new(kind, screen.clone(), surface));
    }
}

impl LifecycleSource for ScreenContainer {
    fn register(&self, observer: Arc<dyn LifecycleObserver>) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.observers().push((id, observer));
        id
    }

    fn unregister(&self, subscription: SubscriptionId) -> bool {
        let mut observers = self.observers();
        let before = observers.len();
        observers.retain(|(id, _)| *id != subscription);
        observers.len() != before
    }
}

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::lifecycle::{
    LifecycleEvent, LifecycleKind, LifecycleObserver, LifecycleSource, ScreenLifecycleCallbacks,
    SubscriptionId,
};
use crate::types::ScreenId;

/// Reduces raw lifecycle traffic to one start and one stop per screen visit.
struct BridgeObserver {
    target: Arc<dyn ScreenLifecycleCallbacks>,
    started: Mutex<HashSet<ScreenId>>,
}

impl BridgeObserver {
    fn started(&self) -> MutexGuard<'_, HashSet<ScreenId>> {
        self.started.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LifecycleObserver for BridgeObserver {
    fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        let id = event.screen.id;
        match event.kind {
            LifecycleKind::Started => {
                let first_start = self.started().insert(id);
                if first_start {
                    self.target.on_screen_started(&event.screen, event.surface);
                } else {
                    log::debug!("ignoring repeated start for {}", event.screen);
                }
            }
            LifecycleKind::Stopped => {
                let was_started = self.started().remove(&id);
                if was_started {
                    self.target.on_screen_stopped(&event.screen, event.surface);
                } else {
                    log::debug!("ignoring stop without start for {}", event.screen);
                }
            }
            LifecycleKind::Destroyed => {
                self.started().remove(&id);
                self.target.on_screen_destroyed(&event.screen);
            }
            LifecycleKind::Created | LifecycleKind::Resumed | LifecycleKind::Paused => {}
        }
    }
}

/// The source a bridge is registered on, and the id it was given there.
struct Subscription {
    source: Arc<dyn LifecycleSource>,
    id: SubscriptionId,
}

impl Subscription {
    fn release(self) {
        if !self.source.unregister(self.id) {
            log::warn!("subscription {} was already gone", self.id.as_u64());
        }
    }
}

/// Subscription to a [`LifecycleSource`] that forwards screen visits to a
/// [`ScreenLifecycleCallbacks`] target.
///
/// The bridge remembers which source it registered on, so releasing it
/// never touches another source's observers.
pub struct LifecycleBridge {
    observer: Arc<BridgeObserver>,
    subscription: Mutex<Option<Subscription>>,
}

impl LifecycleBridge {
    pub fn new(target: Arc<dyn ScreenLifecycleCallbacks>) -> Self {
        Self {
            observer: Arc::new(BridgeObserver {
                target,
                started: Mutex::new(HashSet::new()),
            }),
            subscription: Mutex::new(None),
        }
    }

    fn subscription(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to `source`, releasing any previous subscription on the
    /// source that issued it.
    ///
    /// Returns `true` if an existing subscription was replaced.
    pub fn listen(&self, source: Arc<dyn LifecycleSource>) -> bool {
        let mut subscription = self.subscription();
        let replaced = match subscription.take() {
            Some(previous) => {
                previous.release();
                true
            }
            None => {
                // Nothing seen before this subscription counts as started
                self.observer.started().clear();
                false
            }
        };
        let id = source.register(self.observer.clone());
        *subscription = Some(Subscription { source, id });
        replaced
    }

    /// Drop the subscription and forget every started screen.
    ///
    /// Returns `false` if the bridge was not listening.
    pub fn unlisten(&self) -> bool {
        let Some(previous) = self.subscription().take() else {
            return false;
        };
        previous.release();
        self.observer.started().clear();
        true
    }

    pub fn is_listening(&self) -> bool {
        self.subscription().is_some()
    }

    /// Screens that started and have not stopped yet.
    pub fn started_screens(&self) -> usize {
        self.observer.started().len()
    }
}

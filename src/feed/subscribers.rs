// Callback subscribers. Callbacks run with no lock held, so they may unsubscribe
// (themselves or others) or read the feed without deadlocking.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::lock;
use crate::models::FeedUpdate;

pub type FeedCallback = Arc<dyn Fn(&FeedUpdate) + Send + Sync>;

/// Returned by `subscribe`; pass to `unsubscribe` to stop delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriptionHandle(u64);

#[derive(Default)]
pub(super) struct SubscriberRegistry {
    next_id: AtomicU64,
    entries: Mutex<BTreeMap<u64, FeedCallback>>,
}

impl SubscriberRegistry {
    pub(super) fn subscribe(&self, callback: FeedCallback) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.entries).insert(id, callback);
        SubscriptionHandle(id)
    }

    pub(super) fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        lock(&self.entries).remove(&handle.0).is_some()
    }

    pub(super) fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Delivers in subscription order. A handle removed mid-dispatch gets nothing further,
    /// including later updates of the same dispatch.
    pub(super) fn publish(&self, update: &FeedUpdate) {
        let targets: Vec<(u64, FeedCallback)> = lock(&self.entries)
            .iter()
            .map(|(id, cb)| (*id, cb.clone()))
            .collect();
        for (id, callback) in targets {
            if !lock(&self.entries).contains_key(&id) {
                continue;
            }
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| callback(update)));
            if result.is_err() {
                tracing::warn!(subscription = id, "subscriber callback panicked");
            }
        }
    }
}

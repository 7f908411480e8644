// Entry subscription plumbing for cursors
//
// A reader can observe the entries a cursor consumes while fast-forwarding,
// and a writer's subscribers see every entry it persists. Delivery is
// send-if-space: a full channel is skipped, never blocked on.

use std::collections::HashMap;
use std::sync::{Mutex, Weak};

use crossbeam_channel::Sender;

use crate::entry::StreamEntry;

/// The shared registry of subscriber channels on a cursor
pub(crate) type SubscriberMap = HashMap<u64, Sender<StreamEntry>>;

/// Handle for an entry subscription on a cursor
///
/// Dropping the handle keeps the subscription alive; call
/// [`unsubscribe`](EntrySubscription::unsubscribe) to remove it. The handle
/// holds only a weak reference, so it outliving its cursor is harmless.
pub struct EntrySubscription {
    id: u64,
    registry: Weak<Mutex<SubscriberMap>>,
}

impl EntrySubscription {
    pub(crate) fn new(id: u64, registry: Weak<Mutex<SubscriberMap>>) -> Self {
        Self { id, registry }
    }

    /// Remove this subscription from its cursor
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Ok(mut subscribers) = registry.lock() {
                subscribers.remove(&self.id);
            }
        }
    }
}

//! Bounded de-duplication cache for emitted messages.

use crate::messages::MessageIdentity;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Service maximum messages per subscribe response.
pub const DEFAULT_CACHE_SIZE: usize = 100;

/// FIFO set of recently emitted message identities.
///
/// Backed by an [`LruCache`] that is only ever probed with `contains`, which
/// does not touch recency, so eviction order is insertion order.
pub struct MessageCache {
    entries: LruCache<MessageIdentity, ()>,
}

impl MessageCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub fn contains(&self, identity: &MessageIdentity) -> bool {
        self.entries.contains(identity)
    }

    /// Append an identity, evicting the oldest entry when full.
    ///
    /// Returns false if the identity was already cached.
    pub fn insert(&mut self, identity: MessageIdentity) -> bool {
        if self.entries.contains(&identity) {
            return false;
        }
        self.entries.push(identity, ());
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

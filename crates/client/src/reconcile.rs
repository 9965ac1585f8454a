//! Optimistic item reconciliation.
//!
//! An optimistic insert shows the user's action immediately; confirmation
//! arrives later over two independent paths, the request response and the
//! fanout event, in either order. The manager absorbs that race: whichever
//! confirmation lands first wins and the other becomes a no-op, so the
//! visible list never holds two entries for one logical item.

use std::time::{Duration, Instant};

use epop_events::TempId;
use tracing::debug;

use crate::cache::{PageCache, Speculative, SpeculativeStatus};

/// Pending items younger than this are never garbage collected, giving the
/// server time to acknowledge before the client declares them stale.
pub const PENDING_GC_FLOOR: Duration = Duration::from_secs(10);

/// Natural server identity of a cached item.
pub trait Identify {
    /// The server-assigned id, `None` while unassigned.
    fn identity(&self) -> Option<String>;
}

/// Reconciles optimistic items with server state over a paginated cache.
pub struct ReconcileManager<T> {
    cache: PageCache<T>,
    gc_floor: Duration,
}

impl<T: Identify + Clone> ReconcileManager<T> {
    /// Manager with the default GC floor.
    pub fn new() -> Self {
        Self {
            cache: PageCache::new(),
            gc_floor: PENDING_GC_FLOOR,
        }
    }

    /// Set the pending GC floor.
    pub fn with_gc_floor(mut self, floor: Duration) -> Self {
        self.gc_floor = floor;
        self
    }

    /// Insert an optimistic item at the head of the list. It is visible to
    /// readers immediately.
    pub fn add_optimistic(&mut self, item: T) -> TempId {
        let speculative = Speculative::pending(item);
        let temp_id = speculative.temp_id;
        self.cache.head_page_mut().insert(0, speculative);
        debug!(%temp_id, "optimistic insert");
        temp_id
    }

    /// Confirm an optimistic item with the server's version.
    ///
    /// Located by temp id first, then by natural identity, which absorbs a
    /// fanout event landing before the request response. The entry keeps
    /// its list position. Unknown or already-confirmed items are a no-op.
    /// A sync that raced this confirmation may have appended the server
    /// item under its identity already; that duplicate is dropped so one
    /// logical item is always one entry.
    pub fn confirm(&mut self, temp_id: TempId, server_item: &T) {
        let identity = server_item.identity();

        let mut matched_temp = false;
        if let Some(entry) = self.cache.iter_mut().find(|e| e.temp_id == temp_id) {
            if entry.status != SpeculativeStatus::Confirmed {
                entry.payload = server_item.clone();
                entry.status = SpeculativeStatus::Confirmed;
                debug!(%temp_id, "confirmed by temp id");
            }
            matched_temp = true;
        }
        if matched_temp {
            if let Some(identity) = identity {
                self.cache.retain(|e| {
                    e.temp_id == temp_id
                        || e.payload.identity().as_deref() != Some(identity.as_str())
                });
            }
            return;
        }

        if let Some(identity) = identity {
            if let Some(entry) = self
                .cache
                .iter_mut()
                .find(|e| e.payload.identity().as_deref() == Some(identity.as_str()))
            {
                if entry.status != SpeculativeStatus::Confirmed {
                    entry.payload = server_item.clone();
                    entry.status = SpeculativeStatus::Confirmed;
                    debug!(%identity, "confirmed by natural identity");
                }
            }
        }
    }

    /// Mark an optimistic item as rejected. It stays visible so the user
    /// can retry or dismiss it.
    pub fn fail(&mut self, temp_id: TempId, reason: impl Into<String>) {
        if let Some(entry) = self.cache.iter_mut().find(|e| e.temp_id == temp_id) {
            entry.status = SpeculativeStatus::Failed(reason.into());
        }
    }

    /// Merge a page of server items: identities already cached are left
    /// untouched, unseen ones are appended confirmed.
    pub fn sync(&mut self, server_items: Vec<T>) {
        for item in server_items {
            let known = match item.identity() {
                Some(identity) => self
                    .cache
                    .iter()
                    .any(|e| e.payload.identity().as_deref() == Some(identity.as_str())),
                None => false,
            };
            if !known {
                self.cache.head_page_mut().push(Speculative::confirmed(item));
            }
        }
    }

    /// Remove an item regardless of its state.
    pub fn remove(&mut self, temp_id: TempId) {
        self.cache.retain(|e| e.temp_id != temp_id);
    }

    /// Garbage-collect failed and stale pending items.
    ///
    /// Failed items go on the next call; pending items only once they are
    /// older than the floor, giving the server time to acknowledge.
    pub fn cleanup(&mut self) {
        self.cleanup_at(Instant::now());
    }

    /// [`cleanup`](Self::cleanup) against an explicit clock, for
    /// deterministic tests.
    pub fn cleanup_at(&mut self, now: Instant) {
        let floor = self.gc_floor;
        self.cache.retain(|e| match e.status {
            SpeculativeStatus::Confirmed => true,
            SpeculativeStatus::Failed(_) => false,
            SpeculativeStatus::Pending => e.age_at(now) < floor,
        });
    }

    /// Every cached item in list order.
    pub fn items(&self) -> Vec<&Speculative<T>> {
        self.cache.iter().collect()
    }

    /// Confirmed payloads in list order.
    pub fn confirmed(&self) -> Vec<&T> {
        self.cache
            .iter()
            .filter(|e| e.status == SpeculativeStatus::Confirmed)
            .map(|e| &e.payload)
            .collect()
    }

    /// Number of items still awaiting acknowledgement.
    pub fn pending_count(&self) -> usize {
        self.cache.iter().filter(|e| e.is_pending()).count()
    }

    /// Total cached item count.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache holds no items.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl<T: Identify + Clone> Default for ReconcileManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

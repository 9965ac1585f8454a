//! Speculative items and the paginated cache they live in.

use std::time::Instant;

use epop_events::TempId;

/// Lifecycle of a speculative item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeculativeStatus {
    /// Submitted, no server acknowledgement yet.
    Pending,
    /// Server accepted; payload is the authoritative version.
    Confirmed,
    /// Server rejected, with the reason.
    Failed(String),
}

/// A cached item plus its speculation state.
#[derive(Debug, Clone)]
pub struct Speculative<T> {
    pub temp_id: TempId,
    pub payload: T,
    pub status: SpeculativeStatus,
    created_at: Instant,
}

impl<T> Speculative<T> {
    /// A fresh pending item with a new temp id.
    pub fn pending(payload: T) -> Self {
        Self {
            temp_id: TempId::new(),
            payload,
            status: SpeculativeStatus::Pending,
            created_at: Instant::now(),
        }
    }

    /// A server-provided item, confirmed from the start.
    pub fn confirmed(payload: T) -> Self {
        Self {
            temp_id: TempId::new(),
            payload,
            status: SpeculativeStatus::Confirmed,
            created_at: Instant::now(),
        }
    }

    /// Whether the item still awaits acknowledgement.
    pub fn is_pending(&self) -> bool {
        self.status == SpeculativeStatus::Pending
    }

    /// Whether the server rejected the item.
    pub fn is_failed(&self) -> bool {
        matches!(self.status, SpeculativeStatus::Failed(_))
    }

    /// The rejection reason, if any.
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            SpeculativeStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Age of the item relative to `now`.
    pub fn age_at(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.created_at)
    }
}

/// Ordered pages of speculative items.
///
/// Page 0 is the newest; optimistic inserts land at its head. Iteration
/// yields items in page order, head first.
#[derive(Debug, Clone, Default)]
pub struct PageCache<T> {
    pages: Vec<Vec<Speculative<T>>>,
}

impl<T> PageCache<T> {
    /// An empty cache.
    pub fn new() -> Self {
        Self { pages: Vec::new() }
    }

    /// The head page, created on demand.
    pub fn head_page_mut(&mut self) -> &mut Vec<Speculative<T>> {
        if self.pages.is_empty() {
            self.pages.push(Vec::new());
        }
        &mut self.pages[0]
    }

    /// Append a fetched page after the existing ones.
    pub fn push_page(&mut self, page: Vec<Speculative<T>>) {
        self.pages.push(page);
    }

    /// Iterate items in page order.
    pub fn iter(&self) -> impl Iterator<Item = &Speculative<T>> {
        self.pages.iter().flatten()
    }

    /// Iterate items mutably in page order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Speculative<T>> {
        self.pages.iter_mut().flatten()
    }

    /// Keep only items the predicate accepts.
    pub fn retain(&mut self, mut keep: impl FnMut(&Speculative<T>) -> bool) {
        for page in &mut self.pages {
            page.retain(&mut keep);
        }
    }

    /// Total item count across pages.
    pub fn len(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    /// Whether the cache holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Typing-indicator debounce.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Default cooldown between rebroadcast typing-start signals.
pub const DEFAULT_TYPING_COOLDOWN: Duration = Duration::from_secs(1);

/// Debounces typing-start signals per `(chat, user)` pair.
///
/// A start within the cooldown window of the previous broadcast for the same
/// pair is suppressed. Stop signals are never debounced: the tracker only
/// clears its entry so the next start broadcasts immediately.
pub struct TypingTracker {
    cooldown: Duration,
    last_broadcast: Mutex<HashMap<String, Instant>>,
}

impl TypingTracker {
    /// Tracker with the given cooldown window.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_broadcast: Mutex::new(HashMap::new()),
        }
    }

    fn key(chat_id: &str, user_id: &str) -> String {
        format!("{chat_id}:{user_id}")
    }

    /// Record a typing start. Returns true when the signal should be
    /// broadcast, false when it falls inside the cooldown window.
    pub async fn note_start(&self, chat_id: &str, user_id: &str) -> bool {
        let key = Self::key(chat_id, user_id);
        let now = Instant::now();
        let mut last = self.last_broadcast.lock().await;
        match last.get(&key) {
            Some(at) if now.duration_since(*at) < self.cooldown => {
                trace!(%key, "typing start suppressed");
                false
            }
            _ => {
                last.insert(key, now);
                true
            }
        }
    }

    /// Record a typing stop. The caller always broadcasts the stop, which
    /// clears the indicator for watchers; the debounce entry is dropped
    /// with it, so a start that follows inside the cooldown window
    /// broadcasts again rather than leaving watchers without an indicator.
    pub async fn note_stop(&self, chat_id: &str, user_id: &str) {
        let key = Self::key(chat_id, user_id);
        let mut last = self.last_broadcast.lock().await;
        last.remove(&key);
    }

    /// Drop entries older than `age`. Bounds memory on long-lived gateways.
    pub async fn evict_older_than(&self, age: Duration) {
        let now = Instant::now();
        let mut last = self.last_broadcast.lock().await;
        last.retain(|_, at| now.duration_since(*at) < age);
    }

    /// Number of tracked pairs.
    pub async fn tracked(&self) -> usize {
        self.last_broadcast.lock().await.len()
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_COOLDOWN)
    }
}

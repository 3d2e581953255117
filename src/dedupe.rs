//! Short-window guard against bursts of identical `get_turns` calls.
//!
//! Markers expire after the configured window and the table is capped, so
//! the number of distinct conversations never grows it without bound.

use log::debug;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Identifies a read request: conversation plus read parameters.
pub fn fingerprint(conversation_id: &str, max_turns: usize, lookback_minutes: u64) -> String {
    format!("{}|{}|{}", conversation_id, max_turns, lookback_minutes)
}

pub struct DedupeGuard {
    markers: Mutex<HashMap<String, Instant>>,
    window: Duration,
    capacity: usize,
}

impl DedupeGuard {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            markers: Mutex::new(HashMap::new()),
            window,
            capacity: capacity.max(1),
        }
    }

    pub fn from_millis(window_ms: u64, capacity: usize) -> Self {
        Self::new(Duration::from_millis(window_ms), capacity)
    }

    /// Whether `fingerprint` was seen less than one window ago. The marker is
    /// refreshed on every call, hit or not.
    pub async fn should_serve_from_cache(&self, fingerprint: &str) -> bool {
        if self.window.is_zero() {
            return false;
        }
        let now = Instant::now();
        let mut markers = self.markers.lock().await;

        let duplicate = markers
            .get(fingerprint)
            .map_or(false, |seen| now.duration_since(*seen) < self.window);

        if !markers.contains_key(fingerprint) && markers.len() >= self.capacity {
            self.make_room(&mut markers, now);
        }
        markers.insert(fingerprint.to_string(), now);
        duplicate
    }

    fn make_room(&self, markers: &mut HashMap<String, Instant>, now: Instant) {
        let window = self.window;
        markers.retain(|_, seen| now.duration_since(*seen) < window);
        if markers.len() < self.capacity {
            return;
        }
        // Every marker is still live: drop the oldest one.
        let oldest = markers
            .iter()
            .min_by_key(|(_, seen)| **seen)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            debug!("Dedupe table full, evicting marker '{}'", key);
            markers.remove(&key);
        }
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.markers.lock().await.len()
    }
}

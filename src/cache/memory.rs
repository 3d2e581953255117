use super::CacheBackend;
use crate::error::CacheError;
use crate::models::RawValue;
use async_trait::async_trait;
use std::collections::{ HashMap, VecDeque };
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Entry {
    items: VecDeque<String>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }
}

/// In-process list store with per-key expiry, for local runs and tests.
///
/// Values that parse as JSON are handed back already decoded, the way
/// REST-style backends return them.
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self, key: &str) -> usize {
        let mut entries = self.entries.lock().await;
        Self::live(&mut entries, key).map_or(0, |e| e.items.len())
    }

    fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
        let now = Instant::now();
        if entries.get(key).map_or(false, |e| e.is_expired(now)) {
            entries.remove(key);
            return None;
        }
        entries.get_mut(key)
    }
}

/// Resolves Redis-style inclusive indices, where negatives count from the end.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn push_front(&self, key: &str, values: &[String]) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().await;
        if Self::live(&mut entries, key).is_none() {
            entries.insert(key.to_string(), Entry { items: VecDeque::new(), expires_at: None });
        }
        if let Some(entry) = entries.get_mut(key) {
            for value in values {
                entry.items.push_front(value.clone());
            }
        }
        Ok(())
    }

    async fn range(
        &self,
        key: &str,
        start: isize,
        stop: isize
    ) -> Result<Vec<RawValue>, CacheError> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = Self::live(&mut entries, key) else {
            return Ok(Vec::new());
        };
        let Some((from, to)) = resolve_range(entry.items.len(), start, stop) else {
            return Ok(Vec::new());
        };
        Ok(
            entry.items
                .range(from..=to)
                .map(|item| {
                    match serde_json::from_str(item) {
                        Ok(value) => RawValue::Structured(value),
                        Err(_) => RawValue::Text(item.clone()),
                    }
                })
                .collect()
        )
    }

    async fn trim(&self, key: &str, start: isize, stop: isize) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = Self::live(&mut entries, key) else {
            return Ok(());
        };
        match resolve_range(entry.items.len(), start, stop) {
            Some((from, to)) => {
                entry.items.truncate(to + 1);
                entry.items.drain(..from);
            }
            None => entry.items.clear(),
        }
        if entry.items.is_empty() {
            entries.remove(key);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = Self::live(&mut entries, key) {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
        }
        Ok(())
    }
}

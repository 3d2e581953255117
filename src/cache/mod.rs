pub mod memory;
pub mod redis;

use crate::cli::Args;
use crate::error::CacheError;
use crate::models::{ RawValue, Turn };
use async_trait::async_trait;
use log::{ debug, info, warn };
use std::sync::Arc;

/// List-style key-value operations the turn cache needs from its backend.
///
/// `push_front` inserts values one after another at the head, so the last
/// value given ends up first.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn push_front(&self, key: &str, values: &[String]) -> Result<(), CacheError>;

    async fn range(
        &self,
        key: &str,
        start: isize,
        stop: isize
    ) -> Result<Vec<RawValue>, CacheError>;

    async fn trim(&self, key: &str, start: isize, stop: isize) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), CacheError>;

    /// Replace the whole list, keep `keep` head entries and reset the TTL.
    /// Backends with transactions should override this.
    async fn replace_list(
        &self,
        key: &str,
        values: &[String],
        keep: usize,
        ttl_secs: u64
    ) -> Result<(), CacheError> {
        self.delete(key).await?;
        if values.is_empty() {
            return Ok(());
        }
        self.push_front(key, values).await?;
        self.trim(key, 0, (keep as isize) - 1).await?;
        self.expire(key, ttl_secs).await
    }

    /// Push one value at the head, keep `keep` head entries and reset the TTL.
    async fn push_bounded(
        &self,
        key: &str,
        value: String,
        keep: usize,
        ttl_secs: u64
    ) -> Result<(), CacheError> {
        self.push_front(key, &[value]).await?;
        self.trim(key, 0, (keep as isize) - 1).await?;
        self.expire(key, ttl_secs).await
    }
}

/// Best-effort, TTL-bounded window of the most recent turns per conversation.
///
/// Windows are stored newest-first. Every failure is logged and degrades to
/// a miss or a no-op; nothing here is ever surfaced to a caller.
#[derive(Clone)]
pub struct TurnCache {
    backend: Option<Arc<dyn CacheBackend>>,
    key_prefix: String,
    window_size: usize,
    ttl_secs: u64,
}

impl TurnCache {
    pub fn new(
        backend: Option<Arc<dyn CacheBackend>>,
        key_prefix: impl Into<String>,
        window_size: usize,
        ttl_secs: u64
    ) -> Self {
        Self {
            backend,
            key_prefix: key_prefix.into(),
            window_size: window_size.max(1),
            ttl_secs: ttl_secs.max(1),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, "turns:", 1, 1)
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    fn key(&self, conversation_id: &str) -> String {
        format!("{}{}", self.key_prefix, conversation_id)
    }

    /// Up to `max_turns` cached turns, newest first. `None` when disabled,
    /// missing, empty or unreadable.
    pub async fn read(&self, conversation_id: &str, max_turns: usize) -> Option<Vec<Turn>> {
        let backend = self.backend.as_ref()?;
        if max_turns == 0 {
            return None;
        }
        let stop = (max_turns.min(self.window_size) as isize) - 1;
        let key = self.key(conversation_id);

        let raw = match backend.range(&key, 0, stop).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Turn cache read failed for '{}': {}", conversation_id, e);
                return None;
            }
        };

        let mut turns = Vec::with_capacity(raw.len());
        for value in raw {
            match value.decode::<Turn>() {
                Ok(turn) => turns.push(turn),
                Err(e) => {
                    warn!("Skipping malformed cached turn for '{}': {}", conversation_id, e);
                }
            }
        }

        if turns.is_empty() {
            None
        } else {
            Some(turns)
        }
    }

    /// Overwrite the window with `turns`, newest `window_size` kept.
    pub async fn replace(&self, conversation_id: &str, turns: &[Turn]) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        if let Err(e) = self.try_replace(backend.as_ref(), conversation_id, turns).await {
            warn!("Turn cache replace failed for '{}': {}", conversation_id, e);
        }
    }

    async fn try_replace(
        &self,
        backend: &dyn CacheBackend,
        conversation_id: &str,
        turns: &[Turn]
    ) -> Result<(), CacheError> {
        let mut ordered = turns.to_vec();
        Turn::sort_newest_first(&mut ordered);
        ordered.truncate(self.window_size);

        // Pushed oldest first so the newest lands at the head.
        let values = ordered
            .iter()
            .rev()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        backend.replace_list(&self.key(conversation_id), &values, self.window_size, self.ttl_secs).await?;
        debug!("Turn cache replaced '{}' with {} turns", conversation_id, values.len());
        Ok(())
    }

    /// Insert one confirmed turn at the newest position.
    pub async fn append(&self, conversation_id: &str, turn: &Turn) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let result = match serde_json::to_string(turn) {
            Ok(value) =>
                backend.push_bounded(
                    &self.key(conversation_id),
                    value,
                    self.window_size,
                    self.ttl_secs
                ).await,
            Err(e) => Err(CacheError::from(e)),
        };
        if let Err(e) = result {
            warn!("Turn cache append failed for '{}': {}", conversation_id, e);
        }
    }

    /// Drop the window. Returns whether the cache acknowledged the delete.
    pub async fn clear(&self, conversation_id: &str) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        match backend.delete(&self.key(conversation_id)).await {
            Ok(()) => {
                info!("Turn cache cleared for '{}'", conversation_id);
                true
            }
            Err(e) => {
                warn!("Turn cache clear failed for '{}': {}", conversation_id, e);
                false
            }
        }
    }
}

pub async fn init(args: &Args) -> TurnCache {
    match redis::RedisCacheBackend::init(args).await {
        Some(redis_backend) =>
            TurnCache::new(
                Some(Arc::new(redis_backend)),
                args.cache_key_prefix.clone(),
                args.window_size,
                args.session_ttl_seconds
            ),
        None => TurnCache::disabled(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCacheBackend;
    use crate::models::{ Role, Timestamp };
    use std::time::Duration;

    fn turn(id: &str, secs: i64) -> Turn {
        Turn {
            id: Some(id.to_string()),
            role: Role::User,
            content: format!("message {}", id),
            created_at: Some(Timestamp::new(secs, 0)),
        }
    }

    fn cache_with(window: usize, ttl: u64) -> (TurnCache, Arc<MemoryCacheBackend>) {
        let backend = Arc::new(MemoryCacheBackend::new());
        (TurnCache::new(Some(backend.clone()), "turns:", window, ttl), backend)
    }

    fn ids(turns: &[Turn]) -> Vec<String> {
        turns
            .iter()
            .map(|t| t.id.clone().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn append_keeps_the_most_recent_window() {
        let (cache, _) = cache_with(3, 60);
        for i in 0..5 {
            cache.append("c1", &turn(&format!("m{}", i), i)).await;
        }
        let turns = cache.read("c1", 10).await.unwrap();
        assert_eq!(ids(&turns), vec!["m4", "m3", "m2"]);
    }

    #[tokio::test]
    async fn window_holds_all_entries_below_capacity() {
        let (cache, _) = cache_with(20, 60);
        for i in 0..4 {
            cache.append("c1", &turn(&format!("m{}", i), i)).await;
        }
        assert_eq!(cache.read("c1", 50).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn replace_orders_newest_first_regardless_of_input() {
        let (cache, _) = cache_with(3, 60);
        let input = vec![turn("a", 2), turn("b", 9), turn("c", 5), turn("d", 1)];
        cache.replace("c1", &input).await;
        let turns = cache.read("c1", 10).await.unwrap();
        assert_eq!(ids(&turns), vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn read_respects_max_turns() {
        let (cache, _) = cache_with(10, 60);
        cache.replace("c1", &[turn("a", 1), turn("b", 2), turn("c", 3)]).await;
        assert_eq!(ids(&cache.read("c1", 2).await.unwrap()), vec!["c", "b"]);
        assert!(cache.read("c1", 0).await.is_none());
    }

    #[tokio::test]
    async fn empty_or_missing_window_is_absent() {
        let (cache, _) = cache_with(10, 60);
        assert!(cache.read("nope", 5).await.is_none());
        cache.replace("c1", &[]).await;
        assert!(cache.read("c1", 5).await.is_none());
    }

    #[tokio::test]
    async fn malformed_entries_are_skipped() {
        let (cache, backend) = cache_with(10, 60);
        cache.append("c1", &turn("good", 1)).await;
        backend.push_front("turns:c1", &["{broken".to_string()]).await.unwrap();
        let turns = cache.read("c1", 10).await.unwrap();
        assert_eq!(ids(&turns), vec!["good"]);
    }

    #[tokio::test(start_paused = true)]
    async fn window_expires_after_ttl() {
        let (cache, _) = cache_with(10, 100);
        cache.append("c1", &turn("a", 1)).await;
        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(cache.read("c1", 5).await.is_some());
        tokio::time::advance(Duration::from_secs(100)).await;
        assert!(cache.read("c1", 5).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reads_do_not_refresh_ttl_but_writes_do() {
        let (cache, _) = cache_with(10, 100);
        cache.append("c1", &turn("a", 1)).await;
        tokio::time::advance(Duration::from_secs(80)).await;
        assert!(cache.read("c1", 5).await.is_some());
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.read("c1", 5).await.is_none());

        cache.append("c2", &turn("a", 1)).await;
        tokio::time::advance(Duration::from_secs(80)).await;
        cache.append("c2", &turn("b", 2)).await;
        tokio::time::advance(Duration::from_secs(80)).await;
        assert_eq!(cache.read("c2", 5).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn clear_removes_window() {
        let (cache, _) = cache_with(10, 60);
        cache.append("c1", &turn("a", 1)).await;
        assert!(cache.clear("c1").await);
        assert!(cache.read("c1", 5).await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_is_a_no_op() {
        let cache = TurnCache::disabled();
        cache.append("c1", &turn("a", 1)).await;
        cache.replace("c1", &[turn("b", 2)]).await;
        assert!(!cache.is_enabled());
        assert!(cache.read("c1", 5).await.is_none());
        assert!(!cache.clear("c1").await);
    }
}

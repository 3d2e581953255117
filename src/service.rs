use crate::cache::TurnCache;
use crate::dedupe::{ fingerprint, DedupeGuard };
use crate::error::ServiceError;
use crate::history::HistoryStore;
use crate::models::{ Role, Timestamp, Turn };
use log::{ debug, error, warn };
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CacheStatus {
    #[serde(rename = "HIT")]
    Hit,
    #[serde(rename = "HIT(DEDUPED)")]
    HitDeduped,
    #[serde(rename = "MISS->WROTE")]
    MissWrote,
    #[serde(rename = "DISABLED")]
    Disabled,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::HitDeduped => "HIT(DEDUPED)",
            CacheStatus::MissWrote => "MISS->WROTE",
            CacheStatus::Disabled => "DISABLED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidArgument,
    StoreUnavailable,
}

/// Tagged outcome of a turn operation. Failures are values, never panics or
/// propagated errors.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnsResult {
    pub ok: bool,
    #[serde(rename = "cache_status", skip_serializing_if = "Option::is_none")]
    pub cache_status: Option<CacheStatus>,
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Turn>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleared: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub failure: Option<FailureKind>,
}

impl TurnsResult {
    fn success(conversation_id: &str, cache_status: CacheStatus) -> Self {
        Self {
            ok: true,
            cache_status: Some(cache_status),
            conversation_id: conversation_id.to_string(),
            message_id: None,
            messages: None,
            cleared: None,
            error: None,
            failure: None,
        }
    }

    fn failed(conversation_id: &str, err: ServiceError) -> Self {
        let failure = match err {
            ServiceError::InvalidArgument(_) => FailureKind::InvalidArgument,
            ServiceError::StoreUnavailable(_) => FailureKind::StoreUnavailable,
        };
        Self {
            ok: false,
            cache_status: None,
            conversation_id: conversation_id.to_string(),
            message_id: None,
            messages: None,
            cleared: None,
            error: Some(err.to_string()),
            failure: Some(failure),
        }
    }
}

fn require(value: &str, name: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::InvalidArgument(format!("{} is required", name)));
    }
    Ok(())
}

/// Composes the turn cache, the dedupe guard and the authoritative store.
#[derive(Clone)]
pub struct TurnService {
    cache: TurnCache,
    dedupe: Arc<DedupeGuard>,
    store: Arc<dyn HistoryStore>,
}

impl TurnService {
    pub fn new(cache: TurnCache, dedupe: Arc<DedupeGuard>, store: Arc<dyn HistoryStore>) -> Self {
        Self { cache, dedupe, store }
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_enabled()
    }

    /// Most recent turns, newest first.
    pub async fn read_recent_turns(
        &self,
        conversation_id: &str,
        max_turns: usize,
        lookback_minutes: u64
    ) -> TurnsResult {
        match self.try_read(conversation_id, max_turns, lookback_minutes).await {
            Ok((status, turns)) => {
                debug!("get_turns '{}' -> {} ({} turns)", conversation_id, status.as_str(), turns.len());
                let mut result = TurnsResult::success(conversation_id, status);
                result.messages = Some(turns);
                result
            }
            Err(e) => TurnsResult::failed(conversation_id, e),
        }
    }

    async fn try_read(
        &self,
        conversation_id: &str,
        max_turns: usize,
        lookback_minutes: u64
    ) -> Result<(CacheStatus, Vec<Turn>), ServiceError> {
        require(conversation_id, "conversationId")?;
        if max_turns == 0 {
            return Err(ServiceError::InvalidArgument("maxTurns must be at least 1".into()));
        }

        let fp = fingerprint(conversation_id, max_turns, lookback_minutes);
        let duplicate = self.dedupe.should_serve_from_cache(&fp).await;

        // A duplicate with nothing cached falls through to the store.
        if let Some(turns) = self.cache.read(conversation_id, max_turns).await {
            let status = if duplicate { CacheStatus::HitDeduped } else { CacheStatus::Hit };
            return Ok((status, turns));
        }

        let raw = self.store.list_turns(conversation_id, max_turns, lookback_minutes).await.map_err(|e| {
            error!("Reading turns for '{}' failed: {}", conversation_id, e);
            ServiceError::from(e)
        })?;

        let mut turns: Vec<Turn> = raw
            .into_iter()
            .filter_map(|raw| {
                let normalized = raw.normalize();
                if normalized.is_none() {
                    warn!("Skipping malformed stored turn for '{}'", conversation_id);
                }
                normalized
            })
            .collect();
        Turn::sort_newest_first(&mut turns);
        turns.truncate(max_turns);

        if !self.cache.is_enabled() {
            return Ok((CacheStatus::Disabled, turns));
        }
        self.cache.replace(conversation_id, &turns).await;
        Ok((CacheStatus::MissWrote, turns))
    }

    /// Write-through append: the store first, the cache only after it succeeded.
    pub async fn append_turn(
        &self,
        conversation_id: &str,
        user_id: &str,
        role: &str,
        content: &str
    ) -> TurnsResult {
        match self.try_append(conversation_id, user_id, role, content).await {
            Ok((status, message_id)) => {
                let mut result = TurnsResult::success(conversation_id, status);
                result.message_id = message_id;
                result
            }
            Err(e) => TurnsResult::failed(conversation_id, e),
        }
    }

    async fn try_append(
        &self,
        conversation_id: &str,
        user_id: &str,
        role: &str,
        content: &str
    ) -> Result<(CacheStatus, Option<String>), ServiceError> {
        require(conversation_id, "conversationId")?;
        require(user_id, "userId")?;
        require(content, "content")?;
        let role = role
            .parse::<Role>()
            .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;

        let message_id = self.store.append_turn(conversation_id, user_id, role, content).await.map_err(|e| {
            error!("Logging turn for '{}' failed: {}", conversation_id, e);
            ServiceError::from(e)
        })?;

        if !self.cache.is_enabled() {
            return Ok((CacheStatus::Disabled, message_id));
        }
        let turn = Turn {
            id: message_id.clone(),
            role,
            content: content.to_string(),
            created_at: Some(Timestamp::now()),
        };
        self.cache.append(conversation_id, &turn).await;
        Ok((CacheStatus::MissWrote, message_id))
    }

    /// Drops the cached window for manual recovery.
    pub async fn clear_cache(&self, conversation_id: &str) -> TurnsResult {
        if let Err(e) = require(conversation_id, "conversationId") {
            return TurnsResult::failed(conversation_id, e);
        }
        let mut result = TurnsResult::success(conversation_id, CacheStatus::Disabled);
        if self.cache.is_enabled() {
            result.cache_status = None;
        }
        result.cleared = Some(self.cache.clear(conversation_id).await);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCacheBackend;
    use crate::cache::CacheBackend;
    use crate::error::{ CacheError, HistoryError };
    use crate::models::{ RawTurn, RawValue };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{ AtomicUsize, Ordering };
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Store double with canned ids and call counters.
    #[derive(Default)]
    struct ScriptedStore {
        turns: Mutex<Vec<RawTurn>>,
        fail: bool,
        appends: AtomicUsize,
        lists: AtomicUsize,
    }

    impl ScriptedStore {
        fn failing() -> Self {
            Self { fail: true, ..Default::default() }
        }
    }

    #[async_trait]
    impl HistoryStore for ScriptedStore {
        async fn append_turn(
            &self,
            _conversation_id: &str,
            _user_id: &str,
            role: Role,
            content: &str
        ) -> Result<Option<String>, HistoryError> {
            let n = self.appends.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(HistoryError::Rejected("firestore down".into()));
            }
            let id = format!("m{}", n);
            self.turns.lock().await.push(RawTurn {
                id: Some(json!(id)),
                role: Some(role.as_str().into()),
                content: Some(content.into()),
                created_at_seconds: Some(n as i64),
                ..Default::default()
            });
            Ok(Some(id))
        }

        async fn list_turns(
            &self,
            _conversation_id: &str,
            max_turns: usize,
            _lookback_minutes: u64
        ) -> Result<Vec<RawTurn>, HistoryError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(HistoryError::Rejected("firestore down".into()));
            }
            // Oldest first on purpose; the service must reorder.
            Ok(self.turns.lock().await.iter().take(max_turns).cloned().collect())
        }
    }

    struct BrokenCache;

    fn broken() -> CacheError {
        CacheError::from(redis::RedisError::from((redis::ErrorKind::IoError, "connection refused")))
    }

    #[async_trait]
    impl CacheBackend for BrokenCache {
        async fn push_front(&self, _key: &str, _values: &[String]) -> Result<(), CacheError> {
            Err(broken())
        }
        async fn range(&self, _key: &str, _s: isize, _e: isize) -> Result<Vec<RawValue>, CacheError> {
            Err(broken())
        }
        async fn trim(&self, _key: &str, _s: isize, _e: isize) -> Result<(), CacheError> {
            Err(broken())
        }
        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(broken())
        }
        async fn expire(&self, _key: &str, _seconds: u64) -> Result<(), CacheError> {
            Err(broken())
        }
    }

    fn service_with(
        backend: Option<Arc<dyn CacheBackend>>,
        store: Arc<ScriptedStore>
    ) -> TurnService {
        TurnService::new(
            TurnCache::new(backend, "turns:", 20, 86_400),
            Arc::new(DedupeGuard::from_millis(5_000, 100)),
            store
        )
    }

    fn ids(result: &TurnsResult) -> Vec<String> {
        result.messages
            .as_ref()
            .unwrap()
            .iter()
            .map(|t| t.id.clone().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn append_then_read_hits_cache() {
        let store = Arc::new(ScriptedStore::default());
        let service = service_with(Some(Arc::new(MemoryCacheBackend::new())), store.clone());

        let appended = service.append_turn("c1", "u1", "user", "hello").await;
        assert!(appended.ok);
        assert_eq!(appended.message_id.as_deref(), Some("m1"));

        let read = service.read_recent_turns("c1", 5, 60).await;
        assert!(read.ok);
        assert_eq!(read.cache_status, Some(CacheStatus::Hit));
        let turns = read.messages.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].id.as_deref(), Some("m1"));
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "hello");
        assert_eq!(store.lists.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn store_failure_leaves_cache_untouched() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let store = Arc::new(ScriptedStore::failing());
        let service = service_with(Some(backend.clone()), store);

        let result = service.append_turn("c1", "u1", "user", "hello").await;
        assert!(!result.ok);
        assert_eq!(result.failure, Some(FailureKind::StoreUnavailable));
        assert!(result.error.unwrap().contains("firestore down"));
        assert_eq!(backend.len("turns:c1").await, 0);
    }

    #[tokio::test]
    async fn read_through_failure_is_an_error_result() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let service = service_with(Some(backend.clone()), Arc::new(ScriptedStore::failing()));
        let result = service.read_recent_turns("c1", 5, 60).await;
        assert!(!result.ok);
        assert!(result.messages.is_none());
        assert_eq!(backend.len("turns:c1").await, 0);
    }

    #[tokio::test]
    async fn broken_cache_never_fails_the_caller() {
        let store = Arc::new(ScriptedStore::default());
        let service = service_with(Some(Arc::new(BrokenCache)), store.clone());

        assert!(service.append_turn("c1", "u1", "user", "a").await.ok);
        assert!(service.append_turn("c1", "u1", "assistant", "b").await.ok);

        let read = service.read_recent_turns("c1", 5, 60).await;
        assert!(read.ok);
        assert_eq!(read.cache_status, Some(CacheStatus::MissWrote));
        assert_eq!(ids(&read), vec!["m2", "m1"]);
    }

    #[tokio::test]
    async fn miss_populates_cache_newest_first() {
        let store = Arc::new(ScriptedStore::default());
        let writer = service_with(None, store.clone());
        for content in ["a", "b", "c"] {
            writer.append_turn("c1", "u1", "user", content).await;
        }

        let service = service_with(Some(Arc::new(MemoryCacheBackend::new())), store.clone());
        let first = service.read_recent_turns("c1", 5, 60).await;
        assert_eq!(first.cache_status, Some(CacheStatus::MissWrote));
        assert_eq!(ids(&first), vec!["m3", "m2", "m1"]);

        let second = service.read_recent_turns("c1", 4, 60).await;
        assert_eq!(second.cache_status, Some(CacheStatus::Hit));
        assert_eq!(ids(&second), vec!["m3", "m2", "m1"]);
        assert_eq!(store.lists.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_cache_reads_from_store() {
        let store = Arc::new(ScriptedStore::default());
        let service = service_with(None, store.clone());
        let appended = service.append_turn("c1", "u1", "user", "a").await;
        assert_eq!(appended.cache_status, Some(CacheStatus::Disabled));

        let read = service.read_recent_turns("c1", 5, 60).await;
        assert_eq!(read.cache_status, Some(CacheStatus::Disabled));
        let again = service.read_recent_turns("c1", 5, 60).await;
        assert_eq!(again.cache_status, Some(CacheStatus::Disabled));
        assert_eq!(store.lists.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn identical_burst_is_deduped() {
        let store = Arc::new(ScriptedStore::default());
        let service = service_with(Some(Arc::new(MemoryCacheBackend::new())), store.clone());
        for content in ["a", "b", "c"] {
            service.append_turn("c1", "u1", "user", content).await;
        }

        let first = service.read_recent_turns("c1", 5, 120).await;
        assert_eq!(first.cache_status, Some(CacheStatus::Hit));
        tokio::time::advance(Duration::from_millis(100)).await;
        let second = service.read_recent_turns("c1", 5, 120).await;
        assert_eq!(second.cache_status, Some(CacheStatus::HitDeduped));
        assert_eq!(ids(&second), ids(&first));
        assert_eq!(ids(&second).len(), 3);
        assert_eq!(store.lists.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn duplicate_without_cache_falls_through() {
        let store = Arc::new(ScriptedStore::default());
        let service = service_with(None, store.clone());
        service.append_turn("c1", "u1", "user", "a").await;

        let first = service.read_recent_turns("c1", 5, 120).await;
        let second = service.read_recent_turns("c1", 5, 120).await;
        assert!(first.ok && second.ok);
        assert_eq!(ids(&second), vec!["m1"]);
        assert_eq!(second.cache_status, Some(CacheStatus::Disabled));
        assert_eq!(store.lists.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_window_forces_store_fallback() {
        let store = Arc::new(ScriptedStore::default());
        let service = TurnService::new(
            TurnCache::new(Some(Arc::new(MemoryCacheBackend::new())), "turns:", 20, 100),
            Arc::new(DedupeGuard::from_millis(5_000, 100)),
            store.clone()
        );
        service.append_turn("c1", "u1", "user", "a").await;
        tokio::time::advance(Duration::from_secs(150)).await;

        let read = service.read_recent_turns("c1", 5, 60).await;
        assert_eq!(read.cache_status, Some(CacheStatus::MissWrote));
        assert_eq!(store.lists.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_arguments_skip_every_backend() {
        let store = Arc::new(ScriptedStore::default());
        let service = service_with(Some(Arc::new(MemoryCacheBackend::new())), store.clone());

        let cases = [
            service.append_turn("", "u1", "user", "a").await,
            service.append_turn("c1", " ", "user", "a").await,
            service.append_turn("c1", "u1", "robot", "a").await,
            service.append_turn("c1", "u1", "user", "").await,
            service.read_recent_turns("", 5, 60).await,
            service.read_recent_turns("c1", 0, 60).await,
            service.clear_cache("").await,
        ];
        for result in cases {
            assert!(!result.ok);
            assert_eq!(result.failure, Some(FailureKind::InvalidArgument));
        }
        assert_eq!(store.appends.load(Ordering::SeqCst), 0);
        assert_eq!(store.lists.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn clear_cache_forces_next_read_to_store() {
        let store = Arc::new(ScriptedStore::default());
        let service = service_with(Some(Arc::new(MemoryCacheBackend::new())), store.clone());
        service.append_turn("c1", "u1", "user", "a").await;

        let cleared = service.clear_cache("c1").await;
        assert!(cleared.ok);
        assert_eq!(cleared.cleared, Some(true));

        let read = service.read_recent_turns("c1", 3, 60).await;
        assert_eq!(read.cache_status, Some(CacheStatus::MissWrote));
    }

    #[test]
    fn result_serializes_with_wire_names() {
        let mut result = TurnsResult::success("c1", CacheStatus::HitDeduped);
        result.messages = Some(Vec::new());
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value, json!({
            "ok": true,
            "cache_status": "HIT(DEDUPED)",
            "conversationId": "c1",
            "messages": []
        }));
    }
}

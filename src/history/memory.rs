use async_trait::async_trait;
use chrono::{ Duration as ChronoDuration, Utc };
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;
use crate::error::HistoryError;
use crate::history::HistoryStore;
use crate::models::{ RawTurn, Role, Timestamp };

// A century; keeps the lookback subtraction in range.
const MAX_LOOKBACK_MINUTES: u64 = 100 * 365 * 24 * 60;

#[derive(Clone)]
struct StoredTurn {
    id: String,
    role: Role,
    content: String,
    created_at: Timestamp,
}

/// Process-local conversation log for development and tests.
#[derive(Default)]
pub struct MemoryHistoryStore {
    conversations: RwLock<HashMap<String, Vec<StoredTurn>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append_turn(
        &self,
        conversation_id: &str,
        _user_id: &str,
        role: Role,
        content: &str
    ) -> Result<Option<String>, HistoryError> {
        let id = Uuid::new_v4().to_string();
        let turn = StoredTurn {
            id: id.clone(),
            role,
            content: content.to_string(),
            created_at: Timestamp::now(),
        };
        self.conversations
            .write().await
            .entry(conversation_id.to_string())
            .or_default()
            .push(turn);
        Ok(Some(id))
    }

    async fn list_turns(
        &self,
        conversation_id: &str,
        max_turns: usize,
        lookback_minutes: u64
    ) -> Result<Vec<RawTurn>, HistoryError> {
        let since = Timestamp::from_datetime(
            Utc::now() - ChronoDuration::minutes(lookback_minutes.min(MAX_LOOKBACK_MINUTES) as i64)
        );
        let conversations = self.conversations.read().await;
        let Some(turns) = conversations.get(conversation_id) else {
            return Ok(Vec::new());
        };
        Ok(
            turns
                .iter()
                .rev()
                .filter(|t| t.created_at >= since)
                .take(max_turns)
                .map(|t| RawTurn {
                    id: Some(t.id.clone().into()),
                    role: Some(t.role.as_str().to_string()),
                    content: Some(t.content.clone()),
                    created_at: Some(t.created_at),
                    ..Default::default()
                })
                .collect()
        )
    }
}

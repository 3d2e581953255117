use async_trait::async_trait;
use log::{ error, warn };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;
use std::time::Duration;
use crate::cli::Args;
use crate::error::HistoryError;
use crate::history::HistoryStore;
use crate::models::{ RawTurn, Role };

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogMessageRequest<'a> {
    conversation_id: &'a str,
    user_id: &'a str,
    role: Role,
    content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GetTurnsRequest<'a> {
    conversation_id: &'a str,
    max_turns: usize,
    lookback_minutes: u64,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LogMessageResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    message_id: Option<JsonValue>,
    #[serde(default)]
    error: Option<JsonValue>,
}

#[derive(Deserialize, Default)]
struct GetTurnsResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    messages: Vec<JsonValue>,
    #[serde(default)]
    error: Option<JsonValue>,
}

fn error_text(error: Option<JsonValue>, status: reqwest::StatusCode) -> String {
    match error {
        Some(JsonValue::String(s)) => s,
        Some(other) => other.to_string(),
        None => format!("HTTP {}", status),
    }
}

/// Turns persisted in Firestore behind the `logMessage` / `getTurns` Cloud Functions.
pub struct FunctionsHistoryStore {
    http: HttpClient,
    base_url: String,
}

impl FunctionsHistoryStore {
    pub fn new(args: &Args) -> Result<Self, HistoryError> {
        let base_url = args
            .functions_url()
            .ok_or_else(|| HistoryError::NotConfigured("FUNCTIONS_BASE_URL is not set".into()))?;
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(args.http_timeout_secs))
            .build()?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: HttpClient, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de> + Default>(
        &self,
        function: &str,
        body: &B
    ) -> Result<(reqwest::StatusCode, R), HistoryError> {
        let url = format!("{}/{}", self.base_url, function);
        let resp = self.http.post(&url).json(body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        // Error responses do not always carry a JSON body.
        let parsed = match serde_json::from_str::<R>(&text) {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => {
                return Err(HistoryError::Decode(e));
            }
            Err(_) => R::default(),
        };
        Ok((status, parsed))
    }
}

#[async_trait]
impl HistoryStore for FunctionsHistoryStore {
    async fn append_turn(
        &self,
        conversation_id: &str,
        user_id: &str,
        role: Role,
        content: &str
    ) -> Result<Option<String>, HistoryError> {
        let req = LogMessageRequest { conversation_id, user_id, role, content };
        let (status, resp) = self.post::<_, LogMessageResponse>("logMessage", &req).await?;

        if !status.is_success() || !resp.ok {
            let msg = error_text(resp.error, status);
            error!("logMessage failed for '{}': {}", conversation_id, msg);
            return Err(HistoryError::Rejected(msg));
        }

        Ok(
            resp.message_id.and_then(|id| {
                match id {
                    JsonValue::String(s) => Some(s),
                    JsonValue::Number(n) => Some(n.to_string()),
                    _ => None,
                }
            })
        )
    }

    async fn list_turns(
        &self,
        conversation_id: &str,
        max_turns: usize,
        lookback_minutes: u64
    ) -> Result<Vec<RawTurn>, HistoryError> {
        let req = GetTurnsRequest { conversation_id, max_turns, lookback_minutes };
        let (status, resp) = self.post::<_, GetTurnsResponse>("getTurns", &req).await?;

        if !status.is_success() || !resp.ok {
            let msg = error_text(resp.error, status);
            error!("getTurns failed for '{}': {}", conversation_id, msg);
            return Err(HistoryError::Rejected(msg));
        }

        let mut turns = Vec::with_capacity(resp.messages.len());
        for message in resp.messages {
            match serde_json::from_value::<RawTurn>(message) {
                Ok(raw) => turns.push(raw),
                Err(e) => warn!("Skipping undecodable turn for '{}': {}", conversation_id, e),
            }
        }
        Ok(turns)
    }
}

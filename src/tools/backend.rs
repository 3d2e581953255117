use crate::error::ToolError;
use log::error;
use reqwest::{ Client as HttpClient, StatusCode };
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;

pub fn http_client(timeout_secs: u64) -> Result<HttpClient, ToolError> {
    Ok(HttpClient::builder().timeout(Duration::from_secs(timeout_secs)).build()?)
}

fn error_text(body: &JsonValue, status: StatusCode) -> String {
    match body.get("error") {
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => format!("HTTP {}", status),
    }
}

/// POSTs `body` to a backend answering with an `{ok, ..., error?}` envelope.
/// Returns the whole JSON body on success.
pub async fn post_envelope<B: Serialize + ?Sized>(
    http: &HttpClient,
    url: &str,
    body: &B
) -> Result<JsonValue, ToolError> {
    let resp = http.post(url).json(body).send().await?;
    let status = resp.status();
    let text = resp.text().await?;
    let parsed: JsonValue = serde_json::from_str(&text).unwrap_or(JsonValue::Null);

    if status == StatusCode::NOT_FOUND {
        return Err(ToolError::NotFound(error_text(&parsed, status)));
    }
    let ok_flag = parsed.get("ok").and_then(JsonValue::as_bool).unwrap_or(true);
    if !status.is_success() || !ok_flag || parsed.is_null() {
        let msg = error_text(&parsed, status);
        error!("Backend call to {} failed: {}", url, msg);
        return Err(ToolError::Upstream(msg));
    }
    Ok(parsed)
}

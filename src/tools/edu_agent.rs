use reqwest::Client as HttpClient;
use serde::Serialize;
use serde_json::Value as JsonValue;
use crate::error::ToolError;
use super::backend::post_envelope;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AskRequest<'a> {
    question: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    student_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
}

/// Agents answer under different field names.
fn extract_answer(body: &JsonValue) -> Option<String> {
    ["answer", "reply", "response", "text"]
        .iter()
        .find_map(|key| body.get(*key).and_then(JsonValue::as_str))
        .map(str::to_string)
}

/// Client for the LLM-backed EduAgent.
pub struct EduAgentClient {
    http: HttpClient,
    url: String,
}

impl EduAgentClient {
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self { http, url: url.into() }
    }

    pub async fn ask(
        &self,
        question: &str,
        student_id: Option<&str>,
        conversation_id: Option<&str>
    ) -> Result<String, ToolError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ToolError::InvalidArgument("question is required".into()));
        }
        let req = AskRequest {
            question,
            student_id: student_id.filter(|s| !s.trim().is_empty()),
            conversation_id: conversation_id.filter(|s| !s.trim().is_empty()),
        };
        let body = post_envelope(&self.http, &self.url, &req).await?;
        extract_answer(&body).ok_or_else(|| ToolError::Upstream("EduAgent returned no answer".into()))
    }
}

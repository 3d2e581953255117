use reqwest::Client as HttpClient;
use serde_json::{ json, Value as JsonValue };
use crate::error::ToolError;
use super::backend::post_envelope;

fn require_student_id(student_id: &str) -> Result<&str, ToolError> {
    let student_id = student_id.trim();
    if student_id.is_empty() {
        return Err(ToolError::InvalidArgument("studentId is required".into()));
    }
    Ok(student_id)
}

/// Student profiles behind the `getStudent` / `upsertStudent` Cloud Functions.
pub struct StudentsClient {
    http: HttpClient,
    base_url: String,
}

impl StudentsClient {
    pub fn new(http: HttpClient, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn get_student(&self, student_id: &str) -> Result<JsonValue, ToolError> {
        let student_id = require_student_id(student_id)?;
        let url = format!("{}/getStudent", self.base_url);
        let body = post_envelope(&self.http, &url, &json!({ "studentId": student_id })).await?;
        match body.get("student") {
            Some(student) if !student.is_null() => Ok(student.clone()),
            _ => Err(ToolError::NotFound(format!("Student '{}' not found", student_id))),
        }
    }

    pub async fn upsert_student(
        &self,
        student_id: &str,
        profile: JsonValue
    ) -> Result<JsonValue, ToolError> {
        let student_id = require_student_id(student_id)?;
        if !profile.is_object() {
            return Err(ToolError::InvalidArgument("profile must be an object".into()));
        }
        let url = format!("{}/upsertStudent", self.base_url);
        let body = post_envelope(
            &self.http,
            &url,
            &json!({ "studentId": student_id, "profile": profile })
        ).await?;
        Ok(body.get("student").cloned().unwrap_or_else(|| json!({ "studentId": student_id })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blank_student_id_is_rejected_before_any_call() {
        let client = StudentsClient::new(HttpClient::new(), "http://127.0.0.1:9");
        assert!(matches!(client.get_student(" ").await, Err(ToolError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn profile_must_be_an_object() {
        let client = StudentsClient::new(HttpClient::new(), "http://127.0.0.1:9");
        let result = client.upsert_student("s1", json!("nope")).await;
        assert!(matches!(result, Err(ToolError::InvalidArgument(_))));
    }
}

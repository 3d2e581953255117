use async_trait::async_trait;
use log::{ error, info };
use reqwest::Client as HttpClient;
use serde_json::{ json, Value as JsonValue };
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use crate::cli::Args;
use crate::error::ToolError;
use super::backend::{ http_client, post_envelope };

/// Where curriculum documents come from.
#[async_trait]
pub trait CurriculumSource: Send + Sync {
    async fn load(&self, year_id: &str) -> Result<JsonValue, ToolError>;
}

/// Year ids end up in file names and URLs, so only a plain slug is accepted.
pub fn validate_year_id(year_id: &str) -> Result<&str, ToolError> {
    let year_id = year_id.trim();
    if year_id.is_empty() {
        return Err(ToolError::InvalidArgument("yearId is required".into()));
    }
    let valid = year_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(ToolError::InvalidArgument(format!("Invalid yearId: '{}'", year_id)));
    }
    Ok(year_id)
}

/// Reads `curriculum_<yearId>.json` from a directory.
pub struct LocalCurriculum {
    dir: PathBuf,
}

impl LocalCurriculum {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, year_id: &str) -> PathBuf {
        self.dir.join(format!("curriculum_{}.json", year_id))
    }
}

#[async_trait]
impl CurriculumSource for LocalCurriculum {
    async fn load(&self, year_id: &str) -> Result<JsonValue, ToolError> {
        let year_id = validate_year_id(year_id)?;
        let path = self.path_for(year_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ToolError::NotFound("Year not found".into()));
            }
            Err(e) => {
                error!("Failed to read curriculum file {}: {}", path.display(), e);
                return Err(e.into());
            }
        };
        Ok(serde_json::from_str(&content)?)
    }
}

/// Fetches curriculum from a remote `get-curriculum` endpoint.
pub struct RemoteCurriculum {
    http: HttpClient,
    url: String,
}

impl RemoteCurriculum {
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self { http, url: url.into() }
    }
}

#[async_trait]
impl CurriculumSource for RemoteCurriculum {
    async fn load(&self, year_id: &str) -> Result<JsonValue, ToolError> {
        let year_id = validate_year_id(year_id)?;
        let body = post_envelope(&self.http, &self.url, &json!({ "yearId": year_id })).await?;
        Ok(body.get("data").cloned().unwrap_or(JsonValue::Null))
    }
}

pub fn create_curriculum_source(args: &Args) -> Result<Arc<dyn CurriculumSource>, ToolError> {
    match args.curriculum_api_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => {
            info!("Curriculum will be fetched from: {}", url);
            Ok(Arc::new(RemoteCurriculum::new(http_client(args.http_timeout_secs)?, url)))
        }
        None => {
            info!("Curriculum will be read from directory: {}", args.curriculum_dir);
            Ok(Arc::new(LocalCurriculum::new(&args.curriculum_dir)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("edu-turns-{}-{}", name, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn year_id_must_be_a_slug() {
        assert!(validate_year_id("year_1_secondary").is_ok());
        assert!(matches!(validate_year_id("  "), Err(ToolError::InvalidArgument(_))));
        assert!(matches!(validate_year_id("../etc/passwd"), Err(ToolError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn loads_curriculum_file() {
        let dir = temp_dir("load");
        std::fs::write(dir.join("curriculum_year_1_secondary.json"), r#"{"units":[]}"#).unwrap();
        let source = LocalCurriculum::new(&dir);
        let data = source.load("year_1_secondary").await.unwrap();
        assert_eq!(data, serde_json::json!({"units": []}));
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn missing_year_is_not_found() {
        let dir = temp_dir("missing");
        let source = LocalCurriculum::new(&dir);
        assert!(matches!(source.load("year_9").await, Err(ToolError::NotFound(_))));
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn corrupt_file_is_a_json_error() {
        let dir = temp_dir("corrupt");
        std::fs::write(dir.join("curriculum_y1.json"), "{").unwrap();
        let source = LocalCurriculum::new(&dir);
        assert!(matches!(source.load("y1").await, Err(ToolError::Json(_))));
        std::fs::remove_dir_all(dir).ok();
    }
}

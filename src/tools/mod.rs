pub mod backend;
pub mod curriculum;
pub mod edu_agent;
pub mod schedule;
pub mod students;

use log::{ info, warn };
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{ json, Value as JsonValue };
use std::error::Error;
use std::sync::Arc;

use crate::cli::Args;
use crate::error::ToolError;
use crate::models::mcp::{ ToolDescriptor, ToolResult };
use crate::service::{ FailureKind, TurnService, TurnsResult };
use self::curriculum::{ create_curriculum_source, CurriculumSource };
use self::edu_agent::EduAgentClient;
use self::students::StudentsClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolFailure {
    InvalidArgument,
    NotFound,
    Upstream,
}

impl From<&ToolError> for ToolFailure {
    fn from(err: &ToolError) -> Self {
        match err {
            ToolError::InvalidArgument(_) => ToolFailure::InvalidArgument,
            ToolError::NotFound(_) => ToolFailure::NotFound,
            _ => ToolFailure::Upstream,
        }
    }
}

impl From<FailureKind> for ToolFailure {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::InvalidArgument => ToolFailure::InvalidArgument,
            FailureKind::StoreUnavailable => ToolFailure::Upstream,
        }
    }
}

/// Outcome of one tool call, shared by the MCP and REST surfaces.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub summary: String,
    pub structured: JsonValue,
    pub failure: Option<ToolFailure>,
}

impl ToolOutput {
    fn ok(summary: impl Into<String>, structured: JsonValue) -> Self {
        Self { summary: summary.into(), structured, failure: None }
    }

    fn failed(context: &str, err: ToolError) -> Self {
        let failure = ToolFailure::from(&err);
        let message = err.to_string();
        Self {
            summary: format!("{}: {}", context, message),
            structured: json!({ "ok": false, "error": message }),
            failure: Some(failure),
        }
    }

    fn from_turns(summary: String, result: TurnsResult) -> Self {
        let failure = result.failure.map(ToolFailure::from);
        let structured = serde_json::to_value(&result).unwrap_or_else(|e| {
            json!({ "ok": false, "error": e.to_string() })
        });
        Self { summary, structured, failure }
    }

    pub fn into_tool_result(self) -> ToolResult {
        if self.failure.is_some() {
            ToolResult::error(self.summary, self.structured)
        } else {
            ToolResult::ok(self.summary, self.structured)
        }
    }
}

fn parse_args<T: DeserializeOwned>(arguments: JsonValue) -> Result<T, ToolError> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArgument(e.to_string()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogMessageArgs {
    #[serde(default)]
    conversation_id: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetTurnsArgs {
    #[serde(default)]
    conversation_id: String,
    max_turns: Option<usize>,
    lookback_minutes: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationArgs {
    #[serde(default)]
    conversation_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct YearArgs {
    #[serde(default)]
    year_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleArgs {
    #[serde(default)]
    year_id: String,
    lessons_per_day: Option<usize>,
    start_day: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentArgs {
    #[serde(default)]
    student_id: String,
    #[serde(default)]
    profile: JsonValue,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AskArgs {
    #[serde(default)]
    question: String,
    student_id: Option<String>,
    conversation_id: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ToolDefaults {
    pub max_turns: usize,
    pub lookback_minutes: u64,
    pub lessons_per_day: usize,
}

impl Default for ToolDefaults {
    fn default() -> Self {
        Self { max_turns: 10, lookback_minutes: 120, lessons_per_day: 3 }
    }
}

/// Dispatches tool calls by name.
#[derive(Clone)]
pub struct ToolRegistry {
    turns: TurnService,
    curriculum: Arc<dyn CurriculumSource>,
    students: Option<Arc<StudentsClient>>,
    edu_agent: Option<Arc<EduAgentClient>>,
    defaults: ToolDefaults,
}

impl ToolRegistry {
    pub fn new(
        turns: TurnService,
        curriculum: Arc<dyn CurriculumSource>,
        students: Option<Arc<StudentsClient>>,
        edu_agent: Option<Arc<EduAgentClient>>,
        defaults: ToolDefaults
    ) -> Self {
        Self { turns, curriculum, students, edu_agent, defaults }
    }

    pub fn from_args(
        args: &Args,
        turns: TurnService
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let curriculum = create_curriculum_source(args)?;
        let http = backend::http_client(args.http_timeout_secs)?;

        let students = args.functions_url().map(|url| Arc::new(StudentsClient::new(http.clone(), url)));
        if students.is_none() {
            warn!("FUNCTIONS_BASE_URL not set: get_student and upsert_student are unavailable.");
        }

        let edu_agent = args.edu_agent_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(|url| Arc::new(EduAgentClient::new(http.clone(), url)));
        if edu_agent.is_none() {
            warn!("EDU_AGENT_URL not set: ask_edu_agent is unavailable.");
        } else {
            info!("EduAgent configured");
        }

        let defaults = ToolDefaults {
            max_turns: args.default_max_turns.max(1),
            lookback_minutes: args.default_lookback_minutes,
            lessons_per_day: args.lessons_per_day.max(1),
        };
        Ok(Self::new(turns, curriculum, students, edu_agent, defaults))
    }

    pub fn turns(&self) -> &TurnService {
        &self.turns
    }

    /// Runs `name`, or returns `None` for an unknown tool.
    pub async fn call(&self, name: &str, arguments: JsonValue) -> Option<ToolOutput> {
        let output = match name {
            "log_message" => self.log_message(arguments).await,
            "get_turns" => self.get_turns(arguments).await,
            "clear_cache" => self.clear_cache(arguments).await,
            "get_curriculum" => self.get_curriculum(arguments).await,
            "generate_schedule_from_curriculum" => self.generate_schedule(arguments).await,
            "get_student" => self.get_student(arguments).await,
            "upsert_student" => self.upsert_student(arguments).await,
            "ask_edu_agent" => self.ask_edu_agent(arguments).await,
            _ => {
                return None;
            }
        };
        Some(output)
    }

    async fn log_message(&self, arguments: JsonValue) -> ToolOutput {
        let args: LogMessageArgs = match parse_args(arguments) {
            Ok(args) => args,
            Err(e) => {
                return ToolOutput::failed("Failed to log message", e);
            }
        };
        let result = self.turns.append_turn(
            &args.conversation_id,
            &args.user_id,
            &args.role,
            &args.content
        ).await;
        let summary = if result.ok {
            format!("Message logged for {}", args.conversation_id)
        } else {
            format!("Failed to log message: {}", result.error.as_deref().unwrap_or("unknown error"))
        };
        ToolOutput::from_turns(summary, result)
    }

    async fn get_turns(&self, arguments: JsonValue) -> ToolOutput {
        let args: GetTurnsArgs = match parse_args(arguments) {
            Ok(args) => args,
            Err(e) => {
                return ToolOutput::failed("Failed to load turns", e);
            }
        };
        let result = self.turns.read_recent_turns(
            &args.conversation_id,
            args.max_turns.unwrap_or(self.defaults.max_turns),
            args.lookback_minutes.unwrap_or(self.defaults.lookback_minutes)
        ).await;
        let summary = match (&result.messages, result.cache_status) {
            (Some(messages), Some(status)) =>
                format!(
                    "Loaded {} turns for {} ({})",
                    messages.len(),
                    args.conversation_id,
                    status.as_str()
                ),
            _ => format!("Failed to load turns: {}", result.error.as_deref().unwrap_or("unknown error")),
        };
        ToolOutput::from_turns(summary, result)
    }

    async fn clear_cache(&self, arguments: JsonValue) -> ToolOutput {
        let args: ConversationArgs = match parse_args(arguments) {
            Ok(args) => args,
            Err(e) => {
                return ToolOutput::failed("Failed to clear cache", e);
            }
        };
        let result = self.turns.clear_cache(&args.conversation_id).await;
        let summary = if result.ok {
            format!("Cache cleared for {}", args.conversation_id)
        } else {
            format!("Failed to clear cache: {}", result.error.as_deref().unwrap_or("unknown error"))
        };
        ToolOutput::from_turns(summary, result)
    }

    async fn get_curriculum(&self, arguments: JsonValue) -> ToolOutput {
        let result = async {
            let args: YearArgs = parse_args(arguments)?;
            let data = self.curriculum.load(&args.year_id).await?;
            Ok::<_, ToolError>((args.year_id, data))
        }.await;
        match result {
            Ok((year_id, data)) =>
                ToolOutput::ok(
                    format!("Curriculum loaded for {}", year_id.trim()),
                    json!({ "ok": true, "curriculum": data })
                ),
            Err(e) => ToolOutput::failed("Failed to load curriculum", e),
        }
    }

    async fn generate_schedule(&self, arguments: JsonValue) -> ToolOutput {
        let result = async {
            let args: ScheduleArgs = parse_args(arguments)?;
            let data = self.curriculum.load(&args.year_id).await?;
            let schedule = schedule::build_schedule(
                &data,
                args.lessons_per_day.unwrap_or(self.defaults.lessons_per_day),
                args.start_day.unwrap_or(1)
            )?;
            Ok::<_, ToolError>((args.year_id, schedule))
        }.await;
        match result {
            Ok((year_id, schedule)) => {
                let summary = format!(
                    "Schedule for {}: {} lessons over {} days",
                    year_id.trim(),
                    schedule.total_lessons,
                    schedule.total_days
                );
                let mut structured = json!({ "ok": true, "yearId": year_id.trim() });
                if let (Some(obj), Ok(JsonValue::Object(extra))) = (
                    structured.as_object_mut(),
                    serde_json::to_value(&schedule),
                ) {
                    obj.extend(extra);
                }
                ToolOutput::ok(summary, structured)
            }
            Err(e) => ToolOutput::failed("Failed to generate schedule", e),
        }
    }

    fn students(&self) -> Result<&StudentsClient, ToolError> {
        self.students
            .as_deref()
            .ok_or_else(|| ToolError::Upstream("Student backend is not configured".into()))
    }

    async fn get_student(&self, arguments: JsonValue) -> ToolOutput {
        let result = async {
            let args: StudentArgs = parse_args(arguments)?;
            self.students()?.get_student(&args.student_id).await
        }.await;
        match result {
            Ok(student) => ToolOutput::ok("Student loaded", json!({ "ok": true, "student": student })),
            Err(e) => ToolOutput::failed("Failed to load student", e),
        }
    }

    async fn upsert_student(&self, arguments: JsonValue) -> ToolOutput {
        let result = async {
            let args: StudentArgs = parse_args(arguments)?;
            self.students()?.upsert_student(&args.student_id, args.profile).await
        }.await;
        match result {
            Ok(student) => ToolOutput::ok("Student saved", json!({ "ok": true, "student": student })),
            Err(e) => ToolOutput::failed("Failed to save student", e),
        }
    }

    async fn ask_edu_agent(&self, arguments: JsonValue) -> ToolOutput {
        let result = async {
            let args: AskArgs = parse_args(arguments)?;
            let agent = self.edu_agent
                .as_deref()
                .ok_or_else(|| ToolError::Upstream("EduAgent is not configured".into()))?;
            agent.ask(
                &args.question,
                args.student_id.as_deref(),
                args.conversation_id.as_deref()
            ).await
        }.await;
        match result {
            Ok(answer) => ToolOutput::ok(answer.clone(), json!({ "ok": true, "answer": answer })),
            Err(e) => ToolOutput::failed("EduAgent failed", e),
        }
    }
}

pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "log_message",
            description: "Append a message to a conversation log.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "conversationId": { "type": "string" },
                    "userId": { "type": "string" },
                    "role": { "type": "string", "enum": ["user", "assistant", "system"] },
                    "content": { "type": "string" }
                },
                "required": ["conversationId", "userId", "role", "content"]
            }),
        },
        ToolDescriptor {
            name: "get_turns",
            description: "Most recent turns of a conversation, newest first.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "conversationId": { "type": "string" },
                    "maxTurns": { "type": "integer", "minimum": 1 },
                    "lookbackMinutes": { "type": "integer", "minimum": 0 }
                },
                "required": ["conversationId"]
            }),
        },
        ToolDescriptor {
            name: "clear_cache",
            description: "Drop the cached turn window of a conversation.",
            input_schema: json!({
                "type": "object",
                "properties": { "conversationId": { "type": "string" } },
                "required": ["conversationId"]
            }),
        },
        ToolDescriptor {
            name: "get_curriculum",
            description: "Load the curriculum of a school year.",
            input_schema: json!({
                "type": "object",
                "properties": { "yearId": { "type": "string" } },
                "required": ["yearId"]
            }),
        },
        ToolDescriptor {
            name: "generate_schedule_from_curriculum",
            description: "Split a year's curriculum into daily lesson buckets.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "yearId": { "type": "string" },
                    "lessonsPerDay": { "type": "integer", "minimum": 1 },
                    "startDay": { "type": "integer", "minimum": 0 }
                },
                "required": ["yearId"]
            }),
        },
        ToolDescriptor {
            name: "get_student",
            description: "Fetch a student profile.",
            input_schema: json!({
                "type": "object",
                "properties": { "studentId": { "type": "string" } },
                "required": ["studentId"]
            }),
        },
        ToolDescriptor {
            name: "upsert_student",
            description: "Create or update a student profile.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "studentId": { "type": "string" },
                    "profile": { "type": "object" }
                },
                "required": ["studentId", "profile"]
            }),
        },
        ToolDescriptor {
            name: "ask_edu_agent",
            description: "Ask the education agent a question.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "question": { "type": "string" },
                    "studentId": { "type": "string" },
                    "conversationId": { "type": "string" }
                },
                "required": ["question"]
            }),
        }
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCacheBackend;
    use crate::cache::TurnCache;
    use crate::dedupe::DedupeGuard;
    use crate::history::MemoryHistoryStore;
    use async_trait::async_trait;

    struct FixedCurriculum(JsonValue);

    #[async_trait]
    impl CurriculumSource for FixedCurriculum {
        async fn load(&self, year_id: &str) -> Result<JsonValue, ToolError> {
            curriculum::validate_year_id(year_id)?;
            if year_id == "year_1_secondary" {
                Ok(self.0.clone())
            } else {
                Err(ToolError::NotFound("Year not found".into()))
            }
        }
    }

    fn registry() -> ToolRegistry {
        let turns = TurnService::new(
            TurnCache::new(Some(Arc::new(MemoryCacheBackend::new())), "turns:", 20, 3600),
            Arc::new(DedupeGuard::from_millis(5_000, 100)),
            Arc::new(MemoryHistoryStore::new())
        );
        let curriculum = FixedCurriculum(json!({ "lessons": ["a", "b", "c", "d"] }));
        ToolRegistry::new(turns, Arc::new(curriculum), None, None, ToolDefaults::default())
    }

    #[tokio::test]
    async fn unknown_tool_is_none() {
        assert!(registry().call("delete_everything", json!({})).await.is_none());
    }

    #[tokio::test]
    async fn log_then_get_turns() {
        let registry = registry();
        let logged = registry
            .call(
                "log_message",
                json!({"conversationId": "c1", "userId": "u1", "role": "user", "content": "hello"})
            ).await
            .unwrap();
        assert!(logged.failure.is_none());
        assert_eq!(logged.structured["ok"], json!(true));

        let turns = registry.call("get_turns", json!({"conversationId": "c1"})).await.unwrap();
        assert_eq!(turns.structured["cache_status"], json!("HIT"));
        assert_eq!(turns.structured["messages"][0]["content"], json!("hello"));
        assert!(turns.summary.starts_with("Loaded 1 turns"));
    }

    #[tokio::test]
    async fn missing_conversation_is_invalid_argument() {
        let output = registry().call("get_turns", JsonValue::Null).await.unwrap();
        assert_eq!(output.failure, Some(ToolFailure::InvalidArgument));
        assert_eq!(output.structured["ok"], json!(false));
    }

    #[tokio::test]
    async fn wrongly_typed_arguments_are_invalid() {
        let output = registry().call("get_turns", json!({"conversationId": "c1", "maxTurns": "many"})).await.unwrap();
        assert_eq!(output.failure, Some(ToolFailure::InvalidArgument));
    }

    #[tokio::test]
    async fn curriculum_and_schedule() {
        let registry = registry();
        let curriculum = registry.call("get_curriculum", json!({"yearId": "year_1_secondary"})).await.unwrap();
        assert_eq!(curriculum.summary, "Curriculum loaded for year_1_secondary");
        assert_eq!(curriculum.structured["curriculum"]["lessons"][0], json!("a"));

        let missing = registry.call("get_curriculum", json!({"yearId": "year_2"})).await.unwrap();
        assert_eq!(missing.failure, Some(ToolFailure::NotFound));

        let schedule = registry
            .call("generate_schedule_from_curriculum", json!({"yearId": "year_1_secondary", "lessonsPerDay": 3}))
            .await
            .unwrap();
        assert_eq!(schedule.structured["totalDays"], json!(2));
        assert_eq!(schedule.structured["days"][1]["lessons"], json!(["d"]));

        let overflow = registry
            .call(
                "generate_schedule_from_curriculum",
                json!({"yearId": "year_1_secondary", "lessonsPerDay": 1, "startDay": usize::MAX})
            ).await
            .unwrap();
        assert_eq!(overflow.failure, Some(ToolFailure::InvalidArgument));
        assert_eq!(overflow.structured["ok"], json!(false));
    }

    #[tokio::test]
    async fn unconfigured_backends_are_upstream_failures() {
        let registry = registry();
        let student = registry.call("get_student", json!({"studentId": "s1"})).await.unwrap();
        assert_eq!(student.failure, Some(ToolFailure::Upstream));
        let agent = registry.call("ask_edu_agent", json!({"question": "why?"})).await.unwrap();
        assert_eq!(agent.failure, Some(ToolFailure::Upstream));
        assert!(agent.into_tool_result().is_error);
    }

    #[test]
    fn every_tool_is_described() {
        let names: Vec<_> = descriptors()
            .iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names.len(), 8);
        assert!(names.contains(&"get_turns"));
        assert!(names.contains(&"log_message"));
    }
}

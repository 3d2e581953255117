use super::AppState;
use crate::tools::{ ToolFailure, ToolOutput };
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{ IntoResponse, Response },
    routing::{ post, MethodRouter },
    Json,
};
use log::debug;
use serde_json::{ json, Value as JsonValue };

pub async fn root_handler() -> &'static str {
    "Edu turns API is running"
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "cache": state.registry.turns().cache_enabled(),
    }))
}

fn status_for(output: &ToolOutput) -> StatusCode {
    match output.failure {
        None => StatusCode::OK,
        Some(ToolFailure::InvalidArgument) => StatusCode::BAD_REQUEST,
        Some(ToolFailure::NotFound) => StatusCode::NOT_FOUND,
        Some(ToolFailure::Upstream) => StatusCode::BAD_GATEWAY,
    }
}

/// Empty bodies count as `{}`.
pub(crate) fn parse_body(body: &Bytes) -> Result<JsonValue, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": format!("Invalid JSON body: {}", e) })),
        ).into_response()
    })
}

async fn call_tool(state: AppState, name: &'static str, body: Bytes) -> Response {
    let arguments = match parse_body(&body) {
        Ok(arguments) => arguments,
        Err(resp) => {
            return resp;
        }
    };
    match state.registry.call(name, arguments).await {
        Some(output) => {
            debug!("REST {} -> {}", name, output.summary);
            (status_for(&output), Json(output.structured)).into_response()
        }
        None => (StatusCode::NOT_FOUND, Json(json!({ "ok": false, "error": "Unknown tool" }))).into_response(),
    }
}

/// POST route running tool `name` with the JSON body as its arguments.
pub fn tool_route(name: &'static str) -> MethodRouter<AppState> {
    post(move |State(state): State<AppState>, body: Bytes| call_tool(state, name, body))
}

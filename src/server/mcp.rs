use super::AppState;
use super::api::parse_body;
use crate::models::mcp::{
    JsonRpcRequest,
    JsonRpcResponse,
    ToolCallParams,
    INTERNAL_ERROR,
    INVALID_PARAMS,
    INVALID_REQUEST,
    METHOD_NOT_FOUND,
    PARSE_ERROR,
    PROTOCOL_VERSION,
};
use crate::tools::{ self, ToolRegistry };
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{ IntoResponse, Response },
    Json,
};
use log::{ debug, info };
use serde_json::{ json, Value as JsonValue };

pub async fn mcp_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let payload = match parse_body(&body) {
        Ok(payload) => payload,
        Err(_) => {
            let resp = JsonRpcResponse::failure(JsonValue::Null, PARSE_ERROR, "Parse error");
            return Json(resp).into_response();
        }
    };

    match payload {
        JsonValue::Array(batch) => {
            if batch.is_empty() {
                let resp = JsonRpcResponse::failure(JsonValue::Null, INVALID_REQUEST, "Empty batch");
                return Json(resp).into_response();
            }
            let mut responses = Vec::with_capacity(batch.len());
            for item in batch {
                if let Some(resp) = dispatch(&state.registry, item).await {
                    responses.push(resp);
                }
            }
            if responses.is_empty() {
                StatusCode::ACCEPTED.into_response()
            } else {
                Json(responses).into_response()
            }
        }
        single =>
            match dispatch(&state.registry, single).await {
                Some(resp) => Json(resp).into_response(),
                None => StatusCode::ACCEPTED.into_response(),
            }
    }
}

/// Handles one JSON-RPC message. Notifications yield `None`.
async fn dispatch(registry: &ToolRegistry, message: JsonValue) -> Option<JsonRpcResponse> {
    let request: JsonRpcRequest = match serde_json::from_value(message) {
        Ok(request) => request,
        Err(e) => {
            return Some(JsonRpcResponse::failure(JsonValue::Null, INVALID_REQUEST, e.to_string()));
        }
    };
    let id = match request.id {
        Some(id) => id,
        None => {
            debug!("MCP notification: {}", request.method);
            return None;
        }
    };
    if request.jsonrpc.as_deref().map_or(false, |v| v != "2.0") {
        return Some(JsonRpcResponse::failure(id, INVALID_REQUEST, "Unsupported jsonrpc version"));
    }

    let response = match request.method.as_str() {
        "initialize" => {
            info!("MCP client initialized");
            JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                })
            )
        }
        "ping" => JsonRpcResponse::success(id, json!({})),
        "tools/list" => JsonRpcResponse::success(id, json!({ "tools": tools::descriptors() })),
        "tools/call" => {
            let params: ToolCallParams = match
                request.params.map(serde_json::from_value).transpose()
            {
                Ok(Some(params)) => params,
                Ok(None) => {
                    return Some(JsonRpcResponse::failure(id, INVALID_PARAMS, "Missing params"));
                }
                Err(e) => {
                    return Some(JsonRpcResponse::failure(id, INVALID_PARAMS, e.to_string()));
                }
            };
            let arguments = params.arguments.unwrap_or(JsonValue::Null);
            match registry.call(&params.name, arguments).await {
                Some(output) => {
                    debug!("MCP {} -> {}", params.name, output.summary);
                    match serde_json::to_value(output.into_tool_result()) {
                        Ok(result) => JsonRpcResponse::success(id, result),
                        Err(e) => JsonRpcResponse::failure(id, INTERNAL_ERROR, e.to_string()),
                    }
                }
                None =>
                    JsonRpcResponse::failure(id, INVALID_PARAMS, format!("Unknown tool: {}", params.name)),
            }
        }
        other => JsonRpcResponse::failure(id, METHOD_NOT_FOUND, format!("Method not found: {}", other)),
    };
    Some(response)
}

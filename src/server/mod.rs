pub mod api;
pub mod mcp;

use crate::cli::Args;
use crate::tools::ToolRegistry;
use axum::{
    extract::{ Request, State },
    http::StatusCode,
    middleware::{ self, Next },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use governor::{ clock::DefaultClock, state::{ InMemoryState, NotKeyed }, Quota, RateLimiter };
use log::{ error, info, warn };
use serde_json::json;
use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use tower_http::cors::{ Any, CorsLayer };

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Clone)]
pub struct AppState {
    pub registry: ToolRegistry,
    limiter: Option<Arc<Limiter>>,
}

impl AppState {
    pub fn new(registry: ToolRegistry, requests_per_second: u32) -> Self {
        let limiter = NonZeroU32::new(requests_per_second).map(|rps|
            Arc::new(RateLimiter::direct(Quota::per_second(rps)))
        );
        Self { registry, limiter }
    }
}

async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            warn!("Global request rate limit exceeded for {}", req.uri().path());
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "ok": false, "error": "Too many requests" })),
            ).into_response();
        }
    }
    next.run(req).await
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/", get(api::root_handler))
        .route("/health", get(api::health_handler))
        .route("/mcp", post(mcp::mcp_handler))
        .route("/log-message", api::tool_route("log_message"))
        .route("/get-turns", api::tool_route("get_turns"))
        .route("/clear-cache", api::tool_route("clear_cache"))
        .route("/get-curriculum", api::tool_route("get_curriculum"))
        .route("/generate-schedule", api::tool_route("generate_schedule_from_curriculum"))
        .route("/get-student", api::tool_route("get_student"))
        .route("/upsert-student", api::tool_route("upsert_student"))
        .route("/ask-edu-agent", api::tool_route("ask_edu_agent"))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(cors)
        .with_state(state)
}

pub struct Server {
    addr: String,
    registry: ToolRegistry,
    args: Args,
}

impl Server {
    pub fn new(addr: String, registry: ToolRegistry, args: Args) -> Self {
        Self { addr, registry, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let state = AppState::new(self.registry.clone(), self.args.requests_per_second);
        let app = router(state);

        if self.args.enable_tls {
            match (&self.args.tls_cert_path, &self.args.tls_key_path) {
                (Some(cert_path), Some(key_path)) => {
                    info!(
                        "TLS enabled. Loading certificate from '{}' and key from '{}'",
                        cert_path,
                        key_path
                    );
                    let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                        cert_path,
                        key_path
                    ).await?;
                    info!("HTTPS server listening on: https://{}", addr);
                    axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
                }
                _ => {
                    error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                    return Err("TLS enabled without cert/key".into());
                }
            }
        } else {
            let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
                e
            })?;
            info!("HTTP server listening on: http://{}", addr);
            axum::serve(listener, app.into_make_service()).await?;
        }

        Ok(())
    }
}

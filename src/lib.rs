pub mod cache;
pub mod cli;
pub mod dedupe;
pub mod error;
pub mod history;
pub mod models;
pub mod server;
pub mod service;
pub mod tools;

use cli::Args;
use dedupe::DedupeGuard;
use history::initialize_history_store;
use log::info;
use server::Server;
use service::TurnService;
use std::error::Error;
use std::sync::Arc;
use tools::ToolRegistry;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("History Store Type: {}", args.history_type);
    info!("Functions Base URL: {}", args.functions_url().unwrap_or("(not set)"));
    info!("Cache Enabled: {}", args.cache_url().is_some());
    info!("Window Size: {}", args.window_size);
    info!("Session TTL (s): {}", args.session_ttl_seconds);
    info!("Dedupe Window (ms): {}", args.dedupe_window_ms);
    info!("Curriculum Source: {}", args.curriculum_api_url.as_deref().unwrap_or(&args.curriculum_dir));
    info!("EduAgent Configured: {}", args.edu_agent_url.is_some());
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let cache = cache::init(&args).await;
    let dedupe = Arc::new(DedupeGuard::from_millis(args.dedupe_window_ms, args.dedupe_capacity));
    let store = initialize_history_store(&args)?;
    let turns = TurnService::new(cache, dedupe, store);
    let registry = ToolRegistry::from_args(&args, turns)?;

    let server = Server::new(args.server_addr.clone(), registry, args.clone());
    server.run().await?;

    Ok(())
}

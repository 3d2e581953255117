use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the HTTP server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:8080")]
    pub server_addr: String,

    /// Global request rate limit per second. 0 disables the limiter.
    #[arg(long, env = "REQUESTS_PER_SECOND", default_value = "50")]
    pub requests_per_second: u32,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    // --- History Store Args ---
    /// Authoritative turn store type (functions, memory)
    #[arg(long, env = "HISTORY_TYPE", default_value = "functions")]
    pub history_type: String,

    /// Base URL of the Cloud Functions backing turns and students
    /// (e.g., https://europe-west1-my-project.cloudfunctions.net)
    #[arg(long, env = "FUNCTIONS_BASE_URL")]
    pub functions_base_url: Option<String>,

    /// Timeout in seconds for every outbound HTTP call.
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value = "30")]
    pub http_timeout_secs: u64,

    // --- Turn Cache Args ---
    /// Redis URL for the turn cache (redis:// or rediss://). Caching is disabled when unset.
    #[arg(long, env = "CACHE_REDIS_URL")]
    pub cache_redis_url: Option<String>,

    /// Prefix for cached conversation window keys.
    #[arg(long, env = "CACHE_KEY_PREFIX", default_value = "turns:")]
    pub cache_key_prefix: String,

    /// Maximum number of turns kept per cached conversation.
    #[arg(long, env = "WINDOW_SIZE", default_value = "20")]
    pub window_size: usize,

    /// Time-to-live in seconds for a cached conversation window, refreshed on every write.
    #[arg(
        long,
        env = "SESSION_TTL_SECONDS",
        default_value = "86400", // 24 hours
        value_parser = clap::value_parser!(u64).range(1..=(i64::MAX as u64))
    )]
    pub session_ttl_seconds: u64,

    /// Window in milliseconds during which identical get_turns calls are served from cache. 0 disables.
    #[arg(long, env = "DEDUPE_WINDOW_MS", default_value = "5000")]
    pub dedupe_window_ms: u64,

    /// Maximum number of request fingerprints remembered by the dedupe guard.
    #[arg(long, env = "DEDUPE_CAPACITY", default_value = "10000")]
    pub dedupe_capacity: usize,

    /// Default number of turns returned by get_turns when maxTurns is omitted.
    #[arg(long, env = "DEFAULT_MAX_TURNS", default_value = "10")]
    pub default_max_turns: usize,

    /// Default lookback in minutes for get_turns when lookbackMinutes is omitted.
    #[arg(long, env = "DEFAULT_LOOKBACK_MINUTES", default_value = "120")]
    pub default_lookback_minutes: u64,

    // --- Education Backend Args ---
    /// Directory containing curriculum_<yearId>.json files.
    #[arg(long, env = "CURRICULUM_DIR", default_value = "curriculum")]
    pub curriculum_dir: String,

    /// Remote curriculum endpoint. When set, it takes precedence over CURRICULUM_DIR.
    #[arg(long, env = "CURRICULUM_API_URL")]
    pub curriculum_api_url: Option<String>,

    /// Endpoint of the LLM-backed EduAgent.
    #[arg(long, env = "EDU_AGENT_URL")]
    pub edu_agent_url: Option<String>,

    /// Default number of lessons per day when generating a schedule.
    #[arg(long, env = "LESSONS_PER_DAY", default_value = "3")]
    pub lessons_per_day: usize,
}

impl Args {
    /// Cache credentials, ignoring blank values.
    pub fn cache_url(&self) -> Option<&str> {
        self.cache_redis_url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    pub fn functions_url(&self) -> Option<&str> {
        self.functions_base_url
            .as_deref()
            .map(|u| u.trim().trim_end_matches('/'))
            .filter(|u| !u.is_empty())
    }
}

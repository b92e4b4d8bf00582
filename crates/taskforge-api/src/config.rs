// Server configuration loaded from environment variables.
// Decision: Engine settings live in taskforge-core's EngineConfig; this covers only the HTTP surface

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// HTTP surface configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub bind_addr: String,
    /// Optional prefix for every route, e.g. `/api`
    pub api_prefix: String,
    /// Capacity of each request's printer channel
    pub channel_capacity: usize,
    /// How many finished requests keep their replay buffer
    pub replay_capacity: usize,
    /// Allowed CORS origins; empty means same-origin only
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            api_prefix: String::new(),
            channel_capacity: 256,
            replay_capacity: 1000,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// - `BIND_ADDR` (default `0.0.0.0:8080`)
    /// - `API_PREFIX` (default empty)
    /// - `STREAM_CHANNEL_CAPACITY` (default 256)
    /// - `REPLAY_CAPACITY` (default 1000)
    /// - `CORS_ALLOWED_ORIGINS` (comma separated, default empty)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            api_prefix: std::env::var("API_PREFIX").unwrap_or_default(),
            channel_capacity: env_usize("STREAM_CHANNEL_CAPACITY").unwrap_or(defaults.channel_capacity),
            replay_capacity: env_usize("REPLAY_CAPACITY").unwrap_or(defaults.replay_capacity),
            cors_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                .map(|s| parse_origins(&s))
                .unwrap_or_default(),
        }
    }
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

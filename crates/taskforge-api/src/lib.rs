// Taskforge API
//
// HTTP surface over taskforge-core: requests are validated here, handed to
// the handler registry on a spawned task, and their events are streamed
// back to the caller as SSE packets. Replay buffers stay in memory so a
// reconnecting client can catch up.

pub mod agents;
pub mod config;
pub mod dto;
pub mod replay;
pub mod services;

use axum::http::{header, HeaderValue, Method};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use taskforge_core::{AgentModels, EngineConfig, HandlerRegistry, McpClient, Tool};

pub use config::ServerConfig;
use services::RequestRegistry;

/// State shared by every route
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<EngineConfig>,
    pub server: Arc<ServerConfig>,
    pub handlers: Arc<HandlerRegistry>,
    pub requests: Arc<RequestRegistry>,
    /// Tools registered into every request's collection
    pub local_tools: Arc<Vec<Arc<dyn Tool>>>,
    pub mcp_client: Option<Arc<McpClient>>,
}

impl AppState {
    /// State with the default handlers and no tools
    pub fn new(config: EngineConfig, server: ServerConfig, models: AgentModels) -> Self {
        let config = Arc::new(config);
        let handlers = HandlerRegistry::with_defaults(config.clone(), models);
        let requests = RequestRegistry::new(server.replay_capacity);
        Self {
            config,
            server: Arc::new(server),
            handlers: Arc::new(handlers),
            requests: Arc::new(requests),
            local_tools: Arc::new(Vec::new()),
            mcp_client: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.local_tools = Arc::new(tools);
        self
    }

    pub fn with_mcp_client(mut self, client: Arc<McpClient>) -> Self {
        self.mcp_client = Some(client);
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("server", &self.server)
            .field("handlers", &self.handlers)
            .field("requests", &self.requests)
            .field("local_tools", &self.local_tools.len())
            .field("mcp_client", &self.mcp_client)
            .finish()
    }
}

async fn health() -> &'static str {
    "ok"
}

/// Full application router: health check, prefixed API routes, CORS and tracing
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(agents::routes(state.clone()))
        .merge(replay::routes(state.clone()));

    let app = Router::new()
        .route("/web/health", get(health))
        .merge(build_router_with_prefix(api_routes, &state.server.api_prefix));

    let app = match cors_layer(&state.server.cors_origins) {
        Some(cors) => app.layer(cors),
        None => app,
    };
    app.layer(TraceLayer::new_for_http())
}

/// Nest `api_routes` under `api_prefix` when one is configured
pub fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    if origins.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::ACCEPT,
                header::ORIGIN,
                header::CACHE_CONTROL,
            ]),
    )
}

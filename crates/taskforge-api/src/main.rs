// Taskforge API server
// Decision: Configuration comes from the environment (.env supported via dotenvy)
// Decision: One OpenAI-compatible client per agent role; the summary reuses the react model

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskforge_api::{build_router, AppState, ServerConfig};
use taskforge_core::{AgentModels, EngineConfig, LlmClient, McpClient};
use taskforge_openai::OpenAiClient;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskforge_api=debug,taskforge_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("taskforge-api starting...");

    let config = EngineConfig::from_env().context("Failed to load engine configuration")?;
    let server = ServerConfig::from_env();

    let planner: Arc<dyn LlmClient> = Arc::new(
        OpenAiClient::new(config.planner_llm.clone()).context("Failed to create planner client")?,
    );
    let executor: Arc<dyn LlmClient> = Arc::new(
        OpenAiClient::new(config.executor_llm.clone()).context("Failed to create executor client")?,
    );
    let react: Arc<dyn LlmClient> = Arc::new(
        OpenAiClient::new(config.react_llm.clone()).context("Failed to create react client")?,
    );
    tracing::info!(
        planner = %config.planner_llm.model,
        executor = %config.executor_llm.model,
        react = %config.react_llm.model,
        "LLM clients configured"
    );
    let models = AgentModels {
        planner,
        executor,
        summary: react.clone(),
        react,
    };

    let mcp_client = config.mcp_client_url.clone().map(|url| {
        tracing::info!(client_url = %url, servers = config.mcp_server_urls.len(), "MCP bridge configured");
        Arc::new(McpClient::new(url))
    });

    if !server.api_prefix.is_empty() {
        tracing::info!(prefix = %server.api_prefix, "API prefix configured");
    }
    if server.cors_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
    } else {
        tracing::info!(origins = ?server.cors_origins, "CORS origins configured");
    }

    let bind_addr = server.bind_addr.clone();
    let mut state = AppState::new(config, server, models);
    if let Some(client) = mcp_client {
        state = state.with_mcp_client(client);
    }
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!(addr = %bind_addr, "taskforge-api listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

// Tool Abstraction and Tool Registry
//
// Tools are defined using the `Tool` trait and registered with a
// `ToolCollection`, the single dispatch point agents execute through.
// Names that are not local fall through to the remote (MCP) descriptors.
//
// Design decisions:
// - Tools receive the shared AgentContext at execution time instead of
//   holding a reference to it, so the context can own the collection
// - Error handling distinguishes between user-visible and internal errors
// - Internal errors are logged but never shown to the LLM; the call
//   observes the marker string `Tool <name> Error.` instead
// - Unknown tool names never raise past this layer

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::context::AgentContext;
use crate::mcp::{McpClient, McpToolInfo};

// ============================================================================
// Tool Definition
// ============================================================================

/// Function definition handed to the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
}

// ============================================================================
// Tool Execution Result - Error Handling Contract
// ============================================================================

/// Result of a tool execution.
///
/// - `Success`: the value is returned to the LLM as the observation
/// - `ToolError`: expected failure the LLM should see (e.g. "No plan exists")
/// - `InternalError`: system failure hidden from the LLM
#[derive(Debug)]
pub enum ToolExecutionResult {
    Success(Value),
    ToolError(String),
    InternalError(ToolInternalError),
}

impl ToolExecutionResult {
    pub fn success(value: impl Into<Value>) -> Self {
        ToolExecutionResult::Success(value.into())
    }

    pub fn tool_error(message: impl Into<String>) -> Self {
        ToolExecutionResult::ToolError(message.into())
    }

    pub fn internal_error(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        ToolExecutionResult::InternalError(ToolInternalError::new(error))
    }

    pub fn internal_error_msg(message: impl Into<String>) -> Self {
        ToolExecutionResult::InternalError(ToolInternalError::from_message(message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolExecutionResult::Success(_))
    }

    pub fn is_error(&self) -> bool {
        !self.is_success()
    }

    /// Convert into the observation text appended to memory.
    ///
    /// String values are returned verbatim, other JSON values serialized.
    /// Internal errors are logged and replaced with `Tool <name> Error.`.
    pub fn into_observation(self, tool_name: &str, tool_call_id: &str) -> String {
        match self {
            ToolExecutionResult::Success(Value::String(text)) => text,
            ToolExecutionResult::Success(value) => value.to_string(),
            ToolExecutionResult::ToolError(message) => message,
            ToolExecutionResult::InternalError(err) => {
                error!(
                    tool_name = %tool_name,
                    tool_call_id = %tool_call_id,
                    error = %err.message,
                    "Tool internal error (details hidden from LLM)"
                );
                tool_error_marker(tool_name)
            }
        }
    }
}

/// Observation text for a failed tool call
pub fn tool_error_marker(tool_name: &str) -> String {
    format!("Tool {} Error.", tool_name)
}

/// Internal error details (logged but not exposed to LLM)
#[derive(Debug)]
pub struct ToolInternalError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ToolInternalError {
    pub fn new(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

impl std::fmt::Display for ToolInternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

// ============================================================================
// Tool Trait
// ============================================================================

/// A tool that can be executed by an agent
///
/// # Example
///
/// ```ignore
/// struct WordCount;
///
/// #[async_trait]
/// impl Tool for WordCount {
///     fn name(&self) -> &str { "word_count" }
///     fn description(&self) -> &str { "Count words in a text" }
///     fn parameters_schema(&self) -> Value {
///         json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]})
///     }
///     async fn execute(&self, _ctx: &AgentContext, args: Value) -> ToolExecutionResult {
///         match args.get("text").and_then(|v| v.as_str()) {
///             Some(text) => ToolExecutionResult::success(text.split_whitespace().count()),
///             None => ToolExecutionResult::tool_error("text is required"),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object
    fn parameters_schema(&self) -> Value;

    /// Execute with parsed arguments. Side effects such as produced files
    /// are recorded on the context.
    async fn execute(&self, ctx: &AgentContext, arguments: Value) -> ToolExecutionResult;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

// ============================================================================
// ToolCollection - Registry of local and remote tools
// ============================================================================

/// Name-keyed registry of local tools plus remote tool descriptors.
///
/// Also carries the per-tool "digital employee" persona labels used to
/// annotate events. Personas are refreshed once per sub-task and never
/// influence dispatch.
pub struct ToolCollection {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    mcp_tools: BTreeMap<String, McpToolInfo>,
    mcp_client: Option<Arc<McpClient>>,
    digital_employees: RwLock<HashMap<String, String>>,
    current_task: RwLock<String>,
}

impl Default for ToolCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolCollection {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            mcp_tools: BTreeMap::new(),
            mcp_client: None,
            digital_employees: RwLock::new(HashMap::new()),
            current_task: RwLock::new(String::new()),
        }
    }

    pub fn builder() -> ToolCollectionBuilder {
        ToolCollectionBuilder::new()
    }

    /// Register a local tool (replaces one with the same name)
    pub fn add_tool(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn add_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Register a remote tool descriptor
    pub fn add_mcp_tool(&mut self, info: McpToolInfo) {
        self.mcp_tools.insert(info.name.clone(), info);
    }

    pub fn set_mcp_client(&mut self, client: Arc<McpClient>) {
        self.mcp_client = Some(client);
    }

    /// List a remote server through the bridge and register every tool it
    /// exposes. Returns how many tools were added. Failures are logged and
    /// skipped so one bad server never fails the request.
    pub async fn register_mcp_server(&mut self, server_url: &str) -> usize {
        let Some(client) = self.mcp_client.clone() else {
            warn!(server_url = %server_url, "ToolCollection: no MCP client configured, skipping server");
            return 0;
        };

        match client.list_tools(server_url).await {
            Ok(tools) => {
                let count = tools.len();
                for info in tools {
                    self.add_mcp_tool(info);
                }
                info!(server_url = %server_url, count, "ToolCollection: registered MCP tools");
                count
            }
            Err(e) => {
                error!(server_url = %server_url, error = %e, "ToolCollection: MCP server invalid");
                0
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn get_mcp(&self, name: &str) -> Option<&McpToolInfo> {
        self.mcp_tools.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name) || self.mcp_tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools
            .keys()
            .chain(self.mcp_tools.keys())
            .map(|s| s.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len() + self.mcp_tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Function definitions for every local and remote tool
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| t.to_definition())
            .chain(self.mcp_tools.values().map(|info| info.to_definition()))
            .collect()
    }

    /// Catalogue text substituted into prompts as `{{tools}}`
    pub fn catalogue(&self) -> String {
        let mut out = String::new();
        for tool in self.tools.values() {
            out.push_str(&format!("- {}: {}\n", tool.name(), tool.description()));
        }
        for info in self.mcp_tools.values() {
            out.push_str(&format!("- {}: {}\n", info.name, info.description));
        }
        out
    }

    /// Dispatch one call by name.
    pub async fn execute(
        &self,
        ctx: &AgentContext,
        name: &str,
        arguments: Value,
    ) -> ToolExecutionResult {
        if let Some(tool) = self.tools.get(name) {
            return tool.execute(ctx, arguments).await;
        }

        if let Some(info) = self.mcp_tools.get(name) {
            let Some(client) = &self.mcp_client else {
                return ToolExecutionResult::internal_error_msg(format!(
                    "MCP tool {} registered without a client",
                    name
                ));
            };
            return match client.call_tool(&info.server_url, name, arguments).await {
                Ok(text) => ToolExecutionResult::success(text),
                Err(e) => ToolExecutionResult::internal_error(e),
            };
        }

        ToolExecutionResult::internal_error_msg(format!("Unknown tool: {}", name))
    }

    // ------------------------------------------------------------------
    // Digital employees
    // ------------------------------------------------------------------

    /// Replace persona assignments for the current sub-task
    pub async fn update_digital_employees(&self, personas: HashMap<String, String>) {
        *self.digital_employees.write().await = personas;
    }

    pub async fn digital_employee(&self, tool_name: &str) -> Option<String> {
        self.digital_employees.read().await.get(tool_name).cloned()
    }

    pub async fn set_current_task(&self, task: impl Into<String>) {
        *self.current_task.write().await = task.into();
    }

    pub async fn current_task(&self) -> String {
        self.current_task.read().await.clone()
    }
}

impl std::fmt::Debug for ToolCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCollection")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("mcp_tools", &self.mcp_tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for ToolCollection with fluent API
pub struct ToolCollectionBuilder {
    collection: ToolCollection,
    mcp_servers: Vec<String>,
}

impl ToolCollectionBuilder {
    pub fn new() -> Self {
        Self {
            collection: ToolCollection::new(),
            mcp_servers: Vec::new(),
        }
    }

    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        self.collection.add_tool(tool);
        self
    }

    pub fn arc(mut self, tool: Arc<dyn Tool>) -> Self {
        self.collection.add_arc(tool);
        self
    }

    pub fn mcp_client(mut self, client: Arc<McpClient>) -> Self {
        self.collection.set_mcp_client(client);
        self
    }

    pub fn mcp_server(mut self, server_url: impl Into<String>) -> Self {
        self.mcp_servers.push(server_url.into());
        self
    }

    /// Build without contacting remote servers
    pub fn build(self) -> ToolCollection {
        self.collection
    }

    /// Build and register every configured MCP server
    pub async fn connect(self) -> ToolCollection {
        let mut collection = self.collection;
        for server in &self.mcp_servers {
            collection.register_mcp_server(server).await;
        }
        collection
    }
}

impl Default for ToolCollectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_context, EchoTool, FailingTool};
    use serde_json::json;

    #[tokio::test]
    async fn test_execute_local_tool() {
        let tools = ToolCollection::builder().tool(EchoTool).build();
        let ctx = test_context();

        let result = tools
            .execute(&ctx, "echo", json!({"text": "hello"}))
            .await
            .into_observation("echo", "c1");
        assert_eq!(result, "hello");
    }

    #[tokio::test]
    async fn test_internal_error_becomes_marker() {
        let tools = ToolCollection::builder().tool(FailingTool).build();
        let ctx = test_context();

        let result = tools
            .execute(&ctx, "failing_tool", json!({}))
            .await
            .into_observation("failing_tool", "c1");
        assert_eq!(result, "Tool failing_tool Error.");
    }

    #[tokio::test]
    async fn test_unknown_tool_returns_marker() {
        let tools = ToolCollection::new();
        let ctx = test_context();

        let result = tools.execute(&ctx, "nope", json!({})).await;
        assert!(result.is_error());
        assert_eq!(result.into_observation("nope", "c1"), "Tool nope Error.");
    }

    #[tokio::test]
    async fn test_tool_error_is_visible() {
        let result = ToolExecutionResult::tool_error("City not found");
        assert_eq!(result.into_observation("weather", "c1"), "City not found");
    }

    #[test]
    fn test_definitions_include_remote_tools() {
        let mut tools = ToolCollection::builder().tool(EchoTool).build();
        tools.add_mcp_tool(McpToolInfo {
            name: "weather".into(),
            description: "Get weather".into(),
            parameters: json!({"type": "object"}),
            server_url: "http://mcp.local/sse".into(),
        });

        let names: Vec<_> = tools.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["echo", "weather"]);
        assert!(tools.has("weather"));
        assert!(tools.catalogue().contains("- weather: Get weather"));
    }

    #[tokio::test]
    async fn test_digital_employees() {
        let tools = ToolCollection::new();
        tools
            .update_digital_employees(HashMap::from([(
                "search".to_string(),
                "Market analyst".to_string(),
            )]))
            .await;
        assert_eq!(
            tools.digital_employee("search").await.as_deref(),
            Some("Market analyst")
        );
        assert!(tools.digital_employee("other").await.is_none());
    }

    // ------------------------------------------------------------------
    // Remote dispatch through the MCP bridge
    // ------------------------------------------------------------------

    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_list(server: &MockServer, server_url: &str, body: Value) {
        Mock::given(method("POST"))
            .and(path("/v1/tool/list"))
            .and(body_partial_json(json!({ "server_url": server_url })))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_connect_skips_failing_server() {
        let bridge = MockServer::start().await;
        mount_list(
            &bridge,
            "http://weather/sse",
            json!({"code": 200, "data": [{"name": "get_weather", "description": "Weather by city"}]}),
        )
        .await;
        mount_list(
            &bridge,
            "http://broken/sse",
            json!({"code": 500, "message": "unavailable", "data": []}),
        )
        .await;

        let tools = ToolCollection::builder()
            .tool(EchoTool)
            .mcp_client(Arc::new(McpClient::new(bridge.uri())))
            .mcp_server("http://broken/sse")
            .mcp_server("http://weather/sse")
            .connect()
            .await;

        assert_eq!(tools.len(), 2);
        assert_eq!(
            tools.get_mcp("get_weather").map(|t| t.server_url.as_str()),
            Some("http://weather/sse")
        );
    }

    #[tokio::test]
    async fn test_execute_dispatches_remote_tool() {
        let bridge = MockServer::start().await;
        mount_list(
            &bridge,
            "http://weather/sse",
            json!({"code": 200, "data": [{"name": "get_weather", "description": "Weather by city"}]}),
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/v1/tool/call"))
            .and(body_partial_json(json!({
                "name": "get_weather",
                "server_url": "http://weather/sse",
                "arguments": {"city": "Paris"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("sunny"))
            .expect(1)
            .mount(&bridge)
            .await;

        let tools = ToolCollection::builder()
            .mcp_client(Arc::new(McpClient::new(bridge.uri())))
            .mcp_server("http://weather/sse")
            .connect()
            .await;
        let ctx = test_context();

        let result = tools
            .execute(&ctx, "get_weather", json!({"city": "Paris"}))
            .await
            .into_observation("get_weather", "c1");
        assert_eq!(result, "sunny");
    }

    #[tokio::test]
    async fn test_remote_bridge_error_becomes_marker() {
        let bridge = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/tool/call"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&bridge)
            .await;

        let mut tools = ToolCollection::new();
        tools.set_mcp_client(Arc::new(McpClient::new(bridge.uri())));
        tools.add_mcp_tool(McpToolInfo {
            name: "get_weather".into(),
            description: "Weather by city".into(),
            parameters: json!({"type": "object"}),
            server_url: "http://weather/sse".into(),
        });
        let ctx = test_context();

        let result = tools.execute(&ctx, "get_weather", json!({})).await;
        assert!(result.is_error());
        assert_eq!(
            result.into_observation("get_weather", "c1"),
            "Tool get_weather Error."
        );
    }
}

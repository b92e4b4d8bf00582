// Remote tool bridge (MCP)
//
// Remote tools live behind an HTTP bridge that speaks a minimal list/call
// protocol on behalf of MCP servers:
//
//   POST {client_url}/v1/tool/list  {"server_url": ..}
//        -> {"code": 200, "message": .., "data": [{"name", "description", "inputSchema"}]}
//   POST {client_url}/v1/tool/call  {"name", "server_url", "arguments"}
//        -> tool output (returned verbatim as the observation)

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::tools::ToolDefinition;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Descriptor of a tool served by a remote MCP server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub server_url: String,
}

impl McpToolInfo {
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Vec<RemoteTool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteTool {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    input_schema: Value,
}

/// HTTP client for the MCP bridge
#[derive(Debug, Clone)]
pub struct McpClient {
    http: Client,
    client_url: String,
    timeout: Duration,
}

impl McpClient {
    pub fn new(client_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            client_url: client_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn client_url(&self) -> &str {
        &self.client_url
    }

    /// List tools exposed by `server_url`
    pub async fn list_tools(&self, server_url: &str) -> Result<Vec<McpToolInfo>> {
        let url = format!("{}/v1/tool/list", self.client_url);
        let body = self
            .post(&url, &json!({ "server_url": server_url }))
            .await?;

        let parsed: ListResponse = serde_json::from_str(&body)
            .map_err(|e| AgentError::remote(format!("invalid list response: {}", e)))?;

        if parsed.code != 200 {
            return Err(AgentError::remote(format!(
                "list failed with code {}: {}",
                parsed.code,
                parsed.message.unwrap_or_default()
            )));
        }
        if parsed.data.is_empty() {
            return Err(AgentError::remote(format!(
                "server {} exposes no tools",
                server_url
            )));
        }

        Ok(parsed
            .data
            .into_iter()
            .map(|tool| McpToolInfo {
                parameters: normalize_schema(tool.input_schema),
                name: tool.name,
                description: tool.description,
                server_url: server_url.to_string(),
            })
            .collect())
    }

    /// Invoke `name` on `server_url`; the bridge's response body is the observation
    pub async fn call_tool(&self, server_url: &str, name: &str, arguments: Value) -> Result<String> {
        let url = format!("{}/v1/tool/call", self.client_url);
        debug!(server_url = %server_url, tool = %name, "McpClient: calling remote tool");
        self.post(
            &url,
            &json!({
                "name": name,
                "server_url": server_url,
                "arguments": arguments,
            }),
        )
        .await
    }

    async fn post(&self, url: &str, body: &Value) -> Result<String> {
        let response = self
            .http
            .post(url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentError::remote(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AgentError::remote(format!("reading {} failed: {}", url, e)))?;

        if !status.is_success() {
            warn!(url = %url, status = %status, "McpClient: bridge returned error status");
            return Err(AgentError::remote(format!(
                "{} returned status {}: {}",
                url, status, text
            )));
        }
        Ok(text)
    }
}

/// Some servers ship the schema as a JSON string
fn normalize_schema(schema: Value) -> Value {
    match schema {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::Object(Default::default())),
        Value::Null => json!({"type": "object", "properties": {}}),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_list_tools() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/tool/list"))
            .and(body_partial_json(json!({"server_url": "http://weather/sse"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "data": [
                    {"name": "get_weather", "description": "Weather by city",
                     "inputSchema": "{\"type\":\"object\",\"properties\":{\"city\":{\"type\":\"string\"}}}"}
                ]
            })))
            .mount(&server)
            .await;

        let client = McpClient::new(server.uri());
        let tools = client.list_tools("http://weather/sse").await.unwrap();

        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "get_weather");
        assert_eq!(tools[0].server_url, "http://weather/sse");
        assert_eq!(tools[0].parameters["properties"]["city"]["type"], "string");
    }

    #[tokio::test]
    async fn test_list_tools_rejects_bad_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/tool/list"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"code": 500, "message": "boom", "data": []})),
            )
            .mount(&server)
            .await;

        let client = McpClient::new(server.uri());
        let err = client.list_tools("http://x").await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_call_tool() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/tool/call"))
            .and(body_partial_json(json!({
                "name": "get_weather",
                "arguments": {"city": "Paris"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("sunny"))
            .mount(&server)
            .await;

        let client = McpClient::new(format!("{}/", server.uri()));
        let text = client
            .call_tool("http://weather/sse", "get_weather", json!({"city": "Paris"}))
            .await
            .unwrap();
        assert_eq!(text, "sunny");
    }

    #[tokio::test]
    async fn test_call_tool_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/tool/call"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = McpClient::new(server.uri());
        assert!(client
            .call_tool("http://x", "t", json!({}))
            .await
            .is_err());
    }
}

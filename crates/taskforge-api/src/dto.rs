// Request and response bodies of the public API
//
// Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use taskforge_core::{AgentType, EngineConfig, ReplayEntry};

/// Full agent request accepted by `POST /AutoAgent`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    /// Generated when absent
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub query: String,
    /// Agent type code, see `AgentType`
    pub agent_type: i32,
    #[serde(default)]
    pub base_prompt: String,
    #[serde(default)]
    pub sop_prompt: String,
    /// Stream model output token by token
    #[serde(default)]
    pub is_stream: bool,
    /// Deliverable style key, e.g. `html`, `docs`, `table`
    #[serde(default)]
    pub output_style: Option<String>,
}

/// Simplified query accepted by `POST /web/api/v1/gpt/queryAgentStreamIncr`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GptQueryReq {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    /// 0 selects the react agent, anything else plan-solve
    #[serde(default)]
    pub deep_think: i32,
    #[serde(default)]
    pub output_style: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
}

impl GptQueryReq {
    /// Map onto a full agent request using the configured default prompts
    pub fn into_agent_request(self, config: &EngineConfig) -> AgentRequest {
        let react = self.deep_think == 0;
        let (agent_type, base_prompt, sop_prompt) = if react {
            (AgentType::React, config.default_base_prompt.clone(), String::new())
        } else {
            (AgentType::PlanSolve, String::new(), config.default_sop_prompt.clone())
        };

        AgentRequest {
            request_id: self.trace_id.or(self.request_id),
            query: self.query,
            agent_type: agent_type.code(),
            base_prompt,
            sop_prompt,
            is_stream: true,
            output_style: self.output_style,
        }
    }
}

/// Query string of the replay endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayQuery {
    /// Only messages with a sequence number above this are returned
    pub from_order: Option<u64>,
}

/// Replay buffer of one request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResponse {
    pub request_id: String,
    /// Number of messages built so far
    pub message_count: u64,
    /// Cached plan-level values plus `tasks`
    pub result_map: Map<String, Value>,
    pub messages: Vec<ReplayEntry>,
}

// Engine configuration
//
// EngineConfig is a plain serde struct passed into handlers and agents at
// construction time. It can be:
// - Created with defaults for tests and embedding
// - Loaded from `TASKFORGE_*` environment variables via `from_env`

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AgentError, Result};
use crate::prompt;

/// Key of the prompt profile used when no other profile is selected
pub const DEFAULT_PROFILE: &str = "default";

// ============================================================================
// LLM settings
// ============================================================================

/// How tool calls are exchanged with the model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionCallType {
    /// Native `tools` / `tool_calls` fields
    #[default]
    FunctionCall,
    /// Tool calls written by the model as ```json blocks in its text
    StructParse,
}

impl FromStr for FunctionCallType {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "function_call" => Ok(FunctionCallType::FunctionCall),
            "struct_parse" => Ok(FunctionCallType::StructParse),
            other => Err(AgentError::config(format!(
                "unknown function_call_type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_interface_url")]
    pub interface_url: String,

    #[serde(default)]
    pub function_call_type: FunctionCallType,

    /// Prompt budget; older turns are dropped to fit
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-0806".to_string()
}

fn default_max_tokens() -> u32 {
    16384
}

fn default_interface_url() -> String {
    "/v1/chat/completions".to_string()
}

fn default_max_input_tokens() -> usize {
    100_000
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl LlmSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_function_call_type(mut self, function_call_type: FunctionCallType) -> Self {
        self.function_call_type = function_call_type;
        self
    }

    pub fn with_max_input_tokens(mut self, max_input_tokens: usize) -> Self {
        self.max_input_tokens = max_input_tokens;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Full completion endpoint URL
    pub fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.interface_url
        )
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            base_url: "https://api.openai.com".to_string(),
            api_key: String::new(),
            interface_url: default_interface_url(),
            function_call_type: FunctionCallType::FunctionCall,
            max_input_tokens: default_max_input_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ============================================================================
// Prompt profiles
// ============================================================================

/// Prompt templates of one agent kind, each keyed by profile name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPrompts {
    #[serde(default)]
    pub system_prompt: HashMap<String, String>,
    #[serde(default)]
    pub next_step_prompt: HashMap<String, String>,
    #[serde(default)]
    pub sop_prompt: HashMap<String, String>,
}

impl AgentPrompts {
    pub fn new(system_prompt: &str, next_step_prompt: &str) -> Self {
        Self {
            system_prompt: profile(system_prompt),
            next_step_prompt: profile(next_step_prompt),
            sop_prompt: HashMap::new(),
        }
    }

    pub fn system(&self) -> &str {
        lookup(&self.system_prompt)
    }

    pub fn next_step(&self) -> &str {
        lookup(&self.next_step_prompt)
    }

    pub fn sop(&self) -> &str {
        lookup(&self.sop_prompt)
    }
}

fn profile(value: &str) -> HashMap<String, String> {
    HashMap::from([(DEFAULT_PROFILE.to_string(), value.to_string())])
}

fn lookup(map: &HashMap<String, String>) -> &str {
    map.get(DEFAULT_PROFILE).map(String::as_str).unwrap_or_default()
}

// ============================================================================
// EngineConfig
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_planner_prompts")]
    pub planner: AgentPrompts,
    #[serde(default = "default_executor_prompts")]
    pub executor: AgentPrompts,
    #[serde(default = "default_react_prompts")]
    pub react: AgentPrompts,

    #[serde(default)]
    pub planner_llm: LlmSettings,
    #[serde(default)]
    pub executor_llm: LlmSettings,
    #[serde(default)]
    pub react_llm: LlmSettings,

    #[serde(default = "default_max_steps")]
    pub planner_max_steps: usize,
    #[serde(default = "default_max_steps")]
    pub executor_max_steps: usize,
    #[serde(default = "default_max_steps")]
    pub react_max_steps: usize,

    /// Maximum characters of one tool observation kept in memory
    #[serde(default = "default_max_observe")]
    pub max_observe: usize,

    /// Maximum characters per message in the summary transcript
    #[serde(default = "default_message_size_limit")]
    pub message_size_limit: usize,

    #[serde(default = "default_plan_pre_prompt")]
    pub plan_pre_prompt: String,
    #[serde(default = "default_task_pre_prompt")]
    pub task_pre_prompt: String,
    #[serde(default = "default_task_complete_desc")]
    pub task_complete_desc: String,

    /// Drop tool turns from executor memory when a sub-task finishes
    #[serde(default = "default_true")]
    pub clear_tool_message: bool,

    /// Planner advances the plan itself instead of asking the model to re-plan
    #[serde(default = "default_true")]
    pub planning_close_update: bool,

    #[serde(default)]
    pub output_style_prompts: HashMap<String, String>,

    #[serde(default = "default_digital_employee_prompt")]
    pub digital_employee_prompt: String,
    #[serde(default = "default_summary_system_prompt")]
    pub summary_system_prompt: String,

    #[serde(default)]
    pub mcp_client_url: Option<String>,
    #[serde(default)]
    pub mcp_server_urls: Vec<String>,

    /// SOP prompt for plan-solve requests from the simplified query surface
    #[serde(default)]
    pub default_sop_prompt: String,
    /// Base prompt for react requests from the simplified query surface
    #[serde(default)]
    pub default_base_prompt: String,

    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

fn default_planner_prompts() -> AgentPrompts {
    AgentPrompts::new(prompt::PLANNER_SYSTEM_PROMPT, prompt::PLANNER_NEXT_STEP_PROMPT)
}

fn default_executor_prompts() -> AgentPrompts {
    AgentPrompts::new(prompt::EXECUTOR_SYSTEM_PROMPT, prompt::EXECUTOR_NEXT_STEP_PROMPT)
}

fn default_react_prompts() -> AgentPrompts {
    AgentPrompts::new(prompt::REACT_SYSTEM_PROMPT, prompt::REACT_NEXT_STEP_PROMPT)
}

fn default_max_steps() -> usize {
    40
}

fn default_max_observe() -> usize {
    10_000
}

fn default_message_size_limit() -> usize {
    1000
}

fn default_plan_pre_prompt() -> String {
    "分析问题并制定计划：".to_string()
}

fn default_task_pre_prompt() -> String {
    "参考对话历史回答，".to_string()
}

fn default_task_complete_desc() -> String {
    "当前task完成，请将当前task标记为 completed".to_string()
}

fn default_true() -> bool {
    true
}

fn default_digital_employee_prompt() -> String {
    prompt::DIGITAL_EMPLOYEE_PROMPT.to_string()
}

fn default_summary_system_prompt() -> String {
    prompt::SUMMARY_SYSTEM_PROMPT.to_string()
}

fn default_heartbeat_interval_secs() -> u64 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            planner: default_planner_prompts(),
            executor: default_executor_prompts(),
            react: default_react_prompts(),
            planner_llm: LlmSettings::default(),
            executor_llm: LlmSettings::default(),
            react_llm: LlmSettings::default(),
            planner_max_steps: default_max_steps(),
            executor_max_steps: default_max_steps(),
            react_max_steps: default_max_steps(),
            max_observe: default_max_observe(),
            message_size_limit: default_message_size_limit(),
            plan_pre_prompt: default_plan_pre_prompt(),
            task_pre_prompt: default_task_pre_prompt(),
            task_complete_desc: default_task_complete_desc(),
            clear_tool_message: true,
            planning_close_update: true,
            output_style_prompts: HashMap::new(),
            digital_employee_prompt: default_digital_employee_prompt(),
            summary_system_prompt: default_summary_system_prompt(),
            mcp_client_url: None,
            mcp_server_urls: Vec::new(),
            default_sop_prompt: String::new(),
            default_base_prompt: String::new(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults
    ///
    /// Environment variables:
    /// - `TASKFORGE_LLM_BASE_URL`, `TASKFORGE_LLM_API_KEY` (or `OPENAI_API_KEY`)
    /// - `TASKFORGE_PLANNER_MODEL`, `TASKFORGE_EXECUTOR_MODEL`, `TASKFORGE_REACT_MODEL`
    /// - `TASKFORGE_FUNCTION_CALL_TYPE`: `function_call` or `struct_parse`
    /// - `TASKFORGE_MAX_INPUT_TOKENS`
    /// - `TASKFORGE_PLANNER_MAX_STEPS`, `TASKFORGE_EXECUTOR_MAX_STEPS`, `TASKFORGE_REACT_MAX_STEPS`
    /// - `TASKFORGE_MAX_OBSERVE`, `TASKFORGE_MESSAGE_SIZE_LIMIT`
    /// - `TASKFORGE_CLEAR_TOOL_MESSAGE`, `TASKFORGE_PLANNING_CLOSE_UPDATE`: `1`/`true` or `0`/`false`
    /// - `TASKFORGE_PLAN_PRE_PROMPT`, `TASKFORGE_TASK_PRE_PROMPT`, `TASKFORGE_TASK_COMPLETE_DESC`
    /// - `TASKFORGE_{PLANNER,EXECUTOR,REACT}_SYSTEM_PROMPT`, `..._NEXT_STEP_PROMPT`: JSON maps
    /// - `TASKFORGE_EXECUTOR_SOP_PROMPT`: JSON map
    /// - `TASKFORGE_OUTPUT_STYLE_PROMPTS`: JSON map
    /// - `TASKFORGE_DIGITAL_EMPLOYEE_PROMPT`, `TASKFORGE_SUMMARY_SYSTEM_PROMPT`
    /// - `TASKFORGE_MCP_CLIENT_URL`, `TASKFORGE_MCP_SERVER_URLS` (comma separated)
    /// - `TASKFORGE_SOP_PROMPT`, `TASKFORGE_BASE_PROMPT`
    /// - `TASKFORGE_HEARTBEAT_INTERVAL_SECS`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        let base_url = env::var("TASKFORGE_LLM_BASE_URL").ok();
        let api_key = env::var("TASKFORGE_LLM_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok();
        let function_call_type = env::var("TASKFORGE_FUNCTION_CALL_TYPE")
            .ok()
            .map(|v| v.parse::<FunctionCallType>())
            .transpose()?;
        let max_input_tokens = env_parse::<usize>("TASKFORGE_MAX_INPUT_TOKENS");

        for (settings, model_var) in [
            (&mut config.planner_llm, "TASKFORGE_PLANNER_MODEL"),
            (&mut config.executor_llm, "TASKFORGE_EXECUTOR_MODEL"),
            (&mut config.react_llm, "TASKFORGE_REACT_MODEL"),
        ] {
            if let Ok(model) = env::var(model_var) {
                settings.model = model;
            }
            if let Some(base_url) = &base_url {
                settings.base_url = base_url.clone();
            }
            if let Some(api_key) = &api_key {
                settings.api_key = api_key.clone();
            }
            if let Some(kind) = function_call_type {
                settings.function_call_type = kind;
            }
            if let Some(max) = max_input_tokens {
                settings.max_input_tokens = max;
            }
        }

        for (prompts, prefix) in [
            (&mut config.planner, "TASKFORGE_PLANNER"),
            (&mut config.executor, "TASKFORGE_EXECUTOR"),
            (&mut config.react, "TASKFORGE_REACT"),
        ] {
            if let Some(map) = env_json_map(&format!("{}_SYSTEM_PROMPT", prefix))? {
                prompts.system_prompt.extend(map);
            }
            if let Some(map) = env_json_map(&format!("{}_NEXT_STEP_PROMPT", prefix))? {
                prompts.next_step_prompt.extend(map);
            }
            if let Some(map) = env_json_map(&format!("{}_SOP_PROMPT", prefix))? {
                prompts.sop_prompt.extend(map);
            }
        }

        if let Some(v) = env_parse("TASKFORGE_PLANNER_MAX_STEPS") {
            config.planner_max_steps = v;
        }
        if let Some(v) = env_parse("TASKFORGE_EXECUTOR_MAX_STEPS") {
            config.executor_max_steps = v;
        }
        if let Some(v) = env_parse("TASKFORGE_REACT_MAX_STEPS") {
            config.react_max_steps = v;
        }
        if let Some(v) = env_parse("TASKFORGE_MAX_OBSERVE") {
            config.max_observe = v;
        }
        if let Some(v) = env_parse("TASKFORGE_MESSAGE_SIZE_LIMIT") {
            config.message_size_limit = v;
        }
        if let Some(v) = env_bool("TASKFORGE_CLEAR_TOOL_MESSAGE") {
            config.clear_tool_message = v;
        }
        if let Some(v) = env_bool("TASKFORGE_PLANNING_CLOSE_UPDATE") {
            config.planning_close_update = v;
        }
        if let Ok(v) = env::var("TASKFORGE_PLAN_PRE_PROMPT") {
            config.plan_pre_prompt = v;
        }
        if let Ok(v) = env::var("TASKFORGE_TASK_PRE_PROMPT") {
            config.task_pre_prompt = v;
        }
        if let Ok(v) = env::var("TASKFORGE_TASK_COMPLETE_DESC") {
            config.task_complete_desc = v;
        }
        if let Some(map) = env_json_map("TASKFORGE_OUTPUT_STYLE_PROMPTS")? {
            config.output_style_prompts = map;
        }
        if let Ok(v) = env::var("TASKFORGE_DIGITAL_EMPLOYEE_PROMPT") {
            config.digital_employee_prompt = v;
        }
        if let Ok(v) = env::var("TASKFORGE_SUMMARY_SYSTEM_PROMPT") {
            config.summary_system_prompt = v;
        }
        config.mcp_client_url = env::var("TASKFORGE_MCP_CLIENT_URL")
            .ok()
            .filter(|v| !v.is_empty());
        if let Ok(v) = env::var("TASKFORGE_MCP_SERVER_URLS") {
            config.mcp_server_urls = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(v) = env::var("TASKFORGE_SOP_PROMPT") {
            config.default_sop_prompt = v;
        }
        if let Ok(v) = env::var("TASKFORGE_BASE_PROMPT") {
            config.default_base_prompt = v;
        }
        if let Some(v) = env_parse("TASKFORGE_HEARTBEAT_INTERVAL_SECS") {
            config.heartbeat_interval_secs = v;
        }

        Ok(config)
    }

    pub fn with_max_steps(mut self, planner: usize, executor: usize, react: usize) -> Self {
        self.planner_max_steps = planner;
        self.executor_max_steps = executor;
        self.react_max_steps = react;
        self
    }

    pub fn with_max_observe(mut self, max_observe: usize) -> Self {
        self.max_observe = max_observe;
        self
    }

    pub fn with_planning_close_update(mut self, enabled: bool) -> Self {
        self.planning_close_update = enabled;
        self
    }

    pub fn with_clear_tool_message(mut self, enabled: bool) -> Self {
        self.clear_tool_message = enabled;
        self
    }

    pub fn with_digital_employee_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.digital_employee_prompt = prompt.into();
        self
    }

    pub fn with_task_complete_desc(mut self, desc: impl Into<String>) -> Self {
        self.task_complete_desc = desc.into();
        self
    }

    pub fn with_output_style(mut self, style: impl Into<String>, prompt: impl Into<String>) -> Self {
        self.output_style_prompts.insert(style.into(), prompt.into());
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Query with the output style hint appended, if the style is known
    pub fn styled_query(&self, query: &str, output_style: Option<&str>) -> String {
        match output_style.and_then(|style| self.output_style_prompts.get(style)) {
            Some(hint) => format!("{}{}", query, hint),
            None => query.to_string(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().map(|v| {
        let v = v.trim().to_lowercase();
        v == "1" || v == "true"
    })
}

fn env_json_map(key: &str) -> Result<Option<HashMap<String, String>>> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| AgentError::config(format!("{} is not a JSON object: {}", key, e))),
        _ => Ok(None),
    }
}

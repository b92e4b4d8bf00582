// Per-request agent context
//
// One AgentContext is created per request and shared by `Arc` across every
// agent built for it. Immutable request facts are plain fields; the values
// agents mutate while working (current task, file lists) sit behind locks.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::file::File;
use crate::handler::AgentType;
use crate::printer::{LogPrinter, Printer};
use crate::tools::ToolCollection;

pub struct AgentContext {
    pub request_id: String,
    pub session_id: String,
    /// Original query, with the output style hint already applied
    pub query: String,
    pub date_info: String,
    pub is_stream: bool,
    pub sop_prompt: String,
    pub base_prompt: String,
    pub output_style: Option<String>,
    pub agent_type: AgentType,
    pub tool_collection: Arc<ToolCollection>,
    pub printer: Arc<dyn Printer>,
    task: RwLock<String>,
    stream_message_type: RwLock<Option<String>>,
    product_files: RwLock<Vec<File>>,
    task_product_files: RwLock<Vec<File>>,
}

impl AgentContext {
    pub fn builder(request_id: impl Into<String>, query: impl Into<String>) -> AgentContextBuilder {
        AgentContextBuilder::new(request_id, query)
    }

    /// Current sub-task text
    pub async fn task(&self) -> String {
        self.task.read().await.clone()
    }

    pub async fn set_task(&self, task: impl Into<String>) {
        *self.task.write().await = task.into();
    }

    /// Message type the LLM collaborator should use when streaming partial text
    pub async fn stream_message_type(&self) -> Option<String> {
        self.stream_message_type.read().await.clone()
    }

    pub async fn set_stream_message_type(&self, message_type: impl Into<String>) {
        *self.stream_message_type.write().await = Some(message_type.into());
    }

    /// Record a file produced by a tool for the request and the current sub-task
    pub async fn add_product_file(&self, file: File) {
        self.task_product_files.write().await.push(file.clone());
        self.product_files.write().await.push(file);
    }

    pub async fn product_files(&self) -> Vec<File> {
        self.product_files.read().await.clone()
    }

    pub async fn task_product_files(&self) -> Vec<File> {
        self.task_product_files.read().await.clone()
    }

    pub async fn clear_task_product_files(&self) {
        self.task_product_files.write().await.clear();
    }

    /// Deliverables: non-internal product files, most recent first
    pub async fn deliverable_files(&self) -> Vec<File> {
        self.product_files
            .read()
            .await
            .iter()
            .rev()
            .filter(|f| !f.is_internal_file)
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("request_id", &self.request_id)
            .field("session_id", &self.session_id)
            .field("agent_type", &self.agent_type)
            .field("is_stream", &self.is_stream)
            .field("tool_collection", &self.tool_collection)
            .finish()
    }
}

/// Builder for AgentContext
pub struct AgentContextBuilder {
    request_id: String,
    session_id: Option<String>,
    query: String,
    date_info: Option<String>,
    is_stream: bool,
    sop_prompt: String,
    base_prompt: String,
    output_style: Option<String>,
    agent_type: AgentType,
    tool_collection: Option<Arc<ToolCollection>>,
    printer: Option<Arc<dyn Printer>>,
}

impl AgentContextBuilder {
    pub fn new(request_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            session_id: None,
            query: query.into(),
            date_info: None,
            is_stream: false,
            sop_prompt: String::new(),
            base_prompt: String::new(),
            output_style: None,
            agent_type: AgentType::PlanSolve,
            tool_collection: None,
            printer: None,
        }
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn date_info(mut self, date_info: impl Into<String>) -> Self {
        self.date_info = Some(date_info.into());
        self
    }

    pub fn stream(mut self, is_stream: bool) -> Self {
        self.is_stream = is_stream;
        self
    }

    pub fn sop_prompt(mut self, sop_prompt: impl Into<String>) -> Self {
        self.sop_prompt = sop_prompt.into();
        self
    }

    pub fn base_prompt(mut self, base_prompt: impl Into<String>) -> Self {
        self.base_prompt = base_prompt.into();
        self
    }

    pub fn output_style(mut self, output_style: Option<String>) -> Self {
        self.output_style = output_style;
        self
    }

    pub fn agent_type(mut self, agent_type: AgentType) -> Self {
        self.agent_type = agent_type;
        self
    }

    pub fn tools(mut self, tools: Arc<ToolCollection>) -> Self {
        self.tool_collection = Some(tools);
        self
    }

    pub fn printer(mut self, printer: Arc<dyn Printer>) -> Self {
        self.printer = Some(printer);
        self
    }

    pub fn build(self) -> AgentContext {
        AgentContext {
            session_id: self.session_id.unwrap_or_else(|| self.request_id.clone()),
            request_id: self.request_id,
            query: self.query,
            date_info: self.date_info.unwrap_or_else(current_date_info),
            is_stream: self.is_stream,
            sop_prompt: self.sop_prompt,
            base_prompt: self.base_prompt,
            output_style: self.output_style,
            agent_type: self.agent_type,
            tool_collection: self
                .tool_collection
                .unwrap_or_else(|| Arc::new(ToolCollection::new())),
            printer: self.printer.unwrap_or_else(|| Arc::new(LogPrinter::new())),
            task: RwLock::new(String::new()),
            stream_message_type: RwLock::new(None),
            product_files: RwLock::new(Vec::new()),
            task_product_files: RwLock::new(Vec::new()),
        }
    }
}

/// Today's date as substituted into prompts as `{{date}}`
pub fn current_date_info() -> String {
    chrono::Local::now().format("%Y-%m-%d, %A").to_string()
}

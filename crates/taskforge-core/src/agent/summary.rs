// SummaryAgent: turns an executor transcript into the user-facing answer
//
// Design decisions:
// - One model call at a near-zero temperature; no tools, no step loop
// - File attribution matches each named item against the product files,
//   most recent first, and keeps the first file whose name contains it
// - A model failure is reported as a fixed summary text instead of an error

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::context::AgentContext;
use crate::file::File;
use crate::llm::LlmClient;
use crate::message::Message;
use crate::prompt::{render, FILE_NAME_SEPARATOR, SUMMARY_SEPARATOR};

/// Summary text used when the model call fails
pub const SUMMARY_FAILED: &str = "任务执行失败，请联系管理员！";

const SUMMARY_TEMPERATURE: f32 = 0.01;

/// Outcome of summarization
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskSummary {
    #[serde(rename = "taskSummary")]
    pub summary: String,
    #[serde(rename = "fileList")]
    pub files: Vec<File>,
}

impl TaskSummary {
    pub fn text(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            files: Vec::new(),
        }
    }
}

pub struct SummaryAgent {
    context: Arc<AgentContext>,
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    message_size_limit: usize,
}

impl SummaryAgent {
    pub fn new(
        context: Arc<AgentContext>,
        llm: Arc<dyn LlmClient>,
        system_prompt: impl Into<String>,
        message_size_limit: usize,
    ) -> Self {
        Self {
            context,
            llm,
            system_prompt: system_prompt.into(),
            message_size_limit,
        }
    }

    /// Summarize `messages` for `query`
    pub async fn summary_task_result(&self, messages: &[Message], query: &str) -> TaskSummary {
        let request_id = &self.context.request_id;
        if messages.is_empty() || query.is_empty() {
            warn!(request_id = %request_id, "SummaryAgent: nothing to summarize");
            return TaskSummary::default();
        }

        let history = self.task_history(messages);
        let files = self.context.product_files().await;
        let file_desc = files
            .iter()
            .filter(|f| !f.is_internal_file)
            .map(|f| format!("{} : {}", f.file_name, f.description))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = render(
            &self.system_prompt,
            &[
                ("taskHistory", &history),
                ("fileNameDesc", &file_desc),
                ("query", query),
            ],
        );

        info!(
            request_id = %request_id,
            messages = messages.len(),
            model = %self.llm.model_name(),
            "SummaryAgent: summarizing"
        );
        match self
            .llm
            .ask(
                &self.context,
                &[Message::user(prompt)],
                &[],
                false,
                Some(SUMMARY_TEMPERATURE),
            )
            .await
        {
            Ok(reply) => parse_summary(&reply, &files),
            Err(e) => {
                error!(request_id = %request_id, error = %e, "SummaryAgent: model call failed");
                TaskSummary::text(SUMMARY_FAILED)
            }
        }
    }

    fn task_history(&self, messages: &[Message]) -> String {
        let mut history = String::new();
        for message in messages {
            let content = if message.content.chars().count() > self.message_size_limit {
                message.content.chars().take(self.message_size_limit).collect()
            } else {
                message.content.clone()
            };
            history.push_str(&format!("role:{} content:{}\n", message.role, content));
        }
        history
    }
}

/// Parse `summary$$$file1、file2` against the known product files
pub fn parse_summary(reply: &str, files: &[File]) -> TaskSummary {
    let Some((summary, names)) = reply.split_once(SUMMARY_SEPARATOR) else {
        return TaskSummary::text(reply);
    };

    let candidates: Vec<&File> = files.iter().rev().filter(|f| !f.is_internal_file).collect();
    let mut attributed = Vec::new();
    for item in names.split(FILE_NAME_SEPARATOR).map(str::trim) {
        if item.is_empty() {
            continue;
        }
        if let Some(file) = candidates
            .iter()
            .find(|f| f.file_name.trim().contains(item))
        {
            attributed.push((*file).clone());
        }
    }

    TaskSummary {
        summary: summary.to_string(),
        files: attributed,
    }
}

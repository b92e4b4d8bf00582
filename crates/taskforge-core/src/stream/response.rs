// AgentResponse: the raw per-event record produced by the streaming printer
//
// One AgentResponse is produced for every `Printer::send`. It carries the
// payload in the slot matching its message type; the incremental result
// builder later folds these records into ordered client messages.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;
use uuid::Uuid;

use super::message_type;
use crate::plan::Plan;
use crate::printer::PrinterEvent;

/// Prefix planners put in front of step text: `执行顺序<N>.`
pub const STEP_ORDER_PREFIX: &str = "执行顺序";

/// Plan as presented to clients, with stage labels split out of each step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanView {
    pub title: String,
    pub stages: Vec<String>,
    pub steps: Vec<String>,
    pub step_status: Vec<String>,
    pub notes: Vec<String>,
}

/// One tool invocation as reported to clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultView {
    pub tool_name: String,
    #[serde(default)]
    pub tool_param: Value,
    #[serde(default)]
    pub tool_result: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub request_id: String,
    pub message_id: String,
    pub is_final: bool,
    pub message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_employee: Option<String>,
    /// Milliseconds since the epoch
    pub message_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_thought: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_thought: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResultView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_map: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub finish: bool,
}

impl AgentResponse {
    /// Build the record for one printer event
    pub fn from_event(request_id: &str, agent_type: i32, event: PrinterEvent) -> Self {
        let PrinterEvent {
            message_id,
            message_type,
            message,
            digital_employee,
            is_final,
        } = event;

        let mut response = AgentResponse {
            request_id: request_id.to_string(),
            message_id: message_id.unwrap_or_else(|| Uuid::now_v7().to_string()),
            is_final,
            finish: message_type == message_type::RESULT,
            message_time: chrono::Utc::now().timestamp_millis().to_string(),
            result_map: Some(agent_type_map(agent_type)),
            digital_employee: digital_employee.filter(|d| !d.is_empty()),
            message_type,
            ..Default::default()
        };

        match response.message_type.as_str() {
            message_type::TOOL_THOUGHT => response.tool_thought = Some(value_text(&message)),
            message_type::TASK => response.task = Some(strip_step_prefix(&value_text(&message))),
            message_type::PLAN_THOUGHT => response.plan_thought = Some(value_text(&message)),
            message_type::AGENT_STREAM => response.result = Some(value_text(&message)),
            message_type::TASK_SUMMARY => match message {
                Value::Object(map) => {
                    response.task_summary = map.get("taskSummary").map(value_text);
                    response.result_map = Some(map);
                }
                other => warn!(payload = %other, "task_summary payload is not an object"),
            },
            message_type::PLAN => {
                response.plan = match serde_json::from_value::<Plan>(message.clone()) {
                    Ok(plan) => Some(format_steps(&plan)),
                    Err(_) => serde_json::from_value::<PlanView>(message).ok(),
                };
            }
            message_type::TOOL_RESULT => {
                response.tool_result = serde_json::from_value(message).ok();
            }
            message_type::RESULT => {
                match message {
                    Value::Object(mut map) => {
                        response.result = map.get("taskSummary").map(value_text);
                        map.insert("agentType".into(), json!(agent_type));
                        response.result_map = Some(map);
                    }
                    other => response.result = Some(value_text(&other)),
                }
            }
            t if message_type::is_rich(t) => {
                let mut map = match message {
                    Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
                        Ok(Value::Object(map)) => map,
                        _ => content_map(Value::String(raw)),
                    },
                    Value::Object(map) => map,
                    other => content_map(Value::String(value_text(&other))),
                };
                map.insert("agentType".into(), json!(agent_type));
                response.result_map = Some(map);
            }
            _ => {}
        }

        response
    }
}

fn agent_type_map(agent_type: i32) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("agentType".into(), json!(agent_type));
    map
}

fn content_map(content: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("content".into(), content);
    map
}

/// Text of a payload: strings verbatim, everything else serialized
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Split `执行顺序<N>.` off the front of a step, returning the remainder
fn split_step_prefix(step: &str) -> Option<&str> {
    let rest = step.strip_prefix(STEP_ORDER_PREFIX)?;
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = rest[digits..].strip_prefix('.')?;
    Some(rest.strip_prefix(char::is_whitespace).unwrap_or(rest))
}

/// Remove the `执行顺序<N>.` prefix from a task description
pub fn strip_step_prefix(task: &str) -> String {
    split_step_prefix(task).unwrap_or(task).to_string()
}

/// Convert a plan into its client view. Steps written as
/// `执行顺序<N>.<stage>：<step>` are split into stage and step; anything
/// else keeps an empty stage.
pub fn format_steps(plan: &Plan) -> PlanView {
    let mut view = PlanView {
        title: plan.title.clone(),
        step_status: plan
            .step_status()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect(),
        notes: plan.notes().to_vec(),
        ..Default::default()
    };

    for step in plan.steps() {
        let parsed = split_step_prefix(step).and_then(|rest| {
            let idx = rest.rfind(['：', ':'])?;
            let sep_len = rest[idx..].chars().next().map(char::len_utf8).unwrap_or(1);
            Some((rest[..idx].trim(), rest[idx + sep_len..].trim()))
        });
        match parsed {
            Some((stage, text)) => {
                view.stages.push(stage.to_string());
                view.steps.push(text.to_string());
            }
            None => {
                view.stages.push(String::new());
                view.steps.push(step.clone());
            }
        }
    }
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::StepStatus;

    #[test]
    fn test_strip_step_prefix() {
        assert_eq!(strip_step_prefix("执行顺序2. 撰写报告"), "撰写报告");
        assert_eq!(strip_step_prefix("执行顺序10.search"), "search");
        assert_eq!(strip_step_prefix("plain task"), "plain task");
        assert_eq!(strip_step_prefix("执行顺序.x"), "执行顺序.x");
    }

    #[test]
    fn test_format_steps_splits_stage() {
        let mut plan = Plan::create(
            "Compare",
            vec![
                "执行顺序1.调研：收集 X 和 Y 的资料".into(),
                "write the report".into(),
            ],
        );
        plan.update_step_status(0, Some(StepStatus::InProgress), None)
            .unwrap();

        let view = format_steps(&plan);
        assert_eq!(view.stages, vec!["调研", ""]);
        assert_eq!(view.steps, vec!["收集 X 和 Y 的资料", "write the report"]);
        assert_eq!(view.step_status, vec!["in_progress", "not_started"]);
    }

    #[test]
    fn test_result_event_with_summary() {
        let event = PrinterEvent::new(
            message_type::RESULT,
            json!({"taskSummary": "done", "fileList": []}),
        );
        let response = AgentResponse::from_event("req", 3, event);

        assert!(response.finish);
        assert!(response.is_final);
        assert_eq!(response.result.as_deref(), Some("done"));
        let map = response.result_map.unwrap();
        assert_eq!(map["agentType"], 3);
        assert!(map.contains_key("fileList"));
    }

    #[test]
    fn test_rich_type_parses_json_string() {
        let event = PrinterEvent::new("markdown", json!("{\"data\": \"# Title\"}"))
            .partial()
            .with_message_id("m-1");
        let response = AgentResponse::from_event("req", 5, event);

        assert_eq!(response.message_id, "m-1");
        assert!(!response.is_final);
        assert!(!response.finish);
        let map = response.result_map.unwrap();
        assert_eq!(map["data"], "# Title");
        assert_eq!(map["agentType"], 5);
    }

    #[test]
    fn test_plan_event_uses_plan_view() {
        let plan = Plan::create("T", vec!["执行顺序1.a：b".into()]);
        let event = PrinterEvent::new(message_type::PLAN, serde_json::to_value(&plan).unwrap());
        let response = AgentResponse::from_event("req", 3, event);
        let view = response.plan.unwrap();
        assert_eq!(view.steps, vec!["b"]);
        assert_eq!(view.stages, vec!["a"]);
    }
}

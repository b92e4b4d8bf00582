// EventResult: per-request ordering state and replay buffer
//
// Design decisions:
// - Owned by exactly one IncrementalResultBuilder; agents never touch it
// - Order counters start at 1 and only ever increase, per key
// - `result_map()["tasks"]` is a list of task entries, each a list of the
//   final messages recorded under that task
// - `result_list` keeps every packet's EventMessage with its sequence number
//   so a reconnecting client can resume from a known position

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// One unit pushed to the client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_order: Option<u64>,
    pub message_id: String,
    pub message_type: String,
    pub message_order: u64,
    #[serde(default)]
    pub result_map: Value,
}

/// A sequenced EventMessage kept for reconnects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayEntry {
    pub seq: u64,
    pub message: EventMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResult {
    /// Number of messages built so far
    pub message_count: u64,
    order_mapping: HashMap<String, u64>,
    init_plan: bool,
    task_id: Option<String>,
    task_order: u64,
    cached: Map<String, Value>,
    tasks: Vec<Vec<Value>>,
    result_list: Vec<ReplayEntry>,
}

impl Default for EventResult {
    fn default() -> Self {
        Self::new()
    }
}

impl EventResult {
    pub fn new() -> Self {
        Self {
            message_count: 0,
            order_mapping: HashMap::new(),
            init_plan: false,
            task_id: None,
            task_order: 1,
            cached: Map::new(),
            tasks: Vec::new(),
            result_list: Vec::new(),
        }
    }

    /// Return the next order for `key`: 1 on first use, then 2, 3, ...
    pub fn get_and_incr_order(&mut self, key: &str) -> u64 {
        let order = self.order_mapping.entry(key.to_string()).or_insert(0);
        *order += 1;
        *order
    }

    /// True exactly once: the first time a plan is seen
    pub fn is_init_plan(&mut self) -> bool {
        if self.init_plan {
            false
        } else {
            self.init_plan = true;
            true
        }
    }

    /// Current task id, allocating one if no task has started yet
    pub fn task_id(&mut self) -> String {
        self.task_id
            .get_or_insert_with(|| Uuid::now_v7().to_string())
            .clone()
    }

    /// Start a new task: fresh id, task order reset to 1
    pub fn renew_task_id(&mut self) -> String {
        self.task_order = 1;
        let id = Uuid::now_v7().to_string();
        self.task_id = Some(id.clone());
        id
    }

    /// Return the current task order and increment it
    pub fn next_task_order(&mut self) -> u64 {
        let order = self.task_order;
        self.task_order += 1;
        order
    }

    /// Record a new top-level task entry
    pub fn set_result_map_task(&mut self, task: Vec<Value>) {
        self.tasks.push(task);
    }

    /// Record a message under the most recent task entry
    pub fn set_result_map_sub_task(&mut self, sub_task: Value) {
        match self.tasks.last_mut() {
            Some(sub_tasks) => sub_tasks.push(sub_task),
            None => self.tasks.push(vec![sub_task]),
        }
    }

    /// Task entries recorded so far
    pub fn tasks(&self) -> &[Vec<Value>] {
        &self.tasks
    }

    /// Replay buffer: cached plan-level values plus `"tasks"`
    pub fn result_map(&self) -> Map<String, Value> {
        let mut map = self.cached.clone();
        if !self.tasks.is_empty() {
            map.insert(
                "tasks".into(),
                Value::Array(self.tasks.iter().cloned().map(Value::Array).collect()),
            );
        }
        map
    }

    /// Cache a plan-level value unless one is already cached
    pub fn cache_once(&mut self, key: &str, value: Value) {
        if !self.cached.contains_key(key) {
            self.cached.insert(key.to_string(), value);
        }
    }

    pub fn cache(&mut self, key: &str, value: Value) {
        self.cached.insert(key.to_string(), value);
    }

    /// Append a built message to the reconnect log, returning its sequence number
    pub fn record(&mut self, message: EventMessage) -> u64 {
        self.message_count += 1;
        let seq = self.message_count;
        self.result_list.push(ReplayEntry { seq, message });
        seq
    }

    /// Messages recorded after sequence number `from`
    pub fn replay_from(&self, from: u64) -> Vec<ReplayEntry> {
        self.result_list
            .iter()
            .filter(|entry| entry.seq > from)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_counters_per_key() {
        let mut er = EventResult::new();
        assert_eq!(er.get_and_incr_order("a"), 1);
        assert_eq!(er.get_and_incr_order("b"), 1);
        assert_eq!(er.get_and_incr_order("a"), 2);
        assert_eq!(er.get_and_incr_order("a"), 3);
        assert_eq!(er.get_and_incr_order("b"), 2);
    }

    #[test]
    fn test_init_plan_once() {
        let mut er = EventResult::new();
        assert!(er.is_init_plan());
        assert!(!er.is_init_plan());
    }

    #[test]
    fn test_task_order_resets_on_renew() {
        let mut er = EventResult::new();
        let first = er.renew_task_id();
        assert_eq!(er.next_task_order(), 1);
        assert_eq!(er.next_task_order(), 2);

        let second = er.renew_task_id();
        assert_ne!(first, second);
        assert_eq!(er.task_id(), second);
        assert_eq!(er.next_task_order(), 1);
    }

    #[test]
    fn test_sub_task_without_task_creates_entry() {
        let mut er = EventResult::new();
        er.set_result_map_sub_task(json!({"n": 1}));
        er.set_result_map_task(vec![json!({"t": 2})]);
        er.set_result_map_sub_task(json!({"n": 3}));

        assert_eq!(
            er.tasks(),
            &[vec![json!({"n": 1})], vec![json!({"t": 2}), json!({"n": 3})]]
        );
        assert_eq!(er.result_map()["tasks"][1][1]["n"], 3);
    }

    #[test]
    fn test_replay_from() {
        let mut er = EventResult::new();
        for i in 0..3 {
            er.record(EventMessage {
                message_id: format!("m{}", i),
                message_type: "task".into(),
                message_order: 1,
                ..Default::default()
            });
        }
        let tail = er.replay_from(1);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].seq, 2);
        assert_eq!(tail[0].message.message_id, "m1");
    }
}

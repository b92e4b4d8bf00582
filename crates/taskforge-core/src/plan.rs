// Plan: ordered steps with per-step status and notes
//
// Invariant: `steps`, `step_status` and `notes` always have the same length.
// Every mutation goes through methods that preserve it; invalid indexes are
// rejected before anything is written.

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// Status of a single plan step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotStarted,
    InProgress,
    Completed,
    Blocked,
}

impl StepStatus {
    pub const ALL: [StepStatus; 4] = [
        StepStatus::NotStarted,
        StepStatus::InProgress,
        StepStatus::Completed,
        StepStatus::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::NotStarted => "not_started",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub title: String,
    steps: Vec<String>,
    step_status: Vec<StepStatus>,
    notes: Vec<String>,
}

impl Plan {
    /// New plan with every step `not_started` and empty notes
    pub fn create(title: impl Into<String>, steps: Vec<String>) -> Self {
        let len = steps.len();
        Self {
            title: title.into(),
            steps,
            step_status: vec![StepStatus::NotStarted; len],
            notes: vec![String::new(); len],
        }
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn step_status(&self) -> &[StepStatus] {
        &self.step_status
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Replace title and/or steps. A step whose text is unchanged at the same
    /// index keeps its status and note.
    pub fn update(&mut self, title: Option<String>, new_steps: Option<Vec<String>>) {
        if let Some(title) = title {
            self.title = title;
        }
        let Some(new_steps) = new_steps else {
            return;
        };

        let mut status = Vec::with_capacity(new_steps.len());
        let mut notes = Vec::with_capacity(new_steps.len());
        for (i, step) in new_steps.iter().enumerate() {
            if self.steps.get(i) == Some(step) {
                status.push(self.step_status[i]);
                notes.push(self.notes[i].clone());
            } else {
                status.push(StepStatus::NotStarted);
                notes.push(String::new());
            }
        }
        self.steps = new_steps;
        self.step_status = status;
        self.notes = notes;
    }

    /// Set status and/or note of one step
    pub fn update_step_status(
        &mut self,
        index: usize,
        status: Option<StepStatus>,
        note: Option<String>,
    ) -> Result<()> {
        if index >= self.steps.len() {
            return Err(AgentError::plan(format!("Invalid step_index: {}", index)));
        }
        if let Some(status) = status {
            self.step_status[index] = status;
        }
        if let Some(note) = note {
            self.notes[index] = note;
        }
        Ok(())
    }

    /// Index of the first `in_progress` step
    pub fn current_index(&self) -> Option<usize> {
        self.step_status
            .iter()
            .position(|s| *s == StepStatus::InProgress)
    }

    /// Text of the step currently in progress
    pub fn current_step(&self) -> Option<&str> {
        self.current_index().map(|i| self.steps[i].as_str())
    }

    pub fn is_complete(&self) -> bool {
        self.step_status.iter().all(|s| *s == StepStatus::Completed)
    }

    /// Move the plan forward by one step.
    ///
    /// With a step in progress, completes it and starts the next one (if any).
    /// With nothing in progress, starts the first step that is not completed.
    /// On a fully completed plan this is a no-op.
    pub fn advance(&mut self) {
        match self.current_index() {
            Some(i) => {
                self.step_status[i] = StepStatus::Completed;
                self.notes[i].clear();
                if let Some(next) = self.step_status.get_mut(i + 1) {
                    *next = StepStatus::InProgress;
                    self.notes[i + 1].clear();
                }
            }
            None => {
                if let Some(first_open) = self
                    .step_status
                    .iter()
                    .position(|s| *s != StepStatus::Completed)
                {
                    self.step_status[first_open] = StepStatus::InProgress;
                    self.notes[first_open].clear();
                }
            }
        }
    }

    /// Mark every step completed
    pub fn finish(&mut self) {
        for status in &mut self.step_status {
            *status = StepStatus::Completed;
        }
    }

    /// Human readable rendering used as tool output
    pub fn format(&self) -> String {
        let mut lines = vec![format!("Plan: {}", self.title), "Steps:".to_string()];
        for (i, step) in self.steps.iter().enumerate() {
            lines.push(format!("{}. [{}] {}", i + 1, self.step_status[i], step));
            if !self.notes[i].is_empty() {
                lines.push(format!("   Notes: {}", self.notes[i]));
            }
        }
        lines.join("\n")
    }
}

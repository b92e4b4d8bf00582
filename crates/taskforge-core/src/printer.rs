// Event emitters (printers)
//
// Agents report progress by sending PrinterEvents. A Printer decides where
// they go: the log, a channel feeding the SSE transport, or a test recorder.
//
// Design decisions:
// - `send` is async and fallible; a closed stream is an EventEmission error
// - StreamPrinter uses a bounded channel so a slow client applies backpressure
// - The agent type tag is atomic so handlers can re-tag mid-request

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicI32, Ordering};
use tokio::sync::{mpsc, Mutex};
use tracing::info;

use crate::error::{AgentError, Result};
use crate::handler::AgentType;
use crate::stream::AgentResponse;

/// One event emitted by an agent
#[derive(Debug, Clone, PartialEq)]
pub struct PrinterEvent {
    /// Shared by every chunk of one streamed message; generated when absent
    pub message_id: Option<String>,
    pub message_type: String,
    pub message: Value,
    pub digital_employee: Option<String>,
    pub is_final: bool,
}

impl PrinterEvent {
    /// A final event without message id or persona
    pub fn new(message_type: impl Into<String>, message: Value) -> Self {
        Self {
            message_id: None,
            message_type: message_type.into(),
            message,
            digital_employee: None,
            is_final: true,
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_digital_employee(mut self, digital_employee: Option<String>) -> Self {
        self.digital_employee = digital_employee;
        self
    }

    /// Mark as a partial chunk of a streamed message
    pub fn partial(mut self) -> Self {
        self.is_final = false;
        self
    }
}

/// Sink for agent events
#[async_trait]
pub trait Printer: Send + Sync {
    async fn send(&self, event: PrinterEvent) -> Result<()>;

    /// Shorthand for a final event with no message id or persona
    async fn send_message(&self, message_type: &str, message: Value) -> Result<()> {
        self.send(PrinterEvent::new(message_type, message)).await
    }

    /// Signal the end of the request's stream
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn update_agent_type(&self, _agent_type: AgentType) {}
}

/// Writes every event to the log
#[derive(Debug, Default)]
pub struct LogPrinter;

impl LogPrinter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Printer for LogPrinter {
    async fn send(&self, event: PrinterEvent) -> Result<()> {
        info!(
            message_type = %event.message_type,
            is_final = event.is_final,
            digital_employee = ?event.digital_employee,
            message = %event.message,
            "LogPrinter: event"
        );
        Ok(())
    }
}

/// Converts events into AgentResponses and forwards them over a channel
pub struct StreamPrinter {
    request_id: String,
    agent_type: AtomicI32,
    sender: Mutex<Option<mpsc::Sender<AgentResponse>>>,
}

impl StreamPrinter {
    /// Printer plus the receiving half the transport drains
    pub fn channel(
        request_id: impl Into<String>,
        agent_type: AgentType,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<AgentResponse>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let printer = Self {
            request_id: request_id.into(),
            agent_type: AtomicI32::new(agent_type.code()),
            sender: Mutex::new(Some(tx)),
        };
        (printer, rx)
    }

    pub fn agent_type_code(&self) -> i32 {
        self.agent_type.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for StreamPrinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamPrinter")
            .field("request_id", &self.request_id)
            .field("agent_type", &self.agent_type_code())
            .finish()
    }
}

#[async_trait]
impl Printer for StreamPrinter {
    async fn send(&self, event: PrinterEvent) -> Result<()> {
        let response = AgentResponse::from_event(&self.request_id, self.agent_type_code(), event);
        let guard = self.sender.lock().await;
        let sender = guard
            .as_ref()
            .ok_or_else(|| AgentError::event("stream already closed"))?;
        sender
            .send(response)
            .await
            .map_err(|_| AgentError::event("stream receiver dropped"))
    }

    async fn close(&self) -> Result<()> {
        self.sender.lock().await.take();
        Ok(())
    }

    fn update_agent_type(&self, agent_type: AgentType) {
        self.agent_type.store(agent_type.code(), Ordering::Relaxed);
    }
}

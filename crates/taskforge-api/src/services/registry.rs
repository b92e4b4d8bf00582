// In-memory registry of per-request result builders
//
// Each request owns one IncrementalResultBuilder. The streaming response
// folds packets into it and the replay endpoint reads it back. The oldest
// requests are evicted once the capacity is reached.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::debug;

use taskforge_core::IncrementalResultBuilder;

use crate::dto::ReplayResponse;

pub type SharedBuilder = Arc<Mutex<IncrementalResultBuilder>>;

#[derive(Default)]
struct Inner {
    builders: HashMap<String, SharedBuilder>,
    order: VecDeque<String>,
}

pub struct RequestRegistry {
    capacity: usize,
    inner: RwLock<Inner>,
}

impl RequestRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Register a fresh builder for `request_id`, replacing any previous one
    pub fn start(&self, request_id: &str) -> SharedBuilder {
        let builder = Arc::new(Mutex::new(IncrementalResultBuilder::new(request_id)));
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        if inner
            .builders
            .insert(request_id.to_string(), builder.clone())
            .is_some()
        {
            inner.order.retain(|id| id != request_id);
        }
        inner.order.push_back(request_id.to_string());

        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.builders.remove(&evicted);
                debug!(request_id = %evicted, "RequestRegistry: evicted replay buffer");
            }
        }
        builder
    }

    pub fn get(&self, request_id: &str) -> Option<SharedBuilder> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.builders.get(request_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages recorded after `from_order`, plus the cached result map
    pub async fn replay(&self, request_id: &str, from_order: u64) -> Option<ReplayResponse> {
        let builder = self.get(request_id)?;
        let builder = builder.lock().await;
        let event_result = builder.event_result();
        Some(ReplayResponse {
            request_id: request_id.to_string(),
            message_count: event_result.message_count,
            result_map: event_result.result_map(),
            messages: event_result.replay_from(from_order),
        })
    }
}

impl std::fmt::Debug for RequestRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRegistry")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

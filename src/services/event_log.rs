use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use tracing::warn;

use crate::config::EventLogConfig;
use crate::models::{PostureEvent, SessionId, SessionSummary};

/// Destination for per-poll posture events
///
/// Recording is fire-and-forget: implementations must not fail the caller.
pub trait EventSink: Send + Sync {
    fn record(&self, event: PostureEvent);

    /// Forget a session's history; called when the id starts a new run
    fn clear(&self, session_id: &SessionId);
}

/// Bounded in-memory event history, kept per session
pub struct InMemoryEventLog {
    capacity: usize,
    events: RwLock<HashMap<SessionId, VecDeque<PostureEvent>>>,
}

impl InMemoryEventLog {
    pub fn new(config: &EventLogConfig) -> Self {
        Self {
            capacity: config.capacity.max(1),
            events: RwLock::new(HashMap::new()),
        }
    }

    /// Events of one session, oldest first
    pub fn events(&self, session_id: &SessionId) -> Vec<PostureEvent> {
        match self.events.read() {
            Ok(events) => events
                .get(session_id)
                .map(|queue| queue.iter().cloned().collect())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    pub fn summary(&self, session_id: &SessionId) -> SessionSummary {
        let events = self.events(session_id);
        SessionSummary::from_events(session_id.clone(), &events)
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new(&EventLogConfig::default())
    }
}

impl EventSink for InMemoryEventLog {
    fn record(&self, event: PostureEvent) {
        let mut events = match self.events.write() {
            Ok(events) => events,
            Err(_) => {
                warn!(session_id = %event.session_id, "Event log lock poisoned, dropping event");
                return;
            }
        };

        let queue = events.entry(event.session_id.clone()).or_default();
        if queue.len() == self.capacity {
            queue.pop_front();
        }
        queue.push_back(event);
    }

    fn clear(&self, session_id: &SessionId) {
        if let Ok(mut events) = self.events.write() {
            events.remove(session_id);
        }
    }
}

//! Progress events for a run.
//!
//! Emission is synchronous and fire-and-forget: a sink must never block the
//! pipeline, and a run with no listener behaves exactly like one with a listener.

use serde_json::{json, Map, Value};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use uuid::Uuid;

use crate::agent::state::{Node, RunStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    RunStarted { run_id: Uuid },
    NodeStarted { run_id: Uuid, node: Node },
    NodeCompleted { run_id: Uuid, node: Node },
    RunCompleted { run_id: Uuid, status: RunStatus },
}

impl RunEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::RunStarted { .. } => "run_started",
            RunEvent::NodeStarted { .. } => "node_started",
            RunEvent::NodeCompleted { .. } => "node_completed",
            RunEvent::RunCompleted { .. } => "run_completed",
        }
    }

    pub fn payload(&self) -> Map<String, Value> {
        let value = match self {
            RunEvent::RunStarted { run_id } => json!({ "run_id": run_id }),
            RunEvent::NodeStarted { run_id, node } | RunEvent::NodeCompleted { run_id, node } => {
                json!({ "run_id": run_id, "node": node.as_str() })
            }
            RunEvent::RunCompleted { run_id, status } => {
                json!({ "run_id": run_id, "status": status.as_str() })
            }
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &RunEvent);
}

/// Discards every event.
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &RunEvent) {}
}

/// Logs events at debug level.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &RunEvent) {
        let payload = Value::Object(event.payload());
        debug!(event = event.name(), payload = %payload, "run event");
    }
}

/// Forwards events to an unbounded channel. A dropped receiver is ignored.
pub struct ChannelSink(pub UnboundedSender<RunEvent>);

impl EventSink for ChannelSink {
    fn emit(&self, event: &RunEvent) {
        let _ = self.0.send(event.clone());
    }
}

/// Adapts a `(name, payload)` callback.
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(&str, &Map<String, Value>) + Send + Sync,
{
    fn emit(&self, event: &RunEvent) {
        (self.0)(event.name(), &event.payload());
    }
}

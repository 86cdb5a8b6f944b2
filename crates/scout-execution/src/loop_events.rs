//! Tracing layer that streams agent-loop events to a channel.
//!
//! The (external) service layer subscribes to these events to push live
//! progress to clients while a query runs. Only events from `scout::`
//! targets are forwarded; everything else stays on the normal log path.

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// One forwarded engine event.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LoopEvent {
    /// Event target (e.g., "scout::agent_loop")
    pub target: String,
    /// Log level (INFO, DEBUG, WARN, ERROR)
    pub level: String,
    /// Human-readable message
    pub message: String,
    /// Structured fields from the event (session_id, step, action, ...)
    pub fields: HashMap<String, Value>,
    /// Timestamp
    pub timestamp: String,
}

impl LoopEvent {
    /// The session this event belongs to, when the event carries one.
    pub fn session_id(&self) -> Option<&str> {
        self.fields.get("session_id").and_then(|v| v.as_str())
    }
}

/// A tracing layer that forwards `scout::` events to a channel.
pub struct LoopEventLayer {
    sender: mpsc::UnboundedSender<LoopEvent>,
}

impl LoopEventLayer {
    /// Creates the layer and the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LoopEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl<S> Layer<S> for LoopEventLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let target = event.metadata().target();
        if !target.starts_with("scout::") {
            return;
        }

        let mut fields = HashMap::new();
        let mut visitor = FieldVisitor(&mut fields);
        event.record(&mut visitor);

        let loop_event = LoopEvent {
            target: target.to_string(),
            level: event.metadata().level().to_string(),
            message: fields
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            fields,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        // Non-blocking send - if the receiver is dropped, we just skip
        let _ = self.sender.send(loop_event);
    }
}

/// Field visitor that extracts tracing event fields into a HashMap
struct FieldVisitor<'a>(&'a mut HashMap<String, Value>);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(
            field.name().to_string(),
            serde_json::json!(format!("{:?}", value)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[tokio::test]
    async fn forwards_scout_events_and_ignores_the_rest() {
        let (layer, mut receiver) = LoopEventLayer::channel();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "scout::agent_loop", session_id = "s1", step = 2u64, "action selected");
            tracing::info!(target: "some::other::crate", "should not be forwarded");
        });

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.target, "scout::agent_loop");
        assert_eq!(event.message, "action selected");
        assert_eq!(event.session_id(), Some("s1"));
        assert_eq!(event.fields.get("step"), Some(&serde_json::json!(2)));

        assert!(receiver.try_recv().is_err());
    }
}

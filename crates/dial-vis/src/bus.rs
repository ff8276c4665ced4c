//! Typed publish/subscribe bus between the controller and its views.

use dial_model::MessageId;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

use crate::views::RenderFrame;

/// Events pushed to every subscribed view.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VisEvent {
    /// Fresh render of every view
    Frame(Box<RenderFrame>),

    /// Something the user must be told about
    Warning { message: String },

    /// Raw backend document for the message editor
    Document { id: MessageId, document: Value },

    /// Instance list changed or a new instance was selected
    Instances {
        instances: Vec<String>,
        selected: Option<String>,
    },
}

/// Broadcast bus. Publishing never blocks; slow subscribers lag.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<VisEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: VisEvent) {
        if self.tx.send(event).is_err() {
            trace!("no subscribers");
        }
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.publish(VisEvent::Warning {
            message: message.into(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VisEvent> {
        self.tx.subscribe()
    }

    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.warn("first");
        bus.publish(VisEvent::Document {
            id: "m1".into(),
            document: json!({"k": 1}),
        });

        assert!(matches!(rx.recv().await.unwrap(), VisEvent::Warning { message } if message == "first"));
        assert!(matches!(rx.recv().await.unwrap(), VisEvent::Document { .. }));
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::new(1);
        bus.warn("nobody listening");
        assert_eq!(bus.subscribers(), 0);
    }

    #[test]
    fn events_are_tagged() {
        let event = VisEvent::Instances {
            instances: vec!["p/echo#i".into()],
            selected: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "instances");
        assert_eq!(json["instances"][0], "p/echo#i");
    }
}

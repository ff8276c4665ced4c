//! Render adapters: read-only consumers invoked after every mutation.

use dial_model::{MessagesSnapshot, Playhead, StatesResponse, Topology};

use crate::bus::{EventBus, VisEvent};
use crate::views::{RenderFrame, Scene};

/// A view attached to the controller.
///
/// `on_state_change` runs synchronously after each mutation with a
/// consistent scene. The setters mirror the raw updates for adapters that
/// keep their own copy; they default to doing nothing.
pub trait RenderAdapter: Send {
    fn on_state_change(&mut self, scene: &Scene<'_>);

    fn set_topology(&mut self, _topology: &Topology) {}

    fn set_messages(&mut self, _snapshot: &MessagesSnapshot) {}

    fn set_states(&mut self, _states: &StatesResponse) {}

    fn set_time(&mut self, _playhead: Playhead) {}
}

/// Publishes every scene as a [`RenderFrame`] on the bus.
#[derive(Debug, Clone)]
pub struct BusAdapter {
    bus: EventBus,
}

impl BusAdapter {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl RenderAdapter for BusAdapter {
    fn on_state_change(&mut self, scene: &Scene<'_>) {
        if self.bus.subscribers() == 0 {
            return;
        }
        self.bus
            .publish(VisEvent::Frame(Box::new(RenderFrame::build(scene))));
    }
}

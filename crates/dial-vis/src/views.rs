//! Frames for the graph, swimlane and detail views.

use std::collections::{BTreeMap, BTreeSet};

use dial_model::{
    EventLog, LogicalClock, MessageEvent, MessageId, Placement, Playhead, StateHistory,
    StateSnapshot, Topology,
};
use serde::Serialize;

use crate::reconciler::ReconcilerStatus;
use crate::sequencer::{LaneItem, TimelineQueues};
use crate::transfer::{glyph_radius, message_path, message_progress, GlyphPath, TransferGlyph};

/// Everything the views read, borrowed from the controller after a mutation.
#[derive(Debug, Clone, Copy)]
pub struct Scene<'a> {
    pub status: &'a ReconcilerStatus,
    pub log: &'a EventLog,
    pub topology: &'a Topology,
    pub states: &'a StateHistory,
    pub instance: Option<&'a str>,
    pub timeline: &'a TimelineQueues,
    pub cursor: f64,
    pub transfers: &'a [TransferGlyph],
    pub indicators: &'a BTreeMap<(String, String), i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeIndicator {
    pub from: String,
    pub to: String,
    pub count: i64,
}

/// A message in flight between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageGlyph {
    pub id: MessageId,
    pub from: String,
    pub to: String,
    pub path: GlyphPath,
    /// Grows out of the sender and shrinks into the receiver.
    pub radius: f64,
    pub color: Option<String>,
    pub lost: bool,
    pub selected: bool,
}

impl MessageGlyph {
    /// `None` when either endpoint has no node.
    pub fn new(event: &MessageEvent, time: f64) -> Option<Self> {
        Some(Self {
            id: event.id.clone(),
            from: event.source.node_id()?,
            to: event.target.node_id()?,
            path: message_path(event, time),
            radius: glyph_radius(message_progress(event, time)),
            color: event.color.clone(),
            lost: event.is_lost,
            selected: event.selected,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphFrame {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<(String, String)>,
    pub indicators: Vec<EdgeIndicator>,
    pub messages: Vec<MessageGlyph>,
    pub transfers: Vec<TransferGlyph>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwimlaneFrame {
    /// Process lanes, `node/process`
    pub lanes: Vec<String>,
    pub past: Vec<LaneItem>,
    pub current: Vec<LaneItem>,
    pub future: Vec<LaneItem>,
    pub cursor: f64,
    /// Signed count of queued single steps
    pub step_indicator: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailCard {
    pub time: u64,
    pub event: MessageEvent,
    pub placement: Placement,
    pub selected: bool,
    pub editable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailFrame {
    pub playhead: Playhead,
    pub backend: LogicalClock,
    pub cards: Vec<DetailCard>,
    pub states: StateSnapshot,
    pub instances: Vec<String>,
    pub selected_instance: Option<String>,
}

/// One render of all views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderFrame {
    pub status: ReconcilerStatus,
    pub graph: GraphFrame,
    pub swimlane: SwimlaneFrame,
    pub detail: DetailFrame,
}

impl RenderFrame {
    pub fn build(scene: &Scene<'_>) -> Self {
        Self {
            status: scene.status.clone(),
            graph: GraphFrame::build(scene),
            swimlane: SwimlaneFrame::build(scene),
            detail: DetailFrame::build(scene),
        }
    }
}

impl GraphFrame {
    pub fn build(scene: &Scene<'_>) -> Self {
        let playhead = scene.status.playhead;
        let colors = scene
            .instance
            .map(|instance| scene.states.node_colors_at(playhead, instance))
            .unwrap_or_default();

        let nodes = scene
            .topology
            .nodes
            .iter()
            .map(|id| GraphNode {
                id: id.clone(),
                color: colors.get(id).cloned(),
            })
            .collect();

        let indicators = scene
            .indicators
            .iter()
            .map(|((from, to), count)| EdgeIndicator {
                from: from.clone(),
                to: to.clone(),
                count: *count,
            })
            .collect();

        let messages = scene
            .log
            .classify_all(playhead, scene.status.backend)
            .into_iter()
            .filter(|c| c.created && c.placement != Placement::Past)
            .filter_map(|c| MessageGlyph::new(c.event, playhead.time))
            .collect();

        Self {
            nodes,
            edges: scene.topology.edges.clone(),
            indicators,
            messages,
            transfers: scene.transfers.to_vec(),
        }
    }
}

impl SwimlaneFrame {
    pub fn build(scene: &Scene<'_>) -> Self {
        let lanes: BTreeSet<String> = scene
            .log
            .iter()
            .flat_map(|(_, _, e)| [e.source.process_address(), e.target.process_address()])
            .flatten()
            .map(|a| a.to_string())
            .collect();

        Self {
            lanes: lanes.into_iter().collect(),
            past: scene.timeline.past.clone(),
            current: scene.timeline.current.clone(),
            future: scene.timeline.future.iter().cloned().collect(),
            cursor: scene.cursor,
            step_indicator: scene.status.step_counter,
        }
    }
}

impl DetailFrame {
    pub fn build(scene: &Scene<'_>) -> Self {
        let status = scene.status;
        let cards = scene
            .log
            .classify_all(status.playhead, status.backend)
            .into_iter()
            .filter(|c| c.is_shown())
            .map(|c| DetailCard {
                time: c.time,
                event: c.event.clone(),
                placement: c.placement,
                selected: c.event.selected,
                editable: status.can_edit(c.event),
            })
            .collect();

        Self {
            playhead: status.playhead,
            backend: status.backend,
            cards,
            states: scene.states.snapshot_at(status.playhead),
            instances: scene.states.instances(),
            selected_instance: scene.instance.map(str::to_string),
        }
    }
}

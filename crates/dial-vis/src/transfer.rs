//! Message glyphs travelling along graph edges.
//!
//! A discrete step animates the consumed message arriving (second half of
//! its edge) and each produced message leaving (first half). Undoing a step
//! plays the same halves in reverse. Any number of transfers may run
//! concurrently.

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use dial_model::{MessageEvent, MessageId, Topology, TransitionMessage};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::error::AnimationError;
use crate::sequencer::Completion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    /// Message reaching its target
    Receive,
    /// Message leaving its source
    Emit,
}

/// A transfer glyph as drawn on the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferGlyph {
    pub id: MessageId,
    pub from: String,
    pub to: String,
    pub kind: TransferKind,
    pub reverse: bool,
    /// Fraction of the edge from `from` to `to`
    pub position: f64,
    pub radius: f64,
    pub color: Option<String>,
}

#[derive(Debug)]
struct Transfer {
    message: TransitionMessage,
    from: String,
    to: String,
    kind: TransferKind,
    reverse: bool,
    started: Instant,
    progress: f64,
    done: Option<oneshot::Sender<Result<(), AnimationError>>>,
}

impl Transfer {
    /// Completing this transfer adds a pending message to its edge.
    fn adds_on_completion(&self) -> bool {
        matches!(
            (self.kind, self.reverse),
            (TransferKind::Emit, false) | (TransferKind::Receive, true)
        )
    }
}

/// Concurrent edge transfers plus per-edge pending counters.
#[derive(Debug)]
pub struct TransferAnimations {
    speed: f64,
    topology: Topology,
    active: Vec<Transfer>,
    indicators: BTreeMap<(String, String), i64>,
}

impl TransferAnimations {
    /// `speed` is in progress units per second.
    pub fn new(speed: f64) -> Self {
        Self {
            speed,
            topology: Topology::default(),
            active: Vec::new(),
            indicators: BTreeMap::new(),
        }
    }

    pub fn set_topology(&mut self, topology: Topology) {
        self.topology = topology;
        self.indicators.clear();
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Recount pending messages per directed edge.
    pub fn reset_indicators<'a>(&mut self, pending: impl IntoIterator<Item = &'a MessageEvent>) {
        self.indicators.clear();
        for event in pending {
            if let (Some(from), Some(to)) = (event.source.node_id(), event.target.node_id()) {
                if from != to {
                    *self.indicators.entry((from, to)).or_insert(0) += 1;
                }
            }
        }
    }

    /// Pending message count per directed `(from, to)` edge.
    pub fn indicators(&self) -> &BTreeMap<(String, String), i64> {
        &self.indicators
    }

    /// Start animating `message`. Resolves when the glyph reaches the end of
    /// its half edge, or immediately with `UnknownEdge` when the topology has
    /// no such edge.
    pub fn start(
        &mut self,
        message: &TransitionMessage,
        kind: TransferKind,
        reverse: bool,
        now: Instant,
    ) -> Completion {
        let (from, to) = match (message.source.node_id(), message.target.node_id()) {
            (Some(from), Some(to)) => (from, to),
            _ => {
                return Completion::ready(Err(AnimationError::UnknownEdge {
                    from: message.source.to_string(),
                    to: message.target.to_string(),
                }))
            }
        };
        if from != to && !self.topology.has_edge(&from, &to) {
            debug!(%from, %to, id = %message.id, "no edge for transfer");
            return Completion::ready(Err(AnimationError::UnknownEdge { from, to }));
        }

        let (done, completion) = Completion::channel();
        let transfer = Transfer {
            message: message.clone(),
            from,
            to,
            kind,
            reverse,
            started: now,
            progress: 0.0,
            done: Some(done),
        };
        if !transfer.adds_on_completion() {
            self.bump(&transfer.from, &transfer.to, -1);
        }
        self.active.push(transfer);
        completion
    }

    /// Move every transfer to `now`, resolving the finished ones.
    pub fn advance(&mut self, now: Instant) {
        let speed = self.speed;
        let mut finished = Vec::new();
        for transfer in &mut self.active {
            let elapsed = now.saturating_duration_since(transfer.started).as_secs_f64();
            transfer.progress = (elapsed * speed).min(1.0);
            if transfer.progress >= 1.0 {
                finished.push((
                    transfer.from.clone(),
                    transfer.to.clone(),
                    transfer.adds_on_completion(),
                    transfer.done.take(),
                ));
            }
        }
        self.active.retain(|t| t.progress < 1.0);

        for (from, to, adds, done) in finished {
            if adds {
                self.bump(&from, &to, 1);
            }
            if let Some(done) = done {
                let _ = done.send(Ok(()));
            }
        }
    }

    fn bump(&mut self, from: &str, to: &str, delta: i64) {
        if from == to {
            return;
        }
        let count = self
            .indicators
            .entry((from.to_string(), to.to_string()))
            .or_insert(0);
        *count = (*count + delta).max(0);
    }

    pub fn is_busy(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn glyphs(&self) -> Vec<TransferGlyph> {
        self.active
            .iter()
            .map(|t| TransferGlyph {
                id: t.message.id.clone(),
                from: t.from.clone(),
                to: t.to.clone(),
                kind: t.kind,
                reverse: t.reverse,
                position: glyph_position(t.kind, t.reverse, t.progress),
                radius: glyph_radius(t.progress),
                color: t.message.color.clone(),
            })
            .collect()
    }
}

/// Position along the edge for a transfer at `progress`.
pub fn glyph_position(kind: TransferKind, reverse: bool, progress: f64) -> f64 {
    let p = if reverse { 1.0 - progress } else { progress };
    match kind {
        TransferKind::Receive => 0.5 + p * 0.5,
        TransferKind::Emit => p * 0.5,
    }
}

/// Glyphs grow in over the first tenth and shrink out over the last.
pub fn glyph_radius(progress: f64) -> f64 {
    if progress < 0.1 {
        100.0 * progress
    } else if progress > 0.9 {
        100.0 * (1.0 - progress)
    } else {
        10.0
    }
}

/// Where an in-flight message is drawn between its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GlyphPath {
    Straight { fraction: f64 },
    /// Self-messages circle back to their node
    Loop { angle: f64 },
}

/// Travelled fraction of a message at continuous time `time`. Lost messages
/// stall at half distance.
pub fn message_progress(event: &MessageEvent, time: f64) -> f64 {
    let emit = event.emit_time as f64;
    let fraction = match event.arrival_time {
        Some(arrival) if arrival as f64 > emit => {
            ((time - emit) / (arrival as f64 - emit)).clamp(0.0, 1.0)
        }
        Some(_) if time >= emit => 1.0,
        _ => 0.0,
    };
    if event.is_lost {
        fraction * 0.5
    } else {
        fraction
    }
}

pub fn message_path(event: &MessageEvent, time: f64) -> GlyphPath {
    let fraction = message_progress(event, time);
    if event.loops_back() {
        GlyphPath::Loop {
            angle: fraction * TAU,
        }
    } else {
        GlyphPath::Straight { fraction }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dial_model::Address;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn transition(id: &str, source: &str, target: &str) -> TransitionMessage {
        TransitionMessage {
            id: id.into(),
            source: addr(source),
            target: addr(target),
            color: None,
        }
    }

    fn animations() -> TransferAnimations {
        let mut animations = TransferAnimations::new(0.2);
        animations.set_topology(Topology {
            nodes: vec!["A".into(), "B".into()],
            edges: vec![("A".into(), "B".into())],
        });
        animations
    }

    fn count(animations: &TransferAnimations, from: &str, to: &str) -> i64 {
        animations
            .indicators()
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .unwrap_or(0)
    }

    #[test]
    fn receive_decrements_at_start() {
        let mut animations = animations();
        let pending = MessageEvent::new("m1", addr("A/p"), addr("B/p"), 0);
        animations.reset_indicators([&pending]);
        assert_eq!(count(&animations, "A", "B"), 1);

        let t0 = Instant::now();
        let mut receive = task::spawn(animations.start(
            &transition("m1", "A/p", "B/p"),
            TransferKind::Receive,
            false,
            t0,
        ));
        assert_eq!(count(&animations, "A", "B"), 0);

        animations.advance(t0 + Duration::from_millis(2500));
        assert_pending!(receive.poll());
        let glyph = &animations.glyphs()[0];
        assert!((glyph.position - 0.75).abs() < 1e-9);
        assert_eq!(glyph.radius, 10.0);

        animations.advance(t0 + Duration::from_secs(6));
        assert_ready_eq!(receive.poll(), Ok(()));
        assert!(!animations.is_busy());
    }

    #[test]
    fn emit_increments_on_completion() {
        let mut animations = animations();
        let t0 = Instant::now();
        let mut emit = task::spawn(animations.start(
            &transition("m2", "B/p", "A/p"),
            TransferKind::Emit,
            false,
            t0,
        ));
        assert_eq!(count(&animations, "B", "A"), 0);

        animations.advance(t0 + Duration::from_secs(6));
        assert_ready_eq!(emit.poll(), Ok(()));
        assert_eq!(count(&animations, "B", "A"), 1);
    }

    #[test]
    fn reverse_mirrors_indicator_updates() {
        let mut animations = animations();
        let pending = MessageEvent::new("m2", addr("A/p"), addr("B/p"), 0);
        animations.reset_indicators([&pending]);

        let t0 = Instant::now();
        let _emit = animations.start(&transition("m2", "A/p", "B/p"), TransferKind::Emit, true, t0);
        assert_eq!(count(&animations, "A", "B"), 0);
        let _receive =
            animations.start(&transition("m1", "A/p", "B/p"), TransferKind::Receive, true, t0);
        assert_eq!(animations.glyphs()[1].position, 1.0);

        animations.advance(t0 + Duration::from_secs(6));
        assert_eq!(count(&animations, "A", "B"), 1);
    }

    #[test]
    fn unknown_edge_rejects() {
        let mut animations = animations();
        let mut transfer = task::spawn(animations.start(
            &transition("m1", "A/p", "C/p"),
            TransferKind::Receive,
            false,
            Instant::now(),
        ));
        assert_ready_eq!(
            transfer.poll(),
            Err(AnimationError::UnknownEdge {
                from: "A".into(),
                to: "C".into()
            })
        );
        assert!(!animations.is_busy());
    }

    #[test]
    fn self_transfer_needs_no_edge() {
        let mut animations = animations();
        let _loop = animations.start(
            &transition("m1", "A/p", "A/q"),
            TransferKind::Emit,
            false,
            Instant::now(),
        );
        assert!(animations.is_busy());
    }

    #[test]
    fn glyph_geometry() {
        assert_eq!(glyph_position(TransferKind::Emit, false, 0.0), 0.0);
        assert_eq!(glyph_position(TransferKind::Emit, false, 1.0), 0.5);
        assert_eq!(glyph_position(TransferKind::Receive, false, 0.0), 0.5);
        assert_eq!(glyph_position(TransferKind::Receive, true, 0.0), 1.0);
        assert_eq!(glyph_position(TransferKind::Emit, true, 1.0), 0.0);

        assert!((glyph_radius(0.05) - 5.0).abs() < 1e-9);
        assert_eq!(glyph_radius(0.5), 10.0);
        assert!((glyph_radius(0.95) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn lost_message_stalls_at_half() {
        let lost = MessageEvent::new("m1", addr("A/p"), addr("B/p"), 0)
            .with_arrival(2, 0)
            .lost();
        assert_eq!(message_progress(&lost, 1.0), 0.25);
        assert_eq!(message_progress(&lost, 5.0), 0.5);

        let normal = MessageEvent::new("m2", addr("A/p"), addr("B/p"), 0).with_arrival(2, 0);
        assert_eq!(message_progress(&normal, 1.0), 0.5);
        assert_eq!(message_progress(&normal, -1.0), 0.0);
        assert_eq!(message_path(&normal, 2.0), GlyphPath::Straight { fraction: 1.0 });
    }

    #[test]
    fn self_message_loops() {
        let looped = MessageEvent::new("m1", addr("A/p"), addr("A/p"), 0).with_arrival(4, 0);
        match message_path(&looped, 2.0) {
            GlyphPath::Loop { angle } => assert!((angle - TAU / 2.0).abs() < 1e-9),
            other => panic!("expected loop, got {other:?}"),
        }
    }
}

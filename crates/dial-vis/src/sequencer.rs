//! Timeline cursor sweeps.
//!
//! Sweeps run strictly one at a time in submission order. Each sweep's
//! duration depends only on its length and the configured speed, never on
//! the frame rate. Starting and finishing a sweep moves swimlane items
//! between the future, current and past queues.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use dial_model::{Address, MessageEvent, MessageId, Partition, TransitionMessage};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{trace, warn};

use crate::error::AnimationError;

/// Resolves when an animation finishes.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Result<(), AnimationError>>,
}

impl Completion {
    pub(crate) fn channel() -> (oneshot::Sender<Result<(), AnimationError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// An already-finished animation.
    pub(crate) fn ready(result: Result<(), AnimationError>) -> Self {
        let (tx, completion) = Self::channel();
        let _ = tx.send(result);
        completion
    }
}

impl Future for Completion {
    type Output = Result<(), AnimationError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(AnimationError::Dropped)))
    }
}

/// One swimlane entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaneItem {
    pub id: MessageId,
    pub source: Address,
    pub target: Address,
    pub color: Option<String>,
    pub title: Option<String>,
    pub lost: bool,
    pub selected: bool,
}

impl From<&MessageEvent> for LaneItem {
    fn from(event: &MessageEvent) -> Self {
        Self {
            id: event.id.clone(),
            source: event.source.clone(),
            target: event.target.clone(),
            color: event.color.clone(),
            title: event.title.clone(),
            lost: event.is_lost,
            selected: event.selected,
        }
    }
}

impl From<&TransitionMessage> for LaneItem {
    fn from(message: &TransitionMessage) -> Self {
        Self {
            id: message.id.clone(),
            source: message.source.clone(),
            target: message.target.clone(),
            color: message.color.clone(),
            title: None,
            lost: false,
            selected: false,
        }
    }
}

/// Swimlane display queues.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimelineQueues {
    pub past: Vec<LaneItem>,
    pub current: Vec<LaneItem>,
    pub future: VecDeque<LaneItem>,
}

impl TimelineQueues {
    /// Rebuild from a partition. Future items follow `order` where listed.
    pub fn sync(&mut self, partition: &Partition<'_>, order: &[MessageId]) {
        self.past = partition.past.iter().map(|e| LaneItem::from(*e)).collect();
        self.current = partition.current.iter().map(|e| LaneItem::from(*e)).collect();
        self.future = partition.future.iter().map(|e| LaneItem::from(*e)).collect();
        self.reorder_future(order);
    }

    /// Stable-sort future items by their position in `order`. Unlisted items
    /// keep their relative order after the listed ones.
    pub fn reorder_future(&mut self, order: &[MessageId]) {
        let rank = |id: &MessageId| order.iter().position(|o| o == id).unwrap_or(usize::MAX);
        self.future
            .make_contiguous()
            .sort_by_key(|item| rank(&item.id));
    }

    pub fn push_future(&mut self, item: LaneItem) {
        if !self.contains(&item.id) {
            self.future.push_back(item);
        }
    }

    /// Remove an item from whichever queue holds it.
    pub fn remove(&mut self, id: &MessageId) -> Option<LaneItem> {
        if let Some(pos) = self.future.iter().position(|i| &i.id == id) {
            return self.future.remove(pos);
        }
        if let Some(pos) = self.current.iter().position(|i| &i.id == id) {
            return Some(self.current.remove(pos));
        }
        let pos = self.past.iter().position(|i| &i.id == id)?;
        Some(self.past.remove(pos))
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.past
            .iter()
            .chain(self.current.iter())
            .chain(self.future.iter())
            .any(|i| &i.id == id)
    }

    fn promote_future(&mut self) {
        if let Some(item) = self.future.pop_front() {
            self.current.push(item);
        }
    }

    fn retire_current(&mut self) {
        if !self.current.is_empty() {
            let item = self.current.remove(0);
            self.past.push(item);
        }
    }

    fn restore_past(&mut self) {
        if let Some(item) = self.past.pop() {
            self.current.push(item);
        }
    }

    fn demote_current(&mut self) {
        if let Some(item) = self.current.pop() {
            self.future.push_front(item);
        }
    }
}

#[derive(Debug)]
struct Pending {
    start: f64,
    end: f64,
    done: oneshot::Sender<Result<(), AnimationError>>,
}

#[derive(Debug)]
struct Active {
    start: f64,
    end: f64,
    started: Instant,
    done: oneshot::Sender<Result<(), AnimationError>>,
}

/// FIFO queue of cursor sweeps over `[0, 1]`.
#[derive(Debug)]
pub struct AnimationSequencer {
    speed: f64,
    queue: VecDeque<Pending>,
    active: Option<Active>,
    cursor: f64,
    timeline: TimelineQueues,
}

impl AnimationSequencer {
    /// `speed` is in cursor units per second.
    pub fn new(speed: f64) -> Self {
        Self {
            speed,
            queue: VecDeque::new(),
            active: None,
            cursor: 0.0,
            timeline: TimelineQueues::default(),
        }
    }

    /// Queue a sweep from `start` to `end`. Invalid intervals are logged and
    /// resolve immediately with an error.
    pub fn enqueue(&mut self, start: f64, end: f64) -> Completion {
        let in_range = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_range(start) || !in_range(end) || start == end {
            warn!(start, end, "rejecting sweep");
            return Completion::ready(Err(AnimationError::InvalidInterval { start, end }));
        }

        let (done, completion) = Completion::channel();
        self.queue.push_back(Pending { start, end, done });
        completion
    }

    /// Drive the active sweep to `now`. At most one sweep starts or
    /// finishes per call.
    pub fn advance(&mut self, now: Instant) {
        if self.active.is_none() {
            let Some(next) = self.queue.pop_front() else {
                return;
            };
            self.begin(next, now);
        }

        let Some(active) = &self.active else {
            return;
        };
        let span = (active.end - active.start).abs();
        let travelled = now.saturating_duration_since(active.started).as_secs_f64() * self.speed;

        if travelled < span {
            self.cursor = active.start + travelled * (active.end - active.start).signum();
            return;
        }

        if let Some(active) = self.active.take() {
            self.cursor = active.end;
            self.finish(&active);
            trace!(start = active.start, end = active.end, "sweep finished");
            let _ = active.done.send(Ok(()));
        }
    }

    fn begin(&mut self, pending: Pending, now: Instant) {
        trace!(start = pending.start, end = pending.end, "sweep started");
        let forward = pending.end > pending.start;
        if forward && pending.start == 0.0 {
            self.timeline.promote_future();
        } else if !forward && pending.start == 1.0 {
            self.timeline.restore_past();
        }
        self.cursor = pending.start;
        self.active = Some(Active {
            start: pending.start,
            end: pending.end,
            started: now,
            done: pending.done,
        });
    }

    fn finish(&mut self, active: &Active) {
        let forward = active.end > active.start;
        if forward && active.end == 1.0 {
            self.timeline.retire_current();
        } else if !forward && active.end == 0.0 {
            self.timeline.demote_current();
        }
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Active plus queued sweeps.
    pub fn pending(&self) -> usize {
        self.queue.len() + usize::from(self.active.is_some())
    }

    pub fn is_busy(&self) -> bool {
        self.pending() > 0
    }

    pub fn timeline(&self) -> &TimelineQueues {
        &self.timeline
    }

    pub fn timeline_mut(&mut self) -> &mut TimelineQueues {
        &mut self.timeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dial_model::EventLog;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn item(id: &str) -> LaneItem {
        let a: Address = "A/p".parse().unwrap();
        let b: Address = "B/p".parse().unwrap();
        LaneItem::from(&MessageEvent::new(id, a, b, 0))
    }

    fn ids(items: impl IntoIterator<Item = LaneItem>) -> Vec<String> {
        items.into_iter().map(|i| i.id.0).collect()
    }

    #[test]
    fn sweeps_run_fifo() {
        let mut seq = AnimationSequencer::new(5.0);
        let t0 = Instant::now();
        let mut first = task::spawn(seq.enqueue(0.0, 0.5));
        let mut second = task::spawn(seq.enqueue(0.5, 1.0));
        assert_eq!(seq.pending(), 2);

        seq.advance(t0);
        assert_pending!(first.poll());
        seq.advance(t0 + Duration::from_millis(50));
        assert!(close(seq.cursor(), 0.25));

        seq.advance(t0 + Duration::from_millis(150));
        assert_ready_eq!(first.poll(), Ok(()));
        assert!(close(seq.cursor(), 0.5));
        // The second sweep has not started moving yet.
        assert_pending!(second.poll());
        assert_eq!(seq.pending(), 1);

        let t1 = t0 + Duration::from_millis(200);
        seq.advance(t1);
        assert!(close(seq.cursor(), 0.5));
        seq.advance(t1 + Duration::from_millis(60));
        assert!(close(seq.cursor(), 0.8));
        assert_pending!(second.poll());

        seq.advance(t1 + Duration::from_millis(120));
        assert_ready_eq!(second.poll(), Ok(()));
        assert!(!seq.is_busy());
    }

    #[test]
    fn duration_ignores_frame_rate() {
        let mut seq = AnimationSequencer::new(5.0);
        let t0 = Instant::now();
        let mut sweep = task::spawn(seq.enqueue(1.0, 0.0));
        seq.advance(t0);
        // One huge frame finishes the whole sweep.
        seq.advance(t0 + Duration::from_secs(1));
        assert_ready_eq!(sweep.poll(), Ok(()));
        assert_eq!(seq.cursor(), 0.0);
    }

    #[test]
    fn invalid_intervals_resolve_with_error() {
        let mut seq = AnimationSequencer::new(5.0);
        for (start, end) in [(0.5, 0.5), (-0.1, 0.5), (0.0, 1.5), (f64::NAN, 1.0)] {
            let mut sweep = task::spawn(seq.enqueue(start, end));
            assert!(matches!(
                sweep.poll(),
                Poll::Ready(Err(AnimationError::InvalidInterval { .. }))
            ));
        }
        assert!(!seq.is_busy());
    }

    #[test]
    fn dropped_sequencer_rejects_pending() {
        let mut seq = AnimationSequencer::new(5.0);
        let mut sweep = task::spawn(seq.enqueue(0.0, 1.0));
        drop(seq);
        assert_ready_eq!(sweep.poll(), Err(AnimationError::Dropped));
    }

    #[test]
    fn forward_sweeps_move_items_to_past() {
        let mut seq = AnimationSequencer::new(5.0);
        seq.timeline_mut().push_future(item("m1"));
        seq.timeline_mut().push_future(item("m2"));

        let t0 = Instant::now();
        let _first = seq.enqueue(0.0, 0.5);
        let _second = seq.enqueue(0.5, 1.0);

        seq.advance(t0);
        assert_eq!(ids(seq.timeline().current.clone()), ["m1"]);
        assert_eq!(ids(seq.timeline().future.clone()), ["m2"]);

        seq.advance(t0 + Duration::from_secs(1));
        seq.advance(t0 + Duration::from_secs(2));
        seq.advance(t0 + Duration::from_secs(3));
        assert_eq!(ids(seq.timeline().past.clone()), ["m1"]);
        assert!(seq.timeline().current.is_empty());
    }

    #[test]
    fn backward_sweeps_restore_future() {
        let mut seq = AnimationSequencer::new(5.0);
        seq.timeline_mut().past.push(item("m1"));
        seq.timeline_mut().push_future(item("m2"));

        let t0 = Instant::now();
        let _first = seq.enqueue(1.0, 0.5);
        let _second = seq.enqueue(0.5, 0.0);
        seq.advance(t0);
        assert_eq!(ids(seq.timeline().current.clone()), ["m1"]);

        seq.advance(t0 + Duration::from_secs(1));
        seq.advance(t0 + Duration::from_secs(2));
        seq.advance(t0 + Duration::from_secs(3));
        assert_eq!(ids(seq.timeline().future.clone()), ["m1", "m2"]);
        assert!(seq.timeline().past.is_empty());
    }

    #[test]
    fn sync_follows_reorder() {
        let a: Address = "A/p".parse().unwrap();
        let b: Address = "B/p".parse().unwrap();
        let log = EventLog::from_buckets(BTreeMap::from([(
            3,
            vec![
                MessageEvent::new("m1", a.clone(), b.clone(), 1).with_arrival(3, 0),
                MessageEvent::new("m2", a.clone(), b.clone(), 1).with_arrival(3, 1),
                MessageEvent::new("m3", a, b, 1).with_arrival(3, 2),
            ],
        )]));
        let partition = log.visible_at(
            dial_model::Playhead::at(1, 0),
            dial_model::LogicalClock::UNSET,
        );

        let mut timeline = TimelineQueues::default();
        timeline.sync(&partition, &[MessageId::from("m3"), MessageId::from("m1")]);
        assert_eq!(ids(timeline.future.clone()), ["m3", "m1", "m2"]);

        assert!(timeline.remove(&"m1".into()).is_some());
        assert!(!timeline.contains(&"m1".into()));
        assert!(timeline.remove(&"m1".into()).is_none());
    }
}

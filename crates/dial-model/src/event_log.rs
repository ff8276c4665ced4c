//! The backend-authoritative message log and its past/current/future split.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::clock::{LogicalClock, Playhead};
use crate::message::{MessageEvent, MessageId};

/// Where an event sits relative to the playhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Delivered before the playhead.
    Past,
    /// Processed by the backend but not yet reached by the playhead.
    Current,
    /// Not yet processed.
    Future,
}

/// An event with its placement at a given clock.
#[derive(Debug, Clone, Serialize)]
pub struct Classified<'a> {
    /// Bucket key (arrival time).
    pub time: u64,
    /// Position inside the bucket.
    pub index: usize,
    pub event: &'a MessageEvent,
    pub placement: Placement,
    /// Whether the event has been emitted at the playhead.
    pub created: bool,
}

impl Classified<'_> {
    /// Whether views should draw this event at all.
    pub fn is_shown(&self) -> bool {
        self.created || self.event.parent.is_none()
    }
}

/// Shown events split into the three display queues.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Partition<'a> {
    pub past: Vec<&'a MessageEvent>,
    pub current: Vec<&'a MessageEvent>,
    pub future: Vec<&'a MessageEvent>,
}

impl Partition<'_> {
    pub fn len(&self) -> usize {
        self.past.len() + self.current.len() + self.future.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mapping from integer arrival-time bucket to the ordered events of that
/// bucket. Bucket keys always mirror the last `messages` snapshot.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    buckets: BTreeMap<u64, Vec<MessageEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_buckets(buckets: BTreeMap<u64, Vec<MessageEvent>>) -> Self {
        Self { buckets }
    }

    /// Swap in a fresh snapshot. Selection survives by id.
    pub fn replace_all(&mut self, buckets: BTreeMap<u64, Vec<MessageEvent>>) {
        let selected: Vec<MessageId> = self
            .iter()
            .filter(|(_, _, e)| e.selected)
            .map(|(_, _, e)| e.id.clone())
            .collect();
        self.buckets = buckets;
        for id in selected {
            if let Some(event) = self.get_mut(&id) {
                event.selected = true;
            }
        }
    }

    /// Append an event to a bucket.
    pub fn insert(&mut self, time: u64, event: MessageEvent) {
        self.buckets.entry(time).or_default().push(event);
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn buckets(&self) -> &BTreeMap<u64, Vec<MessageEvent>> {
        &self.buckets
    }

    /// Events in bucket order, then insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, usize, &MessageEvent)> {
        self.buckets.iter().flat_map(|(time, events)| {
            events
                .iter()
                .enumerate()
                .map(move |(index, event)| (*time, index, event))
        })
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(Vec::is_empty)
    }

    pub fn get(&self, id: &MessageId) -> Option<&MessageEvent> {
        self.iter().map(|(_, _, e)| e).find(|e| &e.id == id)
    }

    fn get_mut(&mut self, id: &MessageId) -> Option<&mut MessageEvent> {
        self.buckets
            .values_mut()
            .flat_map(|events| events.iter_mut())
            .find(|e| &e.id == id)
    }

    /// Earliest emit time over all events.
    pub fn earliest_emit_time(&self) -> Option<u64> {
        self.iter().map(|(_, _, e)| e.emit_time).min()
    }

    /// Latest arrival bucket.
    pub fn last_bucket(&self) -> Option<u64> {
        self.buckets.keys().next_back().copied()
    }

    /// Select exactly one event. Returns false when the id is unknown.
    pub fn select(&mut self, id: &MessageId) -> bool {
        self.clear_selection();
        match self.get_mut(id) {
            Some(event) => {
                event.selected = true;
                true
            }
            None => false,
        }
    }

    /// Select the event at bucket `clock.time`, index `clock.theta`.
    pub fn select_at(&mut self, clock: LogicalClock) -> Option<MessageId> {
        self.clear_selection();
        let time = clock.time?;
        let index = usize::try_from(clock.theta.unwrap_or(0)).ok()?;
        let event = self.buckets.get_mut(&time)?.get_mut(index)?;
        event.selected = true;
        Some(event.id.clone())
    }

    pub fn clear_selection(&mut self) {
        for event in self.buckets.values_mut().flat_map(|v| v.iter_mut()) {
            event.selected = false;
        }
    }

    pub fn selected(&self) -> Option<&MessageEvent> {
        self.iter().map(|(_, _, e)| e).find(|e| e.selected)
    }

    /// Events the backend has not processed yet, in arrival order.
    pub fn pending(&self, backend: LogicalClock) -> Vec<MessageId> {
        let mut pending: Vec<(LogicalClock, usize, &MessageEvent)> = self
            .iter()
            .enumerate()
            .filter(|(_, (_, _, e))| !processed(e, backend))
            .map(|(order, (_, _, e))| (arrival_key(e), order, e))
            .collect();
        pending.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        pending.into_iter().map(|(_, _, e)| e.id.clone()).collect()
    }

    /// Classify every event. Each event receives exactly one placement.
    pub fn classify_all(&self, playhead: Playhead, backend: LogicalClock) -> Vec<Classified<'_>> {
        let mut first_shown_seen = false;
        self.iter()
            .map(|(time, index, event)| {
                let created = playhead.has_reached(event.emit_time, event.emit_theta);
                let shown = created || event.parent.is_none();
                let first_shown = shown && !first_shown_seen;
                if shown {
                    first_shown_seen = true;
                }

                let placement = if !created {
                    Placement::Future
                } else if was_received(event, playhead) {
                    Placement::Past
                } else if processed(event, backend) || (first_shown && backend.is_set()) {
                    Placement::Current
                } else {
                    Placement::Future
                };

                Classified {
                    time,
                    index,
                    event,
                    placement,
                    created,
                }
            })
            .collect()
    }

    /// Shown events at the playhead, split into display queues.
    pub fn visible_at(&self, playhead: Playhead, backend: LogicalClock) -> Partition<'_> {
        let mut partition = Partition::default();
        for classified in self.classify_all(playhead, backend) {
            if !classified.is_shown() {
                continue;
            }
            match classified.placement {
                Placement::Past => partition.past.push(classified.event),
                Placement::Current => partition.current.push(classified.event),
                Placement::Future => partition.future.push(classified.event),
            }
        }
        partition
    }

    /// Placement of a single event.
    pub fn placement_of(
        &self,
        id: &MessageId,
        playhead: Playhead,
        backend: LogicalClock,
    ) -> Option<Placement> {
        self.classify_all(playhead, backend)
            .into_iter()
            .find(|c| &c.event.id == id)
            .map(|c| c.placement)
    }
}

fn arrival_key(event: &MessageEvent) -> LogicalClock {
    match event.arrival_time {
        Some(_) => event.arrival_clock(),
        None => LogicalClock::at(u64::MAX, u64::MAX),
    }
}

fn was_received(event: &MessageEvent, playhead: Playhead) -> bool {
    match event.arrival_time {
        Some(time) => {
            let bucket = playhead.bucket();
            let theta = event.arrival_theta.unwrap_or(0) as f64;
            time < bucket || (time == bucket && theta <= playhead.effective_theta())
        }
        None => false,
    }
}

fn processed(event: &MessageEvent, backend: LogicalClock) -> bool {
    match event.arrival_time {
        Some(time) => backend.covers(time, event.arrival_theta.unwrap_or(0)),
        None => false,
    }
}

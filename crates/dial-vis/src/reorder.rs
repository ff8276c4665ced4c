//! Client-side ordering of pending messages.
//!
//! A new order shows immediately, then travels to the backend. Until the
//! backend acknowledges it the order is a hypothesis; a rejection restores
//! the last confirmed order.
//!
//! The backend orders every unprocessed message, but a view only shows
//! some of them (children not yet emitted at the playhead are hidden). A
//! view's order covers the shown ids; hidden ids keep their slots.

use dial_model::MessageId;
use tracing::debug;

use crate::error::ReorderError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorderQueue {
    confirmed: Vec<MessageId>,
    displayed: Vec<MessageId>,
    in_flight: Option<Vec<MessageId>>,
}

impl ReorderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the backend's pending order as confirmed. Ignored while a
    /// submission is unacknowledged so the displayed hypothesis survives.
    pub fn sync(&mut self, pending: Vec<MessageId>) {
        if self.in_flight.is_some() {
            debug!("reorder in flight, keeping displayed order");
            self.confirmed = pending;
            return;
        }
        self.displayed = pending.clone();
        self.confirmed = pending;
    }

    /// Order currently shown.
    pub fn order(&self) -> &[MessageId] {
        &self.displayed
    }

    /// Last order the backend acknowledged.
    pub fn confirmed(&self) -> &[MessageId] {
        &self.confirmed
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Show `order` and return the full list to submit.
    ///
    /// `order` must rearrange exactly the pending ids found in `visible`,
    /// the list the view was showing. `busy` is true while a step or
    /// animation is running.
    pub fn reorder(
        &mut self,
        order: Vec<MessageId>,
        visible: &[MessageId],
        busy: bool,
    ) -> Result<Vec<MessageId>, ReorderError> {
        if busy {
            return Err(ReorderError::Busy);
        }
        if self.in_flight.is_some() {
            return Err(ReorderError::InFlight);
        }
        // Shown items the backend already processed cannot move.
        let order: Vec<MessageId> = order
            .into_iter()
            .filter(|id| !visible.contains(id) || self.displayed.contains(id))
            .collect();
        let movable: Vec<MessageId> = self
            .displayed
            .iter()
            .filter(|id| visible.contains(id))
            .cloned()
            .collect();
        if !is_permutation(&order, &movable) {
            return Err(ReorderError::NotAPermutation);
        }

        let mut moved = order.into_iter();
        let merged: Vec<MessageId> = self
            .displayed
            .iter()
            .map(|id| {
                if movable.contains(id) {
                    moved.next().unwrap_or_else(|| id.clone())
                } else {
                    id.clone()
                }
            })
            .collect();

        self.displayed = merged.clone();
        self.in_flight = Some(merged.clone());
        Ok(merged)
    }

    /// The backend accepted the submitted order.
    pub fn acknowledge(&mut self) {
        if let Some(order) = self.in_flight.take() {
            self.confirmed = order;
        }
    }

    /// The backend refused the submitted order.
    pub fn reject(&mut self) {
        self.in_flight = None;
        self.displayed = self.confirmed.clone();
    }
}

fn is_permutation(a: &[MessageId], b: &[MessageId]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a: Vec<&MessageId> = a.iter().collect();
    let mut b: Vec<&MessageId> = b.iter().collect();
    a.sort();
    b.sort();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use dial_model::{Address, EventLog, LogicalClock, MessageEvent, Playhead};
    use std::collections::BTreeMap;

    fn ids(list: &[&str]) -> Vec<MessageId> {
        list.iter().map(|s| MessageId::from(*s)).collect()
    }

    #[test]
    fn reorder_shows_immediately() {
        let all = ids(&["m1", "m2"]);
        let mut queue = ReorderQueue::new();
        queue.sync(all.clone());

        let submitted = queue.reorder(ids(&["m2", "m1"]), &all, false).unwrap();
        assert_eq!(submitted, ids(&["m2", "m1"]));
        assert_eq!(queue.order(), ids(&["m2", "m1"]).as_slice());
        assert_eq!(queue.confirmed(), ids(&["m1", "m2"]).as_slice());
        assert!(queue.is_in_flight());

        queue.acknowledge();
        assert_eq!(queue.confirmed(), ids(&["m2", "m1"]).as_slice());
    }

    #[test]
    fn rejection_rolls_back() {
        let all = ids(&["m1", "m2"]);
        let mut queue = ReorderQueue::new();
        queue.sync(all.clone());
        queue.reorder(ids(&["m2", "m1"]), &all, false).unwrap();
        queue.reject();
        assert_eq!(queue.order(), ids(&["m1", "m2"]).as_slice());
        assert!(!queue.is_in_flight());
    }

    #[test]
    fn same_order_twice_keeps_identity() {
        let all = ids(&["m1", "m2", "m3"]);
        let mut queue = ReorderQueue::new();
        queue.sync(all.clone());
        let order = ids(&["m3", "m1", "m2"]);

        queue.reorder(order.clone(), &all, false).unwrap();
        queue.acknowledge();
        queue.reorder(order.clone(), &all, false).unwrap();
        queue.acknowledge();
        assert_eq!(queue.order(), order.as_slice());
        assert_eq!(queue.confirmed(), order.as_slice());
    }

    #[test]
    fn refuses_invalid_requests() {
        let all = ids(&["m1", "m2"]);
        let mut queue = ReorderQueue::new();
        queue.sync(all.clone());

        assert_eq!(
            queue.reorder(ids(&["m2", "m1"]), &all, true),
            Err(ReorderError::Busy)
        );
        assert_eq!(
            queue.reorder(ids(&["m2", "m3"]), &all, false),
            Err(ReorderError::NotAPermutation)
        );
        assert_eq!(
            queue.reorder(ids(&["m1"]), &all, false),
            Err(ReorderError::NotAPermutation)
        );

        queue.reorder(ids(&["m2", "m1"]), &all, false).unwrap();
        assert_eq!(
            queue.reorder(ids(&["m1", "m2"]), &all, false),
            Err(ReorderError::InFlight)
        );
    }

    #[test]
    fn sync_during_flight_keeps_hypothesis() {
        let all = ids(&["m1", "m2"]);
        let mut queue = ReorderQueue::new();
        queue.sync(all.clone());
        queue.reorder(ids(&["m2", "m1"]), &all, false).unwrap();

        queue.sync(all);
        assert_eq!(queue.order(), ids(&["m2", "m1"]).as_slice());
        queue.reject();
        assert_eq!(queue.order(), ids(&["m1", "m2"]).as_slice());
    }

    #[test]
    fn hidden_pending_messages_keep_their_slots() {
        let a: Address = "A/p".parse().unwrap();
        let b: Address = "B/p".parse().unwrap();
        let log = EventLog::from_buckets(BTreeMap::from([
            (1, vec![MessageEvent::new("m1", a.clone(), b.clone(), 0).with_arrival(1, 0)]),
            (4, vec![MessageEvent::new("m3", a.clone(), b.clone(), 0).with_arrival(4, 0)]),
            (
                5,
                vec![MessageEvent::new("m2", b.clone(), a.clone(), 2)
                    .with_arrival(5, 0)
                    .with_parent("m1")],
            ),
            (6, vec![MessageEvent::new("m4", a, b, 0).with_arrival(6, 0)]),
        ]));

        // Scrubbed back behind the backend: m2 is pending but not yet emitted.
        let backend = LogicalClock::at(2, 0);
        let playhead = Playhead::at(1, 0);
        let mut queue = ReorderQueue::new();
        queue.sync(log.pending(backend));
        assert_eq!(queue.order(), ids(&["m3", "m2", "m4"]).as_slice());

        let shown: Vec<MessageId> = log
            .visible_at(playhead, backend)
            .future
            .iter()
            .map(|e| e.id.clone())
            .collect();
        assert_eq!(shown, ids(&["m3", "m4"]));

        let submitted = queue.reorder(ids(&["m4", "m3"]), &shown, false).unwrap();
        assert_eq!(submitted, ids(&["m4", "m2", "m3"]));
        assert_eq!(queue.order(), submitted.as_slice());

        queue.reject();
        assert_eq!(queue.order(), ids(&["m3", "m2", "m4"]).as_slice());
    }
}

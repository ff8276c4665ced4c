//! Deterministic in-memory backend for tests.
//!
//! Holds a fixed schedule of messages ordered by arrival clock and a
//! position marking how many have been delivered. Every call is recorded
//! by its endpoint path so tests can assert on the exact request sequence.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dial_model::{
    LogicalClock, MessageEvent, MessageId, MessagesSnapshot, NextStep, PrevStep, StatesResponse,
    StepResponse, Topology, TransitionMessage,
};
use serde_json::{json, Value};

use crate::api::SimulatorApi;
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct MockState {
    topology: Topology,
    schedule: Vec<MessageEvent>,
    position: usize,
    states: StatesResponse,
    calls: Vec<String>,
    failures: VecDeque<Error>,
    reject_reorder: bool,
    stalled: bool,
    latency: Option<Duration>,
}

impl MockState {
    fn clock(&self) -> LogicalClock {
        match self.position {
            0 => LogicalClock::UNSET,
            n => self.schedule[n - 1].arrival_clock(),
        }
    }

    fn response(&self, steps: u64) -> StepResponse {
        let clock = self.clock();
        StepResponse {
            time: clock.time,
            theta: clock.theta,
            steps: Some(steps),
            actions: (0..steps).map(|i| json!({ "step": i })).collect(),
        }
    }

    fn children_of(&self, id: &MessageId) -> Vec<TransitionMessage> {
        self.schedule
            .iter()
            .filter(|e| e.parent.as_deref() == Some(id.as_str()))
            .map(transition)
            .collect()
    }

    fn forward(&mut self) -> bool {
        if self.position < self.schedule.len() {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn backward(&mut self) -> bool {
        if self.position > 0 {
            self.position -= 1;
            true
        } else {
            false
        }
    }

    fn current_time(&self) -> Option<u64> {
        self.clock().time
    }
}

fn transition(event: &MessageEvent) -> TransitionMessage {
    TransitionMessage {
        id: event.id.clone(),
        source: event.source.clone(),
        target: event.target.clone(),
        color: event.color.clone(),
    }
}

fn status(status: u16, body: &str) -> Error {
    Error::Status {
        status,
        body: body.to_string(),
    }
}

/// In-memory [`SimulatorApi`].
#[derive(Debug, Clone, Default)]
pub struct MockSimulator {
    state: Arc<Mutex<MockState>>,
}

impl MockSimulator {
    /// A backend delivering `schedule` in arrival-clock order.
    pub fn new(topology: Topology, schedule: Vec<MessageEvent>) -> Self {
        let mut schedule = schedule;
        schedule.sort_by_key(|e| e.arrival_clock());
        Self {
            state: Arc::new(Mutex::new(MockState {
                topology,
                schedule,
                ..MockState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn with_states(self, states: StatesResponse) -> Self {
        self.lock().states = states;
        self
    }

    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    /// Deliver the first `position` messages up front.
    #[must_use]
    pub fn at_position(self, position: usize) -> Self {
        {
            let mut state = self.lock();
            state.position = position.min(state.schedule.len());
        }
        self
    }

    /// Fail the next call with `error`.
    pub fn fail_next(&self, error: Error) {
        self.lock().failures.push_back(error);
    }

    /// Make every call hang until unstalled.
    pub fn set_stalled(&self, stalled: bool) {
        self.lock().stalled = stalled;
    }

    pub fn set_reject_reorder(&self, reject: bool) {
        self.lock().reject_reorder = reject;
    }

    /// Endpoint paths called so far.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Number of delivered messages.
    pub fn position(&self) -> usize {
        self.lock().position
    }

    pub fn clock(&self) -> LogicalClock {
        self.lock().clock()
    }

    /// Ids still pending, in delivery order.
    pub fn pending(&self) -> Vec<MessageId> {
        let state = self.lock();
        state.schedule[state.position..]
            .iter()
            .map(|e| e.id.clone())
            .collect()
    }

    async fn enter(&self, path: String) -> Result<()> {
        let (failure, latency, stalled) = {
            let mut state = self.lock();
            state.calls.push(path);
            (state.failures.pop_front(), state.latency, state.stalled)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if stalled {
            std::future::pending::<()>().await;
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl SimulatorApi for MockSimulator {
    async fn topology(&self) -> Result<Topology> {
        self.enter("topology".into()).await?;
        Ok(self.lock().topology.clone())
    }

    async fn messages(&self) -> Result<MessagesSnapshot> {
        self.enter("messages".into()).await?;
        let state = self.lock();
        let mut snapshot = MessagesSnapshot::default();
        for event in &state.schedule {
            if let Some(time) = event.arrival_time {
                snapshot.messages.entry(time).or_default().push(event.clone());
            }
        }
        let clock = state.clock();
        snapshot.time = clock.time;
        snapshot.theta = clock.theta;
        Ok(snapshot)
    }

    async fn states(&self) -> Result<StatesResponse> {
        self.enter("states".into()).await?;
        Ok(self.lock().states.clone())
    }

    async fn next(&self) -> Result<NextStep> {
        self.enter("next".into()).await?;
        let mut state = self.lock();
        let Some(consumed) = state.schedule.get(state.position).cloned() else {
            return Err(status(404, "No pending messages to consume"));
        };
        state.position += 1;
        Ok(NextStep {
            produced_messages: state.children_of(&consumed.id),
            consumed_message: transition(&consumed),
        })
    }

    async fn prev(&self) -> Result<PrevStep> {
        self.enter("prev".into()).await?;
        let mut state = self.lock();
        if state.position == 0 {
            return Err(status(404, "No previous messages"));
        }
        state.position -= 1;
        let reverted = state.schedule[state.position].clone();
        Ok(PrevStep {
            removed_messages: state.children_of(&reverted.id),
            reverted_message: transition(&reverted),
        })
    }

    async fn step_forward(&self, steps: u64) -> Result<StepResponse> {
        self.enter(format!("step-forward/{steps}")).await?;
        let mut state = self.lock();
        let mut done = 0;
        while done < steps && state.forward() {
            done += 1;
        }
        Ok(state.response(done))
    }

    async fn step_backward(&self, steps: u64) -> Result<StepResponse> {
        self.enter(format!("step-backward/{steps}")).await?;
        let mut state = self.lock();
        let mut done = 0;
        while done < steps && state.backward() {
            done += 1;
        }
        Ok(state.response(done))
    }

    async fn time_forward(&self, time: u64) -> Result<StepResponse> {
        self.enter(format!("time-forward/{time}")).await?;
        let mut state = self.lock();
        let mut done = 0;
        if state.current_time().is_none() {
            if !state.forward() {
                return Ok(state.response(0));
            }
            done += 1;
        }
        let target = state.current_time().unwrap_or(0) + time;
        while state.current_time().is_some_and(|t| t < target) && state.forward() {
            done += 1;
        }
        Ok(state.response(done))
    }

    async fn time_backward(&self, time: u64) -> Result<StepResponse> {
        self.enter(format!("time-backward/{time}")).await?;
        let mut state = self.lock();
        let Some(now) = state.current_time() else {
            return Err(status(300, "Can not move further back in time."));
        };
        let target = now.saturating_sub(time);
        let mut done = 0;
        while state.current_time().is_some_and(|t| t > target) && state.backward() {
            done += 1;
        }
        Ok(state.response(done))
    }

    async fn reorder(&self, order: &[MessageId]) -> Result<()> {
        let order = order.to_vec();
        self.enter("reorder".into()).await?;
        let mut state = self.lock();
        if state.reject_reorder {
            return Err(status(400, "reorder rejected"));
        }
        let position = state.position;
        let pending = &state.schedule[position..];
        let mut expected: Vec<&MessageId> = pending.iter().map(|e| &e.id).collect();
        let mut given: Vec<&MessageId> = order.iter().collect();
        expected.sort();
        given.sort();
        if expected != given {
            return Err(status(400, "order is not a permutation of the pending messages"));
        }

        let slots: Vec<(Option<u64>, Option<u64>)> = pending
            .iter()
            .map(|e| (e.arrival_time, e.arrival_theta))
            .collect();
        let mut reordered: Vec<MessageEvent> = order
            .iter()
            .filter_map(|id| pending.iter().find(|e| &e.id == id).cloned())
            .collect();
        for (event, (time, theta)) in reordered.iter_mut().zip(slots) {
            event.arrival_time = time;
            event.arrival_theta = theta;
        }
        state.schedule.truncate(position);
        state.schedule.extend(reordered);
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.enter("reset".into()).await?;
        self.lock().position = 0;
        Ok(())
    }

    async fn jump_to_start(&self) -> Result<()> {
        self.enter("jump_to_start".into()).await?;
        self.lock().position = 0;
        Ok(())
    }

    async fn jump_to_end(&self) -> Result<()> {
        self.enter("jump_to_end".into()).await?;
        let mut state = self.lock();
        state.position = state.schedule.len();
        Ok(())
    }

    async fn message(&self, id: &MessageId) -> Result<Value> {
        let id = id.clone();
        self.enter(format!("message/{id}")).await?;
        let state = self.lock();
        let event = state
            .schedule
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| status(404, &format!("No message with ID \"{id}\"")))?;
        Ok(serde_json::to_value(event)?)
    }

    async fn reschedule(&self, id: &MessageId, time: u64, theta: u64) -> Result<()> {
        let id = id.clone();
        self.enter(format!("reschedule/{id}/{time}/{theta}")).await?;
        let mut state = self.lock();
        let position = state.position;
        let Some(index) = state.schedule[position..].iter().position(|e| e.id == id) else {
            return Err(status(403, "message already processed"));
        };
        if state.clock() > LogicalClock::at(time, theta) {
            return Err(status(300, "Can not reschedule messages into the past."));
        }
        let event = &mut state.schedule[position + index];
        event.arrival_time = Some(time);
        event.arrival_theta = Some(theta);
        state.schedule[position..].sort_by_key(|e| e.arrival_clock());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dial_model::Address;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn mock() -> MockSimulator {
        let topology = Topology {
            nodes: vec!["A".into(), "B".into()],
            edges: vec![("A".into(), "B".into())],
        };
        MockSimulator::new(
            topology,
            vec![
                MessageEvent::new("m1", addr("A/p"), addr("B/p"), 0).with_arrival(1, 0),
                MessageEvent::new("m2", addr("B/p"), addr("A/p"), 1)
                    .with_arrival(2, 0)
                    .with_parent("m1"),
                MessageEvent::new("m3", addr("A/p"), addr("B/p"), 1).with_arrival(4, 0),
            ],
        )
    }

    #[tokio::test]
    async fn next_and_prev_walk_the_schedule() {
        let sim = mock();
        let next = sim.next().await.unwrap();
        assert_eq!(next.consumed_message.id.as_str(), "m1");
        assert_eq!(next.produced_messages.len(), 1);
        assert_eq!(sim.clock(), LogicalClock::at(1, 0));

        let prev = sim.prev().await.unwrap();
        assert_eq!(prev.reverted_message.id.as_str(), "m1");
        assert_eq!(sim.position(), 0);
        assert_eq!(sim.calls(), vec!["next", "prev"]);
    }

    #[tokio::test]
    async fn time_forward_bootstraps_then_advances() {
        let sim = mock();
        let first = sim.time_forward(1).await.unwrap();
        assert_eq!(first.clock(), LogicalClock::at(2, 0));
        assert_eq!(first.steps, Some(2));

        let rest = sim.time_forward(10).await.unwrap();
        assert_eq!(rest.clock(), LogicalClock::at(4, 0));
        let done = sim.time_forward(1).await.unwrap();
        assert!(!done.progressed());
    }

    #[tokio::test]
    async fn time_backward_requires_a_clock() {
        let sim = mock();
        assert!(sim.time_backward(1).await.is_err());
        let sim = mock().at_position(3);
        let back = sim.time_backward(1).await.unwrap();
        assert_eq!(back.clock(), LogicalClock::at(2, 0));
    }

    #[tokio::test]
    async fn reorder_keeps_arrival_slots() {
        let sim = mock().at_position(1);
        sim.reorder(&[MessageId::from("m3"), MessageId::from("m2")]).await.unwrap();
        assert_eq!(sim.pending(), vec![MessageId::from("m3"), MessageId::from("m2")]);

        let snapshot = sim.messages().await.unwrap();
        assert_eq!(snapshot.messages[&2][0].id.as_str(), "m3");

        assert!(sim.reorder(&[MessageId::from("m3")]).await.is_err());
        sim.set_reject_reorder(true);
        assert!(sim.reorder(&[MessageId::from("m2"), MessageId::from("m3")]).await.is_err());
    }

    #[tokio::test]
    async fn injected_failure_is_consumed_once() {
        let sim = mock();
        sim.fail_next(Error::Connection("down".into()));
        assert!(sim.messages().await.is_err());
        assert!(sim.messages().await.is_ok());
    }
}

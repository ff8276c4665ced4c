//! Reconciles the continuously moving playhead with the backend clock.
//!
//! The reconciler never performs I/O. Whenever it needs the backend to move
//! it hands out a [`StepTicket`]; the caller runs the request and reports
//! back through [`TimeReconciler::complete`] or [`TimeReconciler::fail`].
//! Only one ticket is outstanding at a time.

use std::collections::VecDeque;

use dial_model::{EventLog, LogicalClock, MessageEvent, MessageId, Playhead};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

/// Observable reconciler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing moves
    Idle,
    /// A backend request is in flight
    Stepping,
    /// Playhead advancing forward
    Playing,
    /// Playhead moving backward while "previous" is held
    Scrubbing,
}

/// Continuous motion the user has engaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Motion {
    Still,
    Forward,
    Backward,
}

/// Direction of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A backend operation the reconciler wants performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepRequest {
    StepForward { steps: u64 },
    StepBackward { steps: u64 },
    TimeForward { time: u64 },
    TimeBackward { time: u64 },
    /// One message transition with receive/emit animations
    Next,
    /// Undo one message transition
    Prev,
    /// Reset the simulation and reload topology
    Reset,
    JumpToStart,
    JumpToEnd,
    Reschedule { id: MessageId, time: u64, theta: u64 },
    /// Reload topology, messages and states without moving
    Reload,
    /// Reload messages and states without moving
    Refresh,
}

/// Why a ticket was issued. Decides how the response moves the playhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOrigin {
    Play,
    Scrub,
    Single,
    Jump,
    /// Re-read backend state; motion and playhead are left alone
    Refresh,
}

/// An outstanding backend request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTicket {
    pub id: u64,
    pub request: StepRequest,
    pub origin: StepOrigin,
}

/// What a finished request reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    /// Backend clock after the request
    pub clock: LogicalClock,
    /// Whether the backend actually moved
    pub progressed: bool,
}

/// The simulator time model.
#[derive(Debug)]
pub struct TimeReconciler {
    playhead: Playhead,
    backend: LogicalClock,
    speed: f64,
    motion: Motion,
    /// Signed count of queued single steps
    step_counter: i64,
    in_flight: Option<StepTicket>,
    queued: VecDeque<(StepRequest, StepOrigin)>,
    last_tick: Option<Instant>,
    next_id: u64,
}

impl TimeReconciler {
    pub fn new(speed: f64) -> Self {
        Self {
            playhead: Playhead::default(),
            backend: LogicalClock::UNSET,
            speed,
            motion: Motion::Still,
            step_counter: 0,
            in_flight: None,
            queued: VecDeque::new(),
            last_tick: None,
            next_id: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.in_flight.is_some() {
            return Phase::Stepping;
        }
        match self.motion {
            Motion::Still => Phase::Idle,
            Motion::Forward => Phase::Playing,
            Motion::Backward => Phase::Scrubbing,
        }
    }

    pub fn playhead(&self) -> Playhead {
        self.playhead
    }

    pub fn backend(&self) -> LogicalClock {
        self.backend
    }

    pub fn motion(&self) -> Motion {
        self.motion
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn step_counter(&self) -> i64 {
        self.step_counter
    }

    pub fn in_flight(&self) -> Option<&StepTicket> {
        self.in_flight.as_ref()
    }

    /// A step or continuous motion is active.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some() || self.motion != Motion::Still
    }

    /// Change playback speed. Non-positive or non-finite speeds are refused.
    pub fn set_speed(&mut self, speed: f64) -> bool {
        if !(speed.is_finite() && speed > 0.0) {
            return false;
        }
        self.speed = speed;
        true
    }

    /// Engage forward playback. Clears queued single steps.
    pub fn play(&mut self, now: Instant) {
        if self.motion == Motion::Forward {
            return;
        }
        self.motion = Motion::Forward;
        self.step_counter = 0;
        self.last_tick = Some(now);
    }

    /// Stop continuous motion. An in-flight request is left to land.
    pub fn pause(&mut self) {
        self.motion = Motion::Still;
        self.last_tick = None;
    }

    pub fn toggle(&mut self, now: Instant) {
        if self.motion == Motion::Forward {
            self.pause();
        } else {
            self.play(now);
        }
    }

    /// Engage backward scrubbing.
    pub fn scrub(&mut self, now: Instant) {
        if self.motion == Motion::Backward {
            return;
        }
        self.motion = Motion::Backward;
        self.step_counter = 0;
        self.last_tick = Some(now);
    }

    pub fn release_scrub(&mut self) {
        if self.motion == Motion::Backward {
            self.pause();
        }
    }

    /// Advance continuous motion to `now`. Returns a ticket when the
    /// playhead caught up with the backend and a step is needed.
    pub fn tick(&mut self, now: Instant, log: &EventLog) -> Option<StepTicket> {
        if self.motion == Motion::Still {
            return None;
        }
        let last = self.last_tick.replace(now)?;
        if self.in_flight.is_some() {
            return None;
        }

        let elapsed = now.saturating_duration_since(last).as_secs_f64() * self.speed;
        match self.motion {
            Motion::Forward => self.advance(elapsed, log),
            Motion::Backward => self.rewind(elapsed, log),
            Motion::Still => None,
        }
    }

    fn advance(&mut self, elapsed: f64, log: &EventLog) -> Option<StepTicket> {
        let target = self.playhead.time + elapsed;

        let Some(backend_time) = self.backend.time else {
            // Nothing processed yet: walk up to the first emission, then
            // ask for the very first step.
            return match log.earliest_emit_time() {
                Some(start) if target < start as f64 => {
                    self.playhead = Playhead::interpolated(target);
                    None
                }
                start => {
                    if let Some(start) = start {
                        self.playhead = Playhead::at(start, 0);
                    }
                    Some(self.issue(StepRequest::StepForward { steps: 1 }, StepOrigin::Play))
                }
            };
        };

        if target >= backend_time as f64 {
            self.playhead = Playhead::at(backend_time, self.backend.theta.unwrap_or(0));
            Some(self.issue(StepRequest::TimeForward { time: 1 }, StepOrigin::Play))
        } else {
            self.playhead = Playhead::interpolated(target);
            None
        }
    }

    fn rewind(&mut self, elapsed: f64, log: &EventLog) -> Option<StepTicket> {
        let floor = log.earliest_emit_time().unwrap_or(0);
        let target = self.playhead.time - elapsed;

        if target <= floor as f64 {
            self.playhead = Playhead::at(floor, 0);
            self.pause();
            return None;
        }
        self.playhead = Playhead::interpolated(target);

        match self.backend.time {
            Some(backend_time) if backend_time as f64 - target >= 1.0 => {
                Some(self.issue(StepRequest::TimeBackward { time: 1 }, StepOrigin::Scrub))
            }
            _ => None,
        }
    }

    /// Queue a `next`/`prev` click. Continuous motion stops.
    pub fn single_step(&mut self, direction: Direction) -> Option<StepTicket> {
        self.pause();
        match direction {
            Direction::Forward => self.step_counter += 1,
            Direction::Backward => self.step_counter -= 1,
        }
        self.start_next()
    }

    /// Menu step-forward: an interpolated playhead first snaps to the
    /// backend clock, otherwise one discrete step is requested.
    pub fn menu_step_forward(&mut self) -> Option<StepTicket> {
        if self.playhead.theta.is_none() {
            if let Some(snapped) = Playhead::from_clock(self.backend) {
                self.pause();
                self.playhead = snapped;
                return None;
            }
        }
        self.request(StepRequest::StepForward { steps: 1 })
    }

    /// Queue a menu operation. Continuous motion stops; requests run FIFO.
    ///
    /// A `Refresh` only re-reads the backend: it neither pauses nor moves
    /// the playhead when it lands.
    pub fn request(&mut self, request: StepRequest) -> Option<StepTicket> {
        let origin = match request {
            StepRequest::Refresh => StepOrigin::Refresh,
            _ => {
                self.pause();
                StepOrigin::Jump
            }
        };
        self.queued.push_back((request, origin));
        self.start_next()
    }

    /// Apply a finished request. Stale tickets are ignored.
    pub fn complete(
        &mut self,
        id: u64,
        outcome: StepOutcome,
        now: Instant,
        log: &EventLog,
    ) -> Option<StepTicket> {
        if self.in_flight.as_ref().map(|t| t.id) != Some(id) {
            debug!(ticket = id, "ignoring stale step completion");
            return None;
        }
        let ticket = self.in_flight.take()?;
        self.backend = outcome.clock;

        match ticket.origin {
            StepOrigin::Play => {
                if !outcome.progressed {
                    debug!(clock = %outcome.clock, "backend did not progress, stopping playback");
                    if self.motion == Motion::Forward {
                        self.pause();
                    }
                    self.snap_to_backend(log);
                }
            }
            StepOrigin::Scrub => {
                if let Some(backend_time) = self.backend.time {
                    if self.playhead.time > backend_time as f64 {
                        self.snap_to_backend(log);
                    }
                }
                if !outcome.progressed {
                    self.release_scrub();
                }
            }
            StepOrigin::Single | StepOrigin::Jump => self.snap_to_backend(log),
            StepOrigin::Refresh => {}
        }

        if self.motion != Motion::Still {
            self.last_tick = Some(now);
        }
        self.start_next()
    }

    /// A request failed. Everything stops and queued work is dropped.
    pub fn fail(&mut self, id: u64) {
        if self.in_flight.as_ref().map(|t| t.id) == Some(id) {
            self.in_flight = None;
        }
        self.pause();
        self.step_counter = 0;
        self.queued.clear();
    }

    fn start_next(&mut self) -> Option<StepTicket> {
        if self.in_flight.is_some() {
            return None;
        }
        if let Some((request, origin)) = self.queued.pop_front() {
            return Some(self.issue(request, origin));
        }
        match self.step_counter.signum() {
            1 => {
                self.step_counter -= 1;
                Some(self.issue(StepRequest::Next, StepOrigin::Single))
            }
            -1 => {
                self.step_counter += 1;
                Some(self.issue(StepRequest::Prev, StepOrigin::Single))
            }
            _ => None,
        }
    }

    fn issue(&mut self, request: StepRequest, origin: StepOrigin) -> StepTicket {
        self.next_id += 1;
        let ticket = StepTicket {
            id: self.next_id,
            request,
            origin,
        };
        debug!(ticket = ticket.id, request = ?ticket.request, origin = ?origin, "issuing step");
        self.in_flight = Some(ticket.clone());
        ticket
    }

    fn snap_to_backend(&mut self, log: &EventLog) {
        self.playhead = Playhead::from_clock(self.backend)
            .unwrap_or_else(|| Playhead::at(log.earliest_emit_time().unwrap_or(0), 0));
    }
}

/// Reconciler status for sending to views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilerStatus {
    pub phase: Phase,
    pub motion: Motion,
    pub playhead: Playhead,
    pub backend: LogicalClock,
    pub speed: f64,
    pub step_counter: i64,
    pub in_flight: Option<StepRequest>,
    pub queued: usize,
}

impl ReconcilerStatus {
    /// Detail cards may be edited only while not playing and only for
    /// events the backend has not processed yet.
    pub fn can_edit(&self, event: &MessageEvent) -> bool {
        if self.motion == Motion::Forward {
            return false;
        }
        match event.arrival_time {
            Some(time) => !self.backend.covers(time, event.arrival_theta.unwrap_or(0)),
            None => true,
        }
    }
}

impl From<&TimeReconciler> for ReconcilerStatus {
    fn from(reconciler: &TimeReconciler) -> Self {
        Self {
            phase: reconciler.phase(),
            motion: reconciler.motion,
            playhead: reconciler.playhead,
            backend: reconciler.backend,
            speed: reconciler.speed,
            step_counter: reconciler.step_counter,
            in_flight: reconciler.in_flight.as_ref().map(|t| t.request.clone()),
            queued: reconciler.queued.len(),
        }
    }
}

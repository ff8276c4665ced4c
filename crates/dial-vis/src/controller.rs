//! The single task that owns all visualizer state.
//!
//! The controller runs one `select!` loop over the frame clock, view
//! commands and reports from spawned backend pipelines. Event log and
//! reconciler are only touched inside that loop; pipelines share nothing
//! with it except the animation queues, which are locked per operation and
//! never across an await on an animation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dial_client::SimulatorApi;
use dial_model::{
    EventLog, MessageId, MessagesSnapshot, StateHistory, StatesResponse, Topology,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::adapter::{BusAdapter, RenderAdapter};
use crate::bus::{EventBus, VisEvent};
use crate::config::VisConfig;
use crate::error::{AnimationError, Error, Result};
use crate::reconciler::{
    Direction, Phase, ReconcilerStatus, StepOrigin, StepOutcome, StepRequest, StepTicket,
    TimeReconciler,
};
use crate::reorder::ReorderQueue;
use crate::sequencer::{AnimationSequencer, LaneItem};
use crate::transfer::{TransferAnimations, TransferKind};
use crate::views::Scene;

/// Commands accepted from views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Control {
    Play,
    Pause,
    TogglePlay,
    /// "Previous" pressed and held
    ScrubStart,
    ScrubStop,
    /// Single message transition forward
    Next,
    /// Undo a single message transition
    Prev,
    StepForward,
    StepBackward,
    FastForward,
    FastBackward,
    Reset,
    JumpToStart,
    JumpToEnd,
    Reschedule { id: MessageId, time: u64, theta: u64 },
    /// Fetch the raw message document for editing
    Edit { id: MessageId },
    Highlight { id: MessageId },
    SelectInstance { instance: String },
    SetSpeed { speed: f64 },
    /// A swimlane drag began
    DragStart,
    Reorder { order: Vec<MessageId> },
    Refresh,
}

/// Cloneable access to a running controller.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Control>,
    status: watch::Receiver<ReconcilerStatus>,
    bus: EventBus,
}

impl ControllerHandle {
    pub async fn send(&self, control: Control) -> Result<()> {
        self.commands.send(control).await.map_err(|_| Error::Closed)
    }

    /// Status as of the last render.
    pub fn status(&self) -> ReconcilerStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<ReconcilerStatus> {
        self.status.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VisEvent> {
        self.bus.subscribe()
    }
}

/// Everything a finished backend request brings back.
#[derive(Debug)]
struct StepReport {
    outcome: StepOutcome,
    topology: Option<Topology>,
    messages: MessagesSnapshot,
    states: StatesResponse,
}

#[derive(Debug)]
enum Report {
    Step { ticket: u64, result: Result<StepReport> },
    Reorder { result: Result<()> },
}

/// What a spawned pipeline needs from the controller.
#[derive(Debug, Clone)]
struct StepContext {
    sequencer: Arc<Mutex<AnimationSequencer>>,
    transfers: Arc<Mutex<TransferAnimations>>,
    budget: Duration,
    forward_settle: Duration,
    backward_settle: Duration,
}

pub struct Controller<S> {
    api: Arc<S>,
    config: VisConfig,
    reconciler: TimeReconciler,
    log: EventLog,
    topology: Topology,
    states: StateHistory,
    instance: Option<String>,
    sequencer: Arc<Mutex<AnimationSequencer>>,
    transfers: Arc<Mutex<TransferAnimations>>,
    reorder: ReorderQueue,
    bus: EventBus,
    adapters: Vec<Box<dyn RenderAdapter>>,
    commands: mpsc::Receiver<Control>,
    reports_tx: mpsc::Sender<Report>,
    reports: mpsc::Receiver<Report>,
    status: watch::Sender<ReconcilerStatus>,
}

impl<S: SimulatorApi> Controller<S> {
    /// Fails on a configuration the frame loop or the bus cannot run with.
    pub fn new(api: S, config: VisConfig) -> Result<(Self, ControllerHandle)> {
        config.validate()?;
        let bus = EventBus::new(config.bus_capacity);
        let (commands_tx, commands) = mpsc::channel(64);
        let (reports_tx, reports) = mpsc::channel(16);
        let reconciler = TimeReconciler::new(config.speed);
        let (status_tx, status_rx) = watch::channel(ReconcilerStatus::from(&reconciler));

        let controller = Self {
            api: Arc::new(api),
            sequencer: Arc::new(Mutex::new(AnimationSequencer::new(config.sweep_speed))),
            transfers: Arc::new(Mutex::new(TransferAnimations::new(config.transfer_speed))),
            config,
            reconciler,
            log: EventLog::new(),
            topology: Topology::default(),
            states: StateHistory::default(),
            instance: None,
            reorder: ReorderQueue::new(),
            bus: bus.clone(),
            adapters: vec![Box::new(BusAdapter::new(bus.clone()))],
            commands,
            reports_tx,
            reports,
            status: status_tx,
        };
        let handle = ControllerHandle {
            commands: commands_tx,
            status: status_rx,
            bus,
        };
        Ok((controller, handle))
    }

    /// Attach another render adapter.
    #[must_use]
    pub fn with_adapter(mut self, adapter: impl RenderAdapter + 'static) -> Self {
        self.adapters.push(Box::new(adapter));
        self
    }

    /// Run until every handle is dropped.
    pub async fn run(mut self) {
        info!(backend = %self.config.client.base_url, "controller started");
        if let Some(ticket) = self.reconciler.request(StepRequest::Reload) {
            self.spawn_step(ticket);
        }

        let mut frames = time::interval(self.config.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = frames.tick() => self.on_frame(Instant::now()).await,
                command = self.commands.recv() => match command {
                    Some(command) => self.on_control(command, Instant::now()).await,
                    None => break,
                },
                Some(report) = self.reports.recv() => self.on_report(report, Instant::now()).await,
            }
        }
        info!("controller stopped");
    }

    async fn on_frame(&mut self, now: Instant) {
        if let Some(ticket) = self.reconciler.tick(now, &self.log) {
            self.spawn_step(ticket);
        }

        let was_animating = {
            let mut sequencer = self.sequencer.lock().await;
            let mut transfers = self.transfers.lock().await;
            let busy = sequencer.is_busy() || transfers.is_busy();
            sequencer.advance(now);
            transfers.advance(now);
            busy
        };

        let moving = matches!(self.reconciler.phase(), Phase::Playing | Phase::Scrubbing);
        if was_animating || moving {
            self.render().await;
        }
    }

    async fn on_control(&mut self, control: Control, now: Instant) {
        debug!(?control, "control");
        let ticket = match control {
            Control::Play => {
                self.reconciler.play(now);
                None
            }
            Control::Pause => {
                self.reconciler.pause();
                None
            }
            Control::TogglePlay => {
                self.reconciler.toggle(now);
                None
            }
            Control::ScrubStart => {
                self.reconciler.scrub(now);
                None
            }
            Control::ScrubStop => {
                self.reconciler.release_scrub();
                None
            }
            Control::Next => self.reconciler.single_step(Direction::Forward),
            Control::Prev => self.reconciler.single_step(Direction::Backward),
            Control::StepForward => self.reconciler.menu_step_forward(),
            Control::StepBackward => self
                .reconciler
                .request(StepRequest::StepBackward { steps: 1 }),
            Control::FastForward => self.reconciler.request(StepRequest::TimeForward {
                time: self.config.fast_step,
            }),
            Control::FastBackward => self.reconciler.request(StepRequest::TimeBackward {
                time: self.config.fast_step,
            }),
            Control::Reset => self.reconciler.request(StepRequest::Reset),
            Control::JumpToStart => self.reconciler.request(StepRequest::JumpToStart),
            Control::JumpToEnd => self.reconciler.request(StepRequest::JumpToEnd),
            Control::Refresh => self.reconciler.request(StepRequest::Refresh),
            Control::Reschedule { id, time, theta } => self.reschedule(id, time, theta),
            Control::Edit { id } => {
                self.fetch_document(id);
                None
            }
            Control::Highlight { id } => {
                if !self.log.select(&id) {
                    self.bus.warn(format!("Unknown message {id}"));
                }
                None
            }
            Control::SelectInstance { instance } => {
                self.select_instance(instance);
                None
            }
            Control::SetSpeed { speed } => {
                if !self.reconciler.set_speed(speed) {
                    self.bus.warn(format!("Invalid speed {speed}"));
                }
                None
            }
            Control::DragStart => {
                self.reconciler.pause();
                None
            }
            Control::Reorder { order } => {
                self.submit_reorder(order).await;
                None
            }
        };

        if let Some(ticket) = ticket {
            self.spawn_step(ticket);
        }
        self.render().await;
    }

    fn reschedule(&mut self, id: MessageId, time: u64, theta: u64) -> Option<StepTicket> {
        let status = ReconcilerStatus::from(&self.reconciler);
        match self.log.get(&id) {
            Some(event) if status.can_edit(event) => {
                self.reconciler
                    .request(StepRequest::Reschedule { id, time, theta })
            }
            Some(_) => {
                self.bus
                    .warn(format!("Message {id} can no longer be rescheduled"));
                None
            }
            None => {
                self.bus.warn(format!("Unknown message {id}"));
                None
            }
        }
    }

    fn select_instance(&mut self, instance: String) {
        let instances = self.states.instances();
        if !instances.contains(&instance) {
            self.bus.warn(format!("Unknown instance {instance}"));
            return;
        }
        self.instance = Some(instance);
        self.bus.publish(VisEvent::Instances {
            instances,
            selected: self.instance.clone(),
        });
    }

    async fn on_report(&mut self, report: Report, now: Instant) {
        match report {
            Report::Step {
                ticket,
                result: Ok(report),
            } => self.apply_step(ticket, report, now).await,
            Report::Step {
                ticket,
                result: Err(error),
            } => {
                warn!(%error, ticket, "step failed");
                self.bus.warn(format!("Simulator request failed: {error}"));
                self.reconciler.fail(ticket);
            }
            Report::Reorder { result: Ok(()) } => {
                debug!("reorder acknowledged");
                self.reorder.acknowledge();
                if let Some(ticket) = self.reconciler.request(StepRequest::Refresh) {
                    self.spawn_step(ticket);
                }
            }
            Report::Reorder { result: Err(error) } => {
                warn!(%error, "reorder rejected");
                self.reorder.reject();
                let order = self.reorder.order().to_vec();
                self.sequencer
                    .lock()
                    .await
                    .timeline_mut()
                    .reorder_future(&order);
                self.bus.warn(format!("Reorder rejected: {error}"));
            }
        }
        self.render().await;
    }

    async fn apply_step(&mut self, ticket: u64, report: StepReport, now: Instant) {
        if let Some(topology) = report.topology {
            for adapter in &mut self.adapters {
                adapter.set_topology(&topology);
            }
            self.transfers.lock().await.set_topology(topology.clone());
            self.topology = topology;
        }

        for adapter in &mut self.adapters {
            adapter.set_messages(&report.messages);
            adapter.set_states(&report.states);
        }
        self.log.replace_all(report.messages.messages);

        match StateHistory::from_response(&report.states) {
            Ok(states) => {
                self.states = states;
                self.refresh_instance();
            }
            Err(error) => {
                warn!(%error, "could not decode states");
                self.bus.warn(format!("Could not decode node states: {error}"));
            }
        }

        let next = self.reconciler.complete(ticket, report.outcome, now, &self.log);

        let backend = self.reconciler.backend();
        self.log.select_at(backend);
        let pending = self.log.pending(backend);
        {
            let created = pending
                .iter()
                .filter_map(|id| self.log.get(id))
                .filter(|e| backend.covers(e.emit_time, e.emit_theta));
            self.transfers.lock().await.reset_indicators(created);
        }
        self.reorder.sync(pending);

        let playhead = self.reconciler.playhead();
        for adapter in &mut self.adapters {
            adapter.set_time(playhead);
        }

        if let Some(ticket) = next {
            self.spawn_step(ticket);
        }
    }

    fn refresh_instance(&mut self) {
        let instances = self.states.instances();
        let keep = self
            .instance
            .as_ref()
            .is_some_and(|current| instances.contains(current));
        if keep {
            return;
        }
        self.instance = self.states.default_instance();
        self.bus.publish(VisEvent::Instances {
            instances,
            selected: self.instance.clone(),
        });
    }

    async fn render(&mut self) {
        let status = ReconcilerStatus::from(&self.reconciler);
        let mut sequencer = self.sequencer.lock().await;
        let transfers = self.transfers.lock().await;

        // Display queues follow the log unless a single step is animating
        // them.
        let single_step = self
            .reconciler
            .in_flight()
            .is_some_and(|t| t.origin == StepOrigin::Single);
        if !sequencer.is_busy() && !single_step {
            let partition = self.log.visible_at(status.playhead, status.backend);
            sequencer
                .timeline_mut()
                .sync(&partition, self.reorder.order());
        }

        let glyphs = transfers.glyphs();
        let scene = Scene {
            status: &status,
            log: &self.log,
            topology: &self.topology,
            states: &self.states,
            instance: self.instance.as_deref(),
            timeline: sequencer.timeline(),
            cursor: sequencer.cursor(),
            transfers: &glyphs,
            indicators: transfers.indicators(),
        };
        for adapter in &mut self.adapters {
            adapter.on_state_change(&scene);
        }

        drop(transfers);
        drop(sequencer);
        self.status.send_replace(status);
    }

    async fn submit_reorder(&mut self, order: Vec<MessageId>) {
        // The swimlane's future queue is what the view was able to drag.
        let (animating, visible) = {
            let sequencer = self.sequencer.lock().await;
            let transfers = self.transfers.lock().await;
            let visible: Vec<MessageId> = sequencer
                .timeline()
                .future
                .iter()
                .map(|item| item.id.clone())
                .collect();
            (sequencer.is_busy() || transfers.is_busy(), visible)
        };
        let busy = animating || self.reconciler.is_busy();

        let order = match self.reorder.reorder(order, &visible, busy) {
            Ok(order) => order,
            Err(error) => {
                debug!(%error, "reorder refused");
                self.bus.warn(error.to_string());
                return;
            }
        };
        self.sequencer
            .lock()
            .await
            .timeline_mut()
            .reorder_future(&order);

        let api = Arc::clone(&self.api);
        let reports = self.reports_tx.clone();
        let budget = self.config.client.request_timeout;
        tokio::spawn(async move {
            let result = bounded(budget, api.reorder(&order)).await;
            if reports.send(Report::Reorder { result }).await.is_err() {
                debug!("controller gone, dropping reorder report");
            }
        });
    }

    fn fetch_document(&self, id: MessageId) {
        let api = Arc::clone(&self.api);
        let bus = self.bus.clone();
        let budget = self.config.client.request_timeout;
        tokio::spawn(async move {
            match bounded(budget, api.message(&id)).await {
                Ok(document) => bus.publish(VisEvent::Document { id, document }),
                Err(error) => {
                    warn!(%error, %id, "could not fetch message");
                    bus.warn(format!("Could not load message {id}: {error}"));
                }
            }
        });
    }

    fn spawn_step(&self, ticket: StepTicket) {
        let api = Arc::clone(&self.api);
        let reports = self.reports_tx.clone();
        let ctx = StepContext {
            sequencer: Arc::clone(&self.sequencer),
            transfers: Arc::clone(&self.transfers),
            budget: self.config.client.request_timeout,
            forward_settle: self.config.forward_settle,
            backward_settle: self.config.backward_settle,
        };
        tokio::spawn(async move {
            let result = run_step(api.as_ref(), &ticket.request, &ctx).await;
            let report = Report::Step {
                ticket: ticket.id,
                result,
            };
            if reports.send(report).await.is_err() {
                debug!("controller gone, dropping step report");
            }
        });
    }
}

/// Bound a backend call by the request timeout.
async fn bounded<T>(
    budget: Duration,
    call: impl Future<Output = dial_client::Result<T>>,
) -> Result<T> {
    match time::timeout(budget, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(dial_client::Error::Timeout(budget).into()),
    }
}

/// Animation failures never abort a step.
fn settle(result: std::result::Result<(), AnimationError>) {
    if let Err(error) = result {
        debug!(%error, "animation skipped");
    }
}

async fn run_step<S: SimulatorApi>(
    api: &S,
    request: &StepRequest,
    ctx: &StepContext,
) -> Result<StepReport> {
    let budget = ctx.budget;
    let (clock, progressed) = match request {
        StepRequest::StepForward { steps } => {
            let response = bounded(budget, api.step_forward(*steps)).await?;
            (Some(response.clock()), response.progressed())
        }
        StepRequest::StepBackward { steps } => {
            let response = bounded(budget, api.step_backward(*steps)).await?;
            (Some(response.clock()), response.progressed())
        }
        StepRequest::TimeForward { time } => {
            let response = bounded(budget, api.time_forward(*time)).await?;
            (Some(response.clock()), response.progressed())
        }
        StepRequest::TimeBackward { time } => {
            let response = bounded(budget, api.time_backward(*time)).await?;
            (Some(response.clock()), response.progressed())
        }
        StepRequest::Next => {
            play_next(api, ctx).await?;
            (None, true)
        }
        StepRequest::Prev => {
            play_prev(api, ctx).await?;
            (None, true)
        }
        StepRequest::Reset => {
            bounded(budget, api.reset()).await?;
            (None, true)
        }
        StepRequest::JumpToStart => {
            bounded(budget, api.jump_to_start()).await?;
            (None, true)
        }
        StepRequest::JumpToEnd => {
            bounded(budget, api.jump_to_end()).await?;
            (None, true)
        }
        StepRequest::Reschedule { id, time, theta } => {
            bounded(budget, api.reschedule(id, *time, *theta)).await?;
            (None, true)
        }
        StepRequest::Reload | StepRequest::Refresh => (None, true),
    };

    let topology = match request {
        StepRequest::Reset | StepRequest::Reload => Some(bounded(budget, api.topology()).await?),
        _ => None,
    };
    let messages = bounded(budget, api.messages()).await?;
    let states = bounded(budget, api.states()).await?;

    let clock = clock
        .filter(|c| c.is_set())
        .unwrap_or_else(|| messages.clock());
    Ok(StepReport {
        outcome: StepOutcome { clock, progressed },
        topology,
        messages,
        states,
    })
}

/// `next`: sweep in, receive the consumed message, emit what it produced,
/// sweep out.
async fn play_next<S: SimulatorApi>(api: &S, ctx: &StepContext) -> Result<()> {
    let sweep = ctx.sequencer.lock().await.enqueue(0.0, 0.5);
    let (step, swept) = tokio::join!(bounded(ctx.budget, api.next()), sweep);
    settle(swept);
    let step = step?;
    time::sleep(ctx.forward_settle).await;

    let receive = ctx.transfers.lock().await.start(
        &step.consumed_message,
        TransferKind::Receive,
        false,
        Instant::now(),
    );
    settle(receive.await);

    {
        let mut sequencer = ctx.sequencer.lock().await;
        for message in &step.produced_messages {
            sequencer.timeline_mut().push_future(LaneItem::from(message));
        }
    }
    let emits: Vec<_> = {
        let mut transfers = ctx.transfers.lock().await;
        let now = Instant::now();
        step.produced_messages
            .iter()
            .map(|m| transfers.start(m, TransferKind::Emit, false, now))
            .collect()
    };
    join_all(emits).await.into_iter().for_each(settle);

    let sweep = ctx.sequencer.lock().await.enqueue(0.5, 1.0);
    settle(sweep.await);
    Ok(())
}

/// `prev`: the mirror image of [`play_next`].
async fn play_prev<S: SimulatorApi>(api: &S, ctx: &StepContext) -> Result<()> {
    let sweep = ctx.sequencer.lock().await.enqueue(1.0, 0.5);
    let (step, swept) = tokio::join!(bounded(ctx.budget, api.prev()), sweep);
    settle(swept);
    let step = step?;
    time::sleep(ctx.backward_settle).await;

    let emits: Vec<_> = {
        let mut transfers = ctx.transfers.lock().await;
        let now = Instant::now();
        step.removed_messages
            .iter()
            .map(|m| transfers.start(m, TransferKind::Emit, true, now))
            .collect()
    };
    join_all(emits).await.into_iter().for_each(settle);
    {
        let mut sequencer = ctx.sequencer.lock().await;
        for message in &step.removed_messages {
            sequencer.timeline_mut().remove(&message.id);
        }
    }

    let receive = ctx.transfers.lock().await.start(
        &step.reverted_message,
        TransferKind::Receive,
        true,
        Instant::now(),
    );
    settle(receive.await);

    let sweep = ctx.sequencer.lock().await.enqueue(0.5, 0.0);
    settle(sweep.await);
    Ok(())
}

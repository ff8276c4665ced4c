//! The simulator backend as seen by the visualizer.

use std::future::Future;

use dial_model::{
    MessageId, MessagesSnapshot, NextStep, PrevStep, StatesResponse, StepResponse, Topology,
};
use serde_json::Value;

use crate::error::Result;

/// Logical operations of the simulator backend.
///
/// Implementations must be cheap to share; the visualizer clones an
/// `Arc` of the implementation into every step pipeline.
pub trait SimulatorApi: Send + Sync + 'static {
    /// Static topology of the run.
    fn topology(&self) -> impl Future<Output = Result<Topology>> + Send;

    /// Full message snapshot plus the backend clock.
    fn messages(&self) -> impl Future<Output = Result<MessagesSnapshot>> + Send;

    /// Per-instance colour and neighbour history.
    fn states(&self) -> impl Future<Output = Result<StatesResponse>> + Send;

    /// Deliver the next pending message.
    fn next(&self) -> impl Future<Output = Result<NextStep>> + Send;

    /// Undo the last delivery.
    fn prev(&self) -> impl Future<Output = Result<PrevStep>> + Send;

    fn step_forward(&self, steps: u64) -> impl Future<Output = Result<StepResponse>> + Send;

    fn step_backward(&self, steps: u64) -> impl Future<Output = Result<StepResponse>> + Send;

    fn time_forward(&self, time: u64) -> impl Future<Output = Result<StepResponse>> + Send;

    fn time_backward(&self, time: u64) -> impl Future<Output = Result<StepResponse>> + Send;

    /// Submit a new order for the pending messages.
    fn reorder(&self, order: &[MessageId]) -> impl Future<Output = Result<()>> + Send;

    fn reset(&self) -> impl Future<Output = Result<()>> + Send;

    fn jump_to_start(&self) -> impl Future<Output = Result<()>> + Send;

    fn jump_to_end(&self) -> impl Future<Output = Result<()>> + Send;

    /// Raw message document, for the editor.
    fn message(&self, id: &MessageId) -> impl Future<Output = Result<Value>> + Send;

    /// Move a pending message to a new arrival clock.
    fn reschedule(
        &self,
        id: &MessageId,
        time: u64,
        theta: u64,
    ) -> impl Future<Output = Result<()>> + Send;
}

//! DIAL Visualizer Model
//!
//! Pure data layer shared by the HTTP client and the visualizer core.
//!
//! # Architecture
//!
//! - **Clock**: `(time, theta)` logical clocks and the interpolated playhead
//! - **Address**: `node:port/process/program#instance` parsing
//! - **EventLog**: arrival-bucketed message events and the past/current/future split
//! - **States**: per-instance colour history
//! - **Wire**: typed backend responses with lenient scalar decoding
//!
//! Nothing in this crate performs I/O.

mod address;
mod clock;
mod error;
mod event_log;
pub mod lenient;
mod message;
mod states;
pub mod wire;

pub use address::{Address, NodeAddress};
pub use clock::{compare, LogicalClock, Playhead};
pub use error::{Error, Result};
pub use event_log::{Classified, EventLog, Partition, Placement};
pub use message::{MessageEvent, MessageId};
pub use states::{StateCard, StateEntry, StateHistory, StateSnapshot};
pub use wire::{
    MessagesSnapshot, NextStep, PrevStep, StatesResponse, StepResponse, Topology,
    TransitionMessage,
};

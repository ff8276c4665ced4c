//! DIAL Visualizer
//!
//! Playback controller and live views for a distributed-algorithm
//! simulator backend.
//!
//! # Architecture
//!
//! - **Reconciler**: keeps the visual playhead and the backend clock in step
//! - **Controller**: single task owning the event log; issues backend steps
//! - **Sequencer / Transfers**: frame-driven timeline and graph animations
//! - **Views**: graph, swimlane and detail frames built from one scene
//! - **Server**: REST controls and a WebSocket stream of frames
//!
//! # Usage
//!
//! ```ignore
//! let config = VisConfig::from_env()?;
//! let api = HttpSimulator::new(config.client.clone())?;
//! let (controller, handle) = Controller::new(api, config.clone())?;
//! tokio::spawn(controller.run());
//!
//! VisServer::new(handle).serve(config.listen).await?;
//! ```

pub mod adapter;
pub mod bus;
pub mod config;
pub mod controller;
pub mod error;
pub mod reconciler;
pub mod reorder;
pub mod sequencer;
pub mod server;
pub mod transfer;
pub mod views;

pub use adapter::{BusAdapter, RenderAdapter};
pub use bus::{EventBus, VisEvent};
pub use config::VisConfig;
pub use controller::{Control, Controller, ControllerHandle};
pub use error::{AnimationError, Error, ReorderError, Result};
pub use reconciler::{Direction, Phase, ReconcilerStatus, StepRequest, TimeReconciler};
pub use server::VisServer;
pub use views::RenderFrame;

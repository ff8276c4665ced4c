//! DIAL Simulator Client
//!
//! The visualizer reaches the simulator backend only through
//! [`SimulatorApi`]. [`HttpSimulator`] is the production implementation;
//! [`testing::MockSimulator`] (feature `testing`) is an in-memory backend
//! for tests.
//!
//! # Usage
//!
//! ```ignore
//! let sim = HttpSimulator::new(ClientConfig::from_env()?)?;
//! let topology = sim.topology().await?;
//! let step = sim.time_forward(1).await?;
//! ```

mod api;
mod config;
mod error;
mod http;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use api::SimulatorApi;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use http::HttpSimulator;

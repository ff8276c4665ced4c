//! Error types for the visualizer core.

use thiserror::Error;

/// Result type for visualizer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level visualizer errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Backend request failed or returned garbage
    #[error("backend error: {0}")]
    Client(#[from] dial_client::Error),

    /// A visual transition could not run
    #[error("animation error: {0}")]
    Animation(#[from] AnimationError),

    /// Reordering was refused
    #[error("reorder error: {0}")]
    Reorder(#[from] ReorderError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The controller task has shut down
    #[error("controller closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Recoverable animation failures. These are logged and skipped, never
/// escalated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnimationError {
    /// Sweep bounds outside `[0, 1]` or empty
    #[error("invalid sweep interval {start} -> {end}")]
    InvalidInterval { start: f64, end: f64 },

    /// Transfer requested on an edge missing from the topology
    #[error("no edge between {from} and {to}")]
    UnknownEdge { from: String, to: String },

    /// The animation driver went away before the animation finished
    #[error("animation dropped before completion")]
    Dropped,
}

/// Reasons a reorder gesture is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReorderError {
    /// A step or animation is running
    #[error("cannot reorder while a step is running")]
    Busy,

    /// The previous reorder is still unacknowledged
    #[error("a reorder is already in flight")]
    InFlight,

    /// The new order does not contain exactly the pending messages
    #[error("order is not a permutation of the pending messages")]
    NotAPermutation,
}

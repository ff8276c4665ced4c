//! Visualizer configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use dial_client::ClientConfig;

use crate::error::{Error, Result};

/// Configuration for the controller and its web surface.
#[derive(Debug, Clone, PartialEq)]
pub struct VisConfig {
    /// Backend client settings
    pub client: ClientConfig,
    /// Address the browser surface listens on
    pub listen: SocketAddr,
    /// Playback speed in time units per second
    pub speed: f64,
    /// Animation frame period
    pub frame_interval: Duration,
    /// Timeline cursor speed in cursor units per second
    pub sweep_speed: f64,
    /// Graph transfer glyph speed in progress per second
    pub transfer_speed: f64,
    /// Time units covered by fast-forward and fast-backward
    pub fast_step: u64,
    /// Pause after a `next` response before animating
    pub forward_settle: Duration,
    /// Pause after a `prev` response before animating
    pub backward_settle: Duration,
    /// Browser front-end to serve, if any
    pub static_dir: Option<PathBuf>,
    /// Broadcast bus capacity
    pub bus_capacity: usize,
}

impl Default for VisConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            listen: SocketAddr::from(([0, 0, 0, 0], 3000)),
            speed: 0.5,
            frame_interval: Duration::from_millis(16),
            sweep_speed: 5.0,
            transfer_speed: 0.2,
            fast_step: 100,
            forward_settle: Duration::from_secs(1),
            backward_settle: Duration::from_millis(100),
            static_dir: None,
            bus_capacity: 256,
        }
    }
}

impl VisConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self {
            client: ClientConfig::from_lookup(&lookup)?,
            ..Self::default()
        };

        if let Some(addr) = lookup("DIAL_VIS_ADDR") {
            config.listen = addr
                .parse()
                .map_err(|_| Error::Config(format!("DIAL_VIS_ADDR={addr:?} is not a socket address")))?;
        }
        if let Some(speed) = lookup("DIAL_SPEED") {
            config.speed = speed
                .parse()
                .map_err(|_| Error::Config(format!("DIAL_SPEED={speed:?} is not a number")))?;
        }
        if let Some(ms) = lookup("DIAL_FRAME_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| Error::Config(format!("DIAL_FRAME_MS={ms:?} is not a number")))?;
            config.frame_interval = Duration::from_millis(ms);
        }
        if let Some(dir) = lookup("DIAL_STATIC_DIR") {
            config.static_dir = Some(PathBuf::from(dir));
        }

        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    #[must_use]
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    #[must_use]
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    #[must_use]
    pub fn with_settle(mut self, forward: Duration, backward: Duration) -> Self {
        self.forward_settle = forward;
        self.backward_settle = backward;
        self
    }

    #[must_use]
    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(dir.into());
        self
    }

    /// Reject values the animation loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.client.validate()?;
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(Error::Config(format!("speed {} must be positive", self.speed)));
        }
        if self.frame_interval.is_zero() {
            return Err(Error::Config("frame interval must be positive".into()));
        }
        for (name, value) in [("sweep speed", self.sweep_speed), ("transfer speed", self.transfer_speed)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!("{name} {value} must be positive")));
            }
        }
        if self.bus_capacity == 0 {
            return Err(Error::Config("bus capacity must be positive".into()));
        }
        Ok(())
    }
}

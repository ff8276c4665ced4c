//! Client configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// Configuration for [`crate::HttpSimulator`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Backend root, e.g. `https://localhost:10101`
    pub base_url: String,
    /// Upper bound for every request
    pub request_timeout: Duration,
    /// The reference backend serves a self-signed certificate
    pub accept_invalid_certs: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost:10101".to_string(),
            request_timeout: Duration::from_secs(10),
            accept_invalid_certs: true,
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("DIAL_BACKEND_URL") {
            config.base_url = url;
        }
        if let Some(ms) = lookup("DIAL_REQUEST_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| Error::Config(format!("DIAL_REQUEST_TIMEOUT_MS={ms:?} is not a number")))?;
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(flag) = lookup("DIAL_ACCEPT_INVALID_CERTS") {
            config.accept_invalid_certs = match flag.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(Error::Config(format!(
                        "DIAL_ACCEPT_INVALID_CERTS={flag:?} is not a boolean"
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Reject configurations no request could succeed with.
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "backend url {:?} must start with http:// or https://",
                self.base_url
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config("request timeout must be positive".into()));
        }
        Ok(())
    }

    /// Join a relative endpoint path onto the base url.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

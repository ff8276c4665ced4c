//! reqwest-backed implementation of [`SimulatorApi`].

use dial_model::{
    MessageId, MessagesSnapshot, NextStep, PrevStep, StatesResponse, StepResponse, Topology,
};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::api::SimulatorApi;
use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// HTTP client for the simulator backend.
#[derive(Debug, Clone)]
pub struct HttpSimulator {
    http: Client,
    config: ClientConfig,
}

impl HttpSimulator {
    /// Build a client. Fails on invalid configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let http = Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn classify(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout(self.config.request_timeout)
        } else if e.is_decode() {
            Error::Decode(e.to_string())
        } else {
            Error::Connection(e.to_string())
        }
    }

    async fn send(&self, method: &'static str, path: &str, request: RequestBuilder) -> Result<String> {
        debug!(method, path, "backend request");
        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(e))?;
        if !status.is_success() {
            debug!(method, path, status = status.as_u16(), "backend rejected request");
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let url = self.config.endpoint(path);
        self.send("GET", path, self.http.get(url)).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.get_text(path).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn put_json<B: serde::Serialize + ?Sized>(&self, path: &str, payload: &B) -> Result<String> {
        let url = self.config.endpoint(path);
        self.send("PUT", path, self.http.put(url).json(payload)).await
    }
}

impl SimulatorApi for HttpSimulator {
    async fn topology(&self) -> Result<Topology> {
        self.get_json("topology").await
    }

    async fn messages(&self) -> Result<MessagesSnapshot> {
        self.get_json("messages").await
    }

    async fn states(&self) -> Result<StatesResponse> {
        self.get_json("states").await
    }

    async fn next(&self) -> Result<NextStep> {
        self.get_json("next").await
    }

    async fn prev(&self) -> Result<PrevStep> {
        self.get_json("prev").await
    }

    async fn step_forward(&self, steps: u64) -> Result<StepResponse> {
        self.get_json(&format!("step-forward/{steps}")).await
    }

    async fn step_backward(&self, steps: u64) -> Result<StepResponse> {
        self.get_json(&format!("step-backward/{steps}")).await
    }

    async fn time_forward(&self, time: u64) -> Result<StepResponse> {
        self.get_json(&format!("time-forward/{time}")).await
    }

    async fn time_backward(&self, time: u64) -> Result<StepResponse> {
        self.get_json(&format!("time-backward/{time}")).await
    }

    async fn reorder(&self, order: &[MessageId]) -> Result<()> {
        self.put_json("reorder", order).await.map(drop)
    }

    async fn reset(&self) -> Result<()> {
        self.get_text("reset").await.map(drop)
    }

    async fn jump_to_start(&self) -> Result<()> {
        self.get_text("jump_to_start").await.map(drop)
    }

    async fn jump_to_end(&self) -> Result<()> {
        self.get_text("jump_to_end").await.map(drop)
    }

    async fn message(&self, id: &MessageId) -> Result<Value> {
        self.get_json(&format!("message/{id}")).await
    }

    async fn reschedule(&self, id: &MessageId, time: u64, theta: u64) -> Result<()> {
        self.get_text(&format!("reschedule/{id}/{time}/{theta}"))
            .await
            .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_config() {
        let config = ClientConfig::default().with_base_url("ftp://nowhere");
        assert!(matches!(HttpSimulator::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn builds_with_defaults() {
        let client = HttpSimulator::new(ClientConfig::default()).unwrap();
        assert_eq!(client.config().base_url, "https://localhost:10101");
    }
}

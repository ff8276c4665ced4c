//! Message events as reported by the simulator backend.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::clock::LogicalClock;
use crate::lenient;

/// Opaque message identifier, stable across requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One message transition in the simulated system.
///
/// Time fields are owned by the backend; the client only toggles
/// `selected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(alias = "uuid")]
    pub id: MessageId,
    pub source: Address,
    pub target: Address,
    #[serde(
        rename = "creation_time",
        alias = "emit_time",
        deserialize_with = "lenient::required_u64"
    )]
    pub emit_time: u64,
    #[serde(
        rename = "creation_theta",
        alias = "emit_theta",
        deserialize_with = "lenient::required_u64"
    )]
    pub emit_theta: u64,
    #[serde(alias = "receive_time", default, deserialize_with = "lenient::opt_u64")]
    pub arrival_time: Option<u64>,
    #[serde(alias = "receive_theta", default, deserialize_with = "lenient::opt_u64")]
    pub arrival_theta: Option<u64>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_lost: bool,
    #[serde(rename = "self_message", alias = "is_self_message", default, deserialize_with = "lenient::flag")]
    pub is_self_message: bool,
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(skip)]
    pub selected: bool,
}

impl MessageEvent {
    /// A minimal event, mostly useful for tests and mocks.
    pub fn new(id: impl Into<String>, source: Address, target: Address, emit_time: u64) -> Self {
        Self {
            id: MessageId::new(id),
            source,
            target,
            emit_time,
            emit_theta: 0,
            arrival_time: None,
            arrival_theta: None,
            color: None,
            title: None,
            is_lost: false,
            is_self_message: false,
            parent: None,
            children: Vec::new(),
            selected: false,
        }
    }

    #[must_use]
    pub fn with_arrival(mut self, time: u64, theta: u64) -> Self {
        self.arrival_time = Some(time);
        self.arrival_theta = Some(theta);
        self
    }

    #[must_use]
    pub fn with_emit_theta(mut self, theta: u64) -> Self {
        self.emit_theta = theta;
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    #[must_use]
    pub fn lost(mut self) -> Self {
        self.is_lost = true;
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn emit_clock(&self) -> LogicalClock {
        LogicalClock::at(self.emit_time, self.emit_theta)
    }

    pub fn arrival_clock(&self) -> LogicalClock {
        LogicalClock {
            time: self.arrival_time,
            theta: self.arrival_theta,
        }
    }

    /// Whether a message arrives where it was sent.
    pub fn loops_back(&self) -> bool {
        self.is_self_message || self.source == self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_backend_summary() {
        let json = r##"{
            "id": "m1",
            "source": "n1:1/p/echo#a",
            "target": "n2:1/p/echo#a",
            "color": "#ff0000",
            "title": "Echo",
            "creation_time": "3",
            "creation_theta": 0,
            "arrival_time": 5,
            "arrival_theta": "1",
            "is_lost": "True",
            "self_message": "False",
            "parent": "None",
            "children": ["m2"]
        }"##;
        let event: MessageEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.id.as_str(), "m1");
        assert_eq!(event.emit_clock(), LogicalClock::at(3, 0));
        assert_eq!(event.arrival_clock(), LogicalClock::at(5, 1));
        assert!(event.is_lost);
        assert!(!event.is_self_message);
        assert_eq!(event.parent, None);
        assert_eq!(event.children, vec!["m2".to_string()]);
        assert!(!event.selected);
    }

    #[test]
    fn accepts_uuid_alias_and_missing_arrival() {
        let json = r#"{"uuid": "u", "source": "a/b", "target": "a/b",
                       "creation_time": 0, "creation_theta": 0, "self_message": true}"#;
        let event: MessageEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.id.as_str(), "u");
        assert_eq!(event.arrival_clock(), LogicalClock::UNSET);
        assert!(event.loops_back());
    }

    #[test]
    fn requires_creation_clock() {
        let missing = r#"{"id": "m", "source": "a/b", "target": "a/c", "creation_theta": 0}"#;
        assert!(serde_json::from_str::<MessageEvent>(missing).is_err());

        let null = r#"{"id": "m", "source": "a/b", "target": "a/c",
                       "creation_time": null, "creation_theta": 0}"#;
        assert!(serde_json::from_str::<MessageEvent>(null).is_err());
    }

    #[test]
    fn rejects_bad_address() {
        let json = r#"{"id": "m", "source": "a/b/c/d", "target": "a",
                       "creation_time": 0, "creation_theta": 0}"#;
        assert!(serde_json::from_str::<MessageEvent>(json).is_err());
    }
}

//! Typed shapes of the simulator backend responses.
//!
//! Every response is parsed into one of these at the network boundary, so
//! a malformed document fails as a decode error instead of leaking missing
//! fields into the time model.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::address::Address;
use crate::clock::LogicalClock;
use crate::lenient;
use crate::message::{MessageEvent, MessageId};

/// Static network topology of the simulation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(deserialize_with = "node_list")]
    pub nodes: Vec<String>,
    #[serde(default, deserialize_with = "edge_list")]
    pub edges: Vec<(String, String)>,
}

impl Topology {
    /// Whether an undirected edge between two nodes exists.
    pub fn has_edge(&self, a: &str, b: &str) -> bool {
        self.edges
            .iter()
            .any(|(x, y)| (x == a && y == b) || (x == b && y == a))
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n == id)
    }
}

fn node_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map
            .get("id")
            .or_else(|| map.get("address"))
            .and_then(node_id),
        _ => None,
    }
}

fn node_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<Value>::deserialize(deserializer)?;
    values
        .iter()
        .map(|v| node_id(v).ok_or_else(|| D::Error::custom(format!("bad node entry {v}"))))
        .collect()
}

fn edge_list<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<Value>::deserialize(deserializer)?;
    values
        .iter()
        .map(|v| {
            let pair = match v {
                Value::Array(items) if items.len() == 2 => {
                    node_id(&items[0]).zip(node_id(&items[1]))
                }
                Value::Object(map) => map
                    .get("A")
                    .and_then(node_id)
                    .zip(map.get("B").and_then(node_id)),
                _ => None,
            };
            pair.ok_or_else(|| D::Error::custom(format!("bad edge entry {v}")))
        })
        .collect()
}

/// Full `messages` snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagesSnapshot {
    #[serde(default)]
    pub messages: BTreeMap<u64, Vec<MessageEvent>>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub time: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub theta: Option<u64>,
}

impl MessagesSnapshot {
    pub fn clock(&self) -> LogicalClock {
        LogicalClock {
            time: self.time,
            theta: self.theta,
        }
    }
}

/// Raw `states` response: `"time/theta"` keys to address-keyed values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatesResponse {
    #[serde(default)]
    pub colors: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default)]
    pub neighbors: BTreeMap<String, BTreeMap<String, Value>>,
}

/// Message summary embedded in `next`/`prev` responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionMessage {
    #[serde(alias = "uuid")]
    pub id: MessageId,
    pub source: Address,
    pub target: Address,
    #[serde(default)]
    pub color: Option<String>,
}

/// Response of `next`.
#[derive(Debug, Clone, Deserialize)]
pub struct NextStep {
    pub consumed_message: TransitionMessage,
    #[serde(default)]
    pub produced_messages: Vec<TransitionMessage>,
}

/// Response of `prev`.
#[derive(Debug, Clone, Deserialize)]
pub struct PrevStep {
    pub reverted_message: TransitionMessage,
    #[serde(default)]
    pub removed_messages: Vec<TransitionMessage>,
}

/// Response of the bulk step/time endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepResponse {
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub time: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub theta: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub steps: Option<u64>,
    #[serde(default)]
    pub actions: Vec<Value>,
}

impl StepResponse {
    pub fn clock(&self) -> LogicalClock {
        LogicalClock {
            time: self.time,
            theta: self.theta,
        }
    }

    /// Whether the backend actually moved.
    pub fn progressed(&self) -> bool {
        !self.actions.is_empty() || self.steps.unwrap_or(0) > 0
    }
}

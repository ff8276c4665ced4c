//! Per-instance algorithm state history, used to colour nodes.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::address::Address;
use crate::clock::{LogicalClock, Playhead};
use crate::error::{Error, Result};
use crate::lenient::parse_python_list;
use crate::wire::StatesResponse;

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateEntry {
    pub clock: LogicalClock,
    pub address: Address,
    pub color: String,
    pub neighbors: Vec<String>,
}

/// State shown on a detail card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateCard {
    pub address: Address,
    pub color: String,
    pub neighbors: Vec<String>,
}

/// Instance group (`program#instance` path) to node to latest card.
pub type StateSnapshot = BTreeMap<String, BTreeMap<String, StateCard>>;

/// All state changes, in clock order.
#[derive(Debug, Clone, Default)]
pub struct StateHistory {
    entries: Vec<StateEntry>,
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_to_list(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items.iter().map(value_to_string).collect()),
        Value::String(s) => parse_python_list(s).map_err(Error::Decode),
        other => Err(Error::Decode(format!("expected a neighbour list, got {other}"))),
    }
}

impl StateHistory {
    pub fn new(entries: Vec<StateEntry>) -> Self {
        let mut entries = entries;
        entries.sort_by(|a, b| a.clock.cmp(&b.clock));
        Self { entries }
    }

    /// Build from a `states` response.
    pub fn from_response(response: &StatesResponse) -> Result<Self> {
        let mut entries = Vec::new();
        for (key, colors) in &response.colors {
            let clock = LogicalClock::parse_key(key)?;
            for (address, color) in colors {
                let neighbors = match response.neighbors.get(key).and_then(|n| n.get(address)) {
                    Some(value) => value_to_list(value)?,
                    None => Vec::new(),
                };
                entries.push(StateEntry {
                    clock,
                    address: address.parse()?,
                    color: value_to_string(color),
                    neighbors,
                });
            }
        }
        Ok(Self::new(entries))
    }

    pub fn entries(&self) -> &[StateEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct instance groups in first-seen order.
    pub fn instances(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            let key = entry.address.group_key();
            if !seen.contains(&key) {
                seen.push(key);
            }
        }
        seen
    }

    /// The instance used for node colouring when none was chosen.
    pub fn default_instance(&self) -> Option<String> {
        self.entries.first().map(|e| e.address.group_key())
    }

    fn reached<'a>(&'a self, playhead: Playhead) -> impl Iterator<Item = &'a StateEntry> {
        self.entries
            .iter()
            .filter(move |e| playhead.compare_clock(&e.clock) != Ordering::Less)
    }

    /// Latest colour per node for one instance at the playhead.
    pub fn node_colors_at(&self, playhead: Playhead, instance: &str) -> BTreeMap<String, String> {
        let mut colors = BTreeMap::new();
        for entry in self.reached(playhead) {
            if entry.address.group_key() != instance {
                continue;
            }
            if let Some(node) = entry.address.node_id() {
                colors.insert(node, entry.color.clone());
            }
        }
        colors
    }

    /// Latest state per instance group and node at the playhead.
    pub fn snapshot_at(&self, playhead: Playhead) -> StateSnapshot {
        let mut snapshot = StateSnapshot::new();
        for entry in self.reached(playhead) {
            let Some(node) = entry.address.node_id() else {
                continue;
            };
            snapshot.entry(entry.address.group_key()).or_default().insert(
                node,
                StateCard {
                    address: entry.address.clone(),
                    color: entry.color.clone(),
                    neighbors: entry.neighbors.clone(),
                },
            );
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> StateHistory {
        let json = r##"{
            "colors": {
                "0/0": {"A/echo/i1": "#000000", "B/echo/i1": "#000000"},
                "2/0": {"A/echo/i1": "#ff0000"},
                "10/0": {"B/echo/i1": "#00ff00"},
                "3/1": {"A/flood/i2": "#0000ff"}
            },
            "neighbors": {
                "0/0": {"A/echo/i1": "['B']", "B/echo/i1": "['A']"},
                "2/0": {"A/echo/i1": "['B']"},
                "10/0": {"B/echo/i1": []},
                "3/1": {"A/flood/i2": "[]"}
            }
        }"##;
        let response: StatesResponse = serde_json::from_str(json).unwrap();
        StateHistory::from_response(&response).unwrap()
    }

    #[test]
    fn entries_sorted_by_clock_not_key_text() {
        let clocks: Vec<_> = history().entries().iter().map(|e| e.clock).collect();
        let mut sorted = clocks.clone();
        sorted.sort();
        assert_eq!(clocks, sorted);
        assert_eq!(clocks.last(), Some(&LogicalClock::at(10, 0)));
    }

    #[test]
    fn instances_in_first_seen_order() {
        let history = history();
        assert_eq!(history.instances(), vec!["echo/i1", "flood/i2"]);
        assert_eq!(history.default_instance().as_deref(), Some("echo/i1"));
    }

    #[test]
    fn colors_follow_playhead() {
        let history = history();
        let early = history.node_colors_at(Playhead::at(1, 0), "echo/i1");
        assert_eq!(early.get("A").map(String::as_str), Some("#000000"));

        let later = history.node_colors_at(Playhead::interpolated(2.5), "echo/i1");
        assert_eq!(later.get("A").map(String::as_str), Some("#ff0000"));
        assert_eq!(later.get("B").map(String::as_str), Some("#000000"));

        let other = history.node_colors_at(Playhead::at(4, 0), "flood/i2");
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn snapshot_groups_by_instance() {
        let snapshot = history().snapshot_at(Playhead::at(3, 1));
        assert_eq!(snapshot.len(), 2);
        let echo = &snapshot["echo/i1"];
        assert_eq!(echo["A"].color, "#ff0000");
        assert_eq!(echo["A"].neighbors, vec!["B"]);
        assert_eq!(echo["B"].color, "#000000");
    }

    #[test]
    fn bad_key_is_decode_error() {
        let json = r#"{"colors": {"later": {"A/x/y": "red"}}, "neighbors": {}}"#;
        let response: StatesResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            StateHistory::from_response(&response),
            Err(Error::InvalidClock(_))
        ));
    }
}

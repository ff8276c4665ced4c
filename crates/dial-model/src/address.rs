//! Structured process/algorithm addresses.
//!
//! Addresses have the form `node[:port]/process/program#instance`. Each
//! level is optional from the right; the empty string is the root address.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Host plus optional port of a simulated node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddress {
    pub host: String,
    pub port: Option<u16>,
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{port}", self.host),
            None => f.write_str(&self.host),
        }
    }
}

/// A parsed address, tagged by how many levels it names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Address {
    Root,
    Node(NodeAddress),
    Process {
        node: NodeAddress,
        process: String,
    },
    Program {
        node: NodeAddress,
        process: String,
        program: String,
    },
    Instance {
        node: NodeAddress,
        process: String,
        program: String,
        instance: String,
    },
}

fn invalid(input: &str, reason: &'static str) -> Error {
    Error::InvalidAddress {
        input: input.to_string(),
        reason,
    }
}

fn parse_node(input: &str, segment: &str) -> Result<NodeAddress> {
    match segment.split_once(':') {
        None => Ok(NodeAddress {
            host: segment.to_string(),
            port: None,
        }),
        Some((host, port)) => {
            if host.is_empty() {
                return Err(invalid(input, "empty host"));
            }
            let port = port
                .parse()
                .map_err(|_| invalid(input, "port is not a number"))?;
            Ok(NodeAddress {
                host: host.to_string(),
                port: Some(port),
            })
        }
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Ok(Address::Root);
        }

        let segments: Vec<&str> = input.split('/').collect();
        if segments.len() > 3 {
            return Err(invalid(input, "more than three segments"));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(invalid(input, "empty segment"));
        }
        if segments[..segments.len().min(2)]
            .iter()
            .any(|s| s.contains('#'))
        {
            return Err(invalid(input, "'#' outside the program segment"));
        }

        let node = parse_node(input, segments[0])?;
        let Some(process) = segments.get(1) else {
            return Ok(Address::Node(node));
        };
        let process = process.to_string();
        let Some(program) = segments.get(2) else {
            return Ok(Address::Process { node, process });
        };

        match program.split_once('#') {
            None => Ok(Address::Program {
                node,
                process,
                program: program.to_string(),
            }),
            Some((program, instance)) => {
                if program.is_empty() || instance.is_empty() || instance.contains('#') {
                    return Err(invalid(input, "malformed program#instance"));
                }
                Ok(Address::Instance {
                    node,
                    process,
                    program: program.to_string(),
                    instance: instance.to_string(),
                })
            }
        }
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Root => Ok(()),
            Address::Node(node) => write!(f, "{node}"),
            Address::Process { node, process } => write!(f, "{node}/{process}"),
            Address::Program {
                node,
                process,
                program,
            } => write!(f, "{node}/{process}/{program}"),
            Address::Instance {
                node,
                process,
                program,
                instance,
            } => write!(f, "{node}/{process}/{program}#{instance}"),
        }
    }
}

impl Address {
    /// The node this address lives on, if any.
    pub fn node(&self) -> Option<&NodeAddress> {
        match self {
            Address::Root => None,
            Address::Node(node)
            | Address::Process { node, .. }
            | Address::Program { node, .. }
            | Address::Instance { node, .. } => Some(node),
        }
    }

    /// Node identifier as it appears in the topology.
    pub fn node_id(&self) -> Option<String> {
        self.node().map(ToString::to_string)
    }

    /// The `node/process` prefix used to place messages on a process lane.
    pub fn process_address(&self) -> Option<Address> {
        match self {
            Address::Root | Address::Node(_) => None,
            Address::Process { node, process }
            | Address::Program { node, process, .. }
            | Address::Instance { node, process, .. } => Some(Address::Process {
                node: node.clone(),
                process: process.clone(),
            }),
        }
    }

    /// The address without its node, grouping the same algorithm instance
    /// across nodes.
    pub fn group_key(&self) -> String {
        let full = self.to_string();
        match full.split_once('/') {
            Some((_, rest)) => rest.to_string(),
            None => String::new(),
        }
    }

    /// Instance name, when the address names one.
    pub fn instance(&self) -> Option<&str> {
        match self {
            Address::Instance { instance, .. } => Some(instance),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_root() {
        assert_eq!("".parse::<Address>().unwrap(), Address::Root);
        assert_eq!(Address::Root.to_string(), "");
    }

    #[test]
    fn parses_every_level() {
        let node: Address = "n1:10101".parse().unwrap();
        assert_eq!(
            node,
            Address::Node(NodeAddress {
                host: "n1".into(),
                port: Some(10101)
            })
        );

        let instance: Address = "n1:10101/echo/flood#i3".parse().unwrap();
        assert_eq!(instance.instance(), Some("i3"));
        assert_eq!(instance.node_id().as_deref(), Some("n1:10101"));
        assert_eq!(instance.group_key(), "echo/flood#i3");
        assert_eq!(
            instance.process_address().unwrap().to_string(),
            "n1:10101/echo"
        );

        let program: Address = "a/b/c".parse().unwrap();
        assert!(matches!(program, Address::Program { .. }));
    }

    #[test]
    fn display_round_trips() {
        for input in ["n", "n:1", "n/p", "n:2/p/q", "n/p/q#r"] {
            let address: Address = input.parse().unwrap();
            assert_eq!(address.to_string(), input);
        }
    }

    #[test]
    fn rejects_malformed_input() {
        for input in [
            "a/b/c/d",
            "a//c",
            "/a",
            "a:port/b",
            ":80/b",
            "a#x/b",
            "a/b#x/c",
            "a/b/#x",
            "a/b/c#",
            "a/b/c#x#y",
        ] {
            assert!(
                matches!(input.parse::<Address>(), Err(Error::InvalidAddress { .. })),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn serde_uses_string_form() {
        let address: Address = serde_json::from_str("\"n/p/q#r\"").unwrap();
        assert_eq!(serde_json::to_string(&address).unwrap(), "\"n/p/q#r\"");
        assert!(serde_json::from_str::<Address>("\"a/b/c/d\"").is_err());
    }
}

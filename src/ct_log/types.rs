// src/ct_log/types.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// A monitorable CT log
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogDescriptor {
    /// Normalised base URL (https scheme, no trailing slash)
    pub url: String,
    /// Human-readable description from the log list
    pub name: String,
}

impl LogDescriptor {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for LogDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.url)
        } else {
            write!(f, "{} ({})", self.name, self.url)
        }
    }
}

/// A batch of raw entries returned by a log, plus where the next fetch should start
#[derive(Debug, Clone, Default)]
pub struct FetchedBatch {
    pub entries: Vec<LogEntry>,
    pub next_index: u64,
}

/// Response from CT log's get-sth endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTreeHead {
    pub tree_size: u64,
    pub timestamp: u64,
    #[serde(default)]
    pub sha256_root_hash: String,
    #[serde(default)]
    pub tree_head_signature: String,
}

/// Single entry from CT log's get-entries endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub leaf_input: String, // base64-encoded MerkleTreeLeaf
    #[serde(default)]
    pub extra_data: String, // base64-encoded chain (precert for type 1)
}

/// Response wrapper for get-entries endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct GetEntriesResponse {
    pub entries: Vec<LogEntry>,
}

/// Google's CT log list V3 format
#[derive(Debug, Serialize, Deserialize)]
pub struct LogListV3 {
    pub operators: Vec<Operator>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Operator {
    pub name: String,
    #[serde(default)]
    pub logs: Vec<LogInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogInfo {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub state: Option<StateWrapper>,
}

/// State wrapper that can contain different state types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateWrapper {
    #[serde(default)]
    pub usable: Option<StateTimestamp>,
    #[serde(default)]
    pub qualified: Option<StateTimestamp>,
    #[serde(default)]
    pub readonly: Option<StateTimestamp>,
    #[serde(default)]
    pub retired: Option<StateTimestamp>,
    #[serde(default)]
    pub rejected: Option<StateTimestamp>,
}

impl StateWrapper {
    /// The log is actively accepting new entries
    pub fn is_usable(&self) -> bool {
        self.usable.is_some() || self.qualified.is_some()
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly.is_some()
    }

    pub fn is_acceptable(&self, include_readonly: bool) -> bool {
        self.is_usable() || (include_readonly && self.is_readonly())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTimestamp {
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_list_state_filtering() {
        let json = r#"{
            "operators": [{
                "name": "Example",
                "logs": [
                    {"description": "usable", "url": "https://a/", "state": {"usable": {"timestamp": "2024-01-01T00:00:00Z"}}},
                    {"description": "frozen", "url": "https://b/", "state": {"readonly": {"timestamp": "2024-01-01T00:00:00Z"}}},
                    {"description": "gone", "url": "https://c/", "state": {"retired": {"timestamp": "2024-01-01T00:00:00Z"}}}
                ]
            }]
        }"#;

        let list: LogListV3 = serde_json::from_str(json).unwrap();
        let logs = &list.operators[0].logs;

        let state = |i: usize| logs[i].state.as_ref().unwrap();
        assert!(state(0).is_acceptable(false));
        assert!(!state(1).is_acceptable(false));
        assert!(state(1).is_acceptable(true));
        assert!(!state(2).is_acceptable(true));
    }

    #[test]
    fn test_descriptor_display() {
        assert_eq!(
            LogDescriptor::new("https://ct.example", "Example 2025").to_string(),
            "Example 2025 (https://ct.example)"
        );
        assert_eq!(LogDescriptor::new("https://ct.example", "").to_string(), "https://ct.example");
    }

    #[test]
    fn test_sth_without_optional_fields() {
        let sth: SignedTreeHead =
            serde_json::from_str(r#"{"tree_size": 42, "timestamp": 1700000000000}"#).unwrap();
        assert_eq!(sth.tree_size, 42);
        assert!(sth.tree_head_signature.is_empty());
    }
}

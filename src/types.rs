// src/types.rs
use serde::Serialize;
use std::fmt;

/// A decoded certificate as it travels from a log monitor to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertRecord {
    /// Candidate domains in first-seen order, case preserved, no duplicates
    pub domains: Vec<String>,
    /// Validity start (Unix timestamp)
    pub not_before: i64,
    /// Validity end (Unix timestamp)
    pub not_after: i64,
    pub issuer: String,
    /// URL of the CT log the entry was read from
    pub source_log: String,
}

/// A single domain that matched a single target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEvent {
    pub domain: String,
    pub target: String,
}

impl MatchEvent {
    pub fn new(domain: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            target: target.into(),
        }
    }
}

/// Represents a match for output handlers
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    /// Timestamp when the match was found (Unix timestamp)
    pub timestamp: i64,

    /// The domain that matched
    pub domain: String,

    /// The target it matched
    pub target: String,

    /// All domains in the certificate
    pub all_domains: Vec<String>,

    /// Certificate validity start time (Unix timestamp)
    pub not_before: i64,

    /// Certificate validity end time (Unix timestamp)
    pub not_after: i64,

    /// Certificate issuer
    pub issuer: String,

    /// CT log URL where this cert was found
    pub log_url: String,
}

impl MatchResult {
    /// Create a new MatchResult from a match and the record it came from
    pub fn from_match(event: &MatchEvent, record: &CertRecord) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            domain: event.domain.clone(),
            target: event.target.clone(),
            all_domains: record.domains.clone(),
            not_before: record.not_before,
            not_after: record.not_after,
            issuer: record.issuer.clone(),
            log_url: record.source_log.clone(),
        }
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[+] {} (target: {})", self.domain, self.target)
    }
}

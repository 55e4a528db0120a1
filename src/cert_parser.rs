// src/cert_parser.rs
use anyhow::{Context, Result};
use base64::Engine;
use std::collections::HashSet;
use x509_parser::extensions::ParsedExtension;
use x509_parser::prelude::*;

use crate::ct_log::LogEntry;
use crate::types::CertRecord;

/// Certificate fields the monitoring engine cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCert {
    pub common_name: Option<String>,
    pub dns_names: Vec<String>,
    pub not_before: i64,
    pub not_after: i64,
    pub issuer: String,
    pub is_precert: bool,
}

impl DecodedCert {
    /// Candidate domains: the subject CN followed by every SAN DNS name, deduplicated
    pub fn domains(&self) -> Vec<String> {
        extract_domains(self.common_name.as_deref(), &self.dns_names)
    }

    /// Build the record published on the bus. Returns `None` when the certificate names no domain.
    pub fn into_record(self, source_log: &str) -> Option<CertRecord> {
        let domains = self.domains();
        if domains.is_empty() {
            return None;
        }

        Some(CertRecord {
            domains,
            not_before: self.not_before,
            not_after: self.not_after,
            issuer: self.issuer,
            source_log: source_log.to_string(),
        })
    }
}

/// Merge subject CN and SAN names, keeping first-seen order and case
pub fn extract_domains(common_name: Option<&str>, dns_names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut domains = Vec::new();

    let candidates = common_name
        .into_iter()
        .chain(dns_names.iter().map(String::as_str));

    for name in candidates {
        if name.is_empty() {
            continue;
        }
        if seen.insert(name) {
            domains.push(name.to_string());
        }
    }

    domains
}

/// Turns a raw CT log entry into certificate fields
pub trait CertDecoder: Send + Sync {
    fn decode(&self, entry: &LogEntry) -> Result<DecodedCert>;
}

/// RFC 6962 `MerkleTreeLeaf` + X.509 decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct X509Decoder;

impl CertDecoder for X509Decoder {
    fn decode(&self, entry: &LogEntry) -> Result<DecodedCert> {
        CertificateParser::parse_log_entry(&entry.leaf_input, &entry.extra_data)
    }
}

/// Certificate parser for extracting domains and metadata
pub struct CertificateParser;

impl CertificateParser {
    /// Parse a CT log entry (handles both x509_entry and precert_entry types).
    /// Precertificates are read from `extra_data`, which carries the full pre-certificate.
    pub fn parse_log_entry(base64_leaf_input: &str, base64_extra_data: &str) -> Result<DecodedCert> {
        let leaf_bytes = base64::engine::general_purpose::STANDARD
            .decode(base64_leaf_input)
            .context("Failed to decode base64 leaf_input")?;

        // version(1) + leaf_type(1) + timestamp(8) + entry_type(2)
        if leaf_bytes.len() < 12 {
            anyhow::bail!("Leaf input too short: {} bytes", leaf_bytes.len());
        }

        let entry_type = u16::from_be_bytes([leaf_bytes[10], leaf_bytes[11]]);

        match entry_type {
            0 => {
                let cert_der = read_u24_prefixed(&leaf_bytes[12..])
                    .context("x509_entry truncated")?;
                Self::parse_der(cert_der, false)
            }
            1 => {
                let extra_bytes = base64::engine::general_purpose::STANDARD
                    .decode(base64_extra_data)
                    .context("Failed to decode base64 extra_data")?;

                let precert_der = read_u24_prefixed(&extra_bytes)
                    .context("precert_entry extra_data truncated")?;
                Self::parse_der(precert_der, true)
            }
            other => anyhow::bail!("Unknown entry type: {}", other),
        }
    }

    /// Extract certificate metadata from DER bytes
    pub fn parse_der(der_bytes: &[u8], is_precert: bool) -> Result<DecodedCert> {
        let (_, cert) = X509Certificate::from_der(der_bytes)
            .map_err(|e| anyhow::anyhow!("Failed to parse certificate from DER: {:?}", e))?;

        let mut dns_names = Vec::new();
        for ext in cert.extensions() {
            if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
                for general_name in &san.general_names {
                    if let GeneralName::DNSName(dns_name) = general_name {
                        dns_names.push(dns_name.to_string());
                    }
                }
            }
        }

        let common_name = first_common_name(cert.subject());

        // Prefer the issuer CN, fall back to the full DN
        let issuer =
            first_common_name(cert.issuer()).unwrap_or_else(|| cert.issuer().to_string());

        Ok(DecodedCert {
            common_name,
            dns_names,
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            issuer,
            is_precert,
        })
    }
}

fn first_common_name(name: &X509Name) -> Option<String> {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
}

/// Read a 3-byte big-endian length followed by that many bytes
fn read_u24_prefixed(bytes: &[u8]) -> Option<&[u8]> {
    if bytes.len() < 3 {
        return None;
    }
    let len = ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | (bytes[2] as usize);
    bytes.get(3..3 + len)
}

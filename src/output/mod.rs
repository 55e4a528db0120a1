// src/output/mod.rs
//! Per-match output for crtmon
//!
//! Every match is written to each configured handler. Handler failures are logged
//! and never stop the dispatcher.

use crate::types::MatchResult;
use async_trait::async_trait;
use std::sync::Arc;

pub mod human;
pub mod json;

pub use human::HumanOutput;
pub use json::JsonOutput;

/// Trait for output handlers that report matched domains
#[async_trait]
pub trait OutputHandler: Send + Sync {
    /// Emit a matched domain
    async fn emit_match(&self, result: &MatchResult) -> anyhow::Result<()>;

    /// Flush any buffered output
    async fn flush(&self) -> anyhow::Result<()>;
}

/// Manager that dispatches output to multiple handlers
pub struct OutputManager {
    handlers: Vec<Arc<dyn OutputHandler>>,
}

impl OutputManager {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Human-readable or JSON-lines stdout output
    pub fn for_stdout(json: bool) -> Self {
        let mut manager = Self::new();
        if json {
            manager.add_handler(Arc::new(JsonOutput::new()));
        } else {
            manager.add_handler(Arc::new(HumanOutput::new()));
        }
        manager
    }

    pub fn add_handler(&mut self, handler: Arc<dyn OutputHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Emit a match to all handlers
    ///
    /// Errors from individual handlers are logged but don't stop the others.
    pub async fn emit(&self, result: &MatchResult) -> anyhow::Result<()> {
        let mut last_error = None;

        for handler in &self.handlers {
            if let Err(e) = handler.emit_match(result).await {
                tracing::warn!("Output handler error: {}", e);
                last_error = Some(e);
            }
        }

        // Only an error when the sole handler failed
        if let Some(err) = last_error {
            if self.handlers.len() == 1 {
                return Err(err);
            }
        }

        Ok(())
    }

    /// Flush all handlers
    pub async fn flush(&self) -> anyhow::Result<()> {
        for handler in &self.handlers {
            handler.flush().await?;
        }
        Ok(())
    }
}

impl Default for OutputManager {
    fn default() -> Self {
        Self::new()
    }
}

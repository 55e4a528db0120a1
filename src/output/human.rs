// src/output/human.rs
//! Human-readable colored terminal output

use crate::output::OutputHandler;
use crate::types::MatchResult;
use async_trait::async_trait;
use colored::Colorize;
use std::io::{self, Write};
use std::sync::Mutex;

/// Human-readable output handler with colored terminal output
pub struct HumanOutput {
    writer: Mutex<Box<dyn Write + Send>>,
    use_colors: bool,
}

impl HumanOutput {
    /// Create a new HumanOutput that writes to stdout
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(Box::new(io::stdout())),
            use_colors: is_terminal::is_terminal(std::io::stdout()),
        }
    }

    pub fn with_writer(writer: Box<dyn Write + Send>, use_colors: bool) -> Self {
        Self {
            writer: Mutex::new(writer),
            use_colors,
        }
    }

    /// Format a timestamp as HH:MM:SS (UTC)
    fn format_timestamp(ts: i64) -> String {
        match chrono::DateTime::from_timestamp(ts, 0) {
            Some(datetime) => datetime.format("%H:%M:%S").to_string(),
            None => ts.to_string(),
        }
    }

    /// The line printed for a match, without colors
    pub fn format_plain(result: &MatchResult) -> String {
        format!(
            "[{}] [+] {}  ({})",
            Self::format_timestamp(result.timestamp),
            result.domain,
            result.target
        )
    }
}

impl Default for HumanOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OutputHandler for HumanOutput {
    async fn emit_match(&self, result: &MatchResult) -> anyhow::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("output writer poisoned"))?;

        if self.use_colors {
            writeln!(
                writer,
                "{} {} {}  {}",
                format!("[{}]", Self::format_timestamp(result.timestamp)).dimmed(),
                "[+]".green().bold(),
                result.domain.cyan().bold(),
                format!("({})", result.target).yellow()
            )?;
        } else {
            writeln!(writer, "{}", Self::format_plain(result))?;
        }

        writer.flush()?;
        Ok(())
    }

    async fn flush(&self) -> anyhow::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("output writer poisoned"))?;
        writer.flush()?;
        Ok(())
    }
}

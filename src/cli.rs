// src/cli.rs
use anyhow::{Context, bail};
use clap::Parser;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::notify::{Provider, parse_providers};

/// crtmon: Certificate Transparency subdomain monitor
///
/// Follows the public CT logs and reports newly issued certificates whose names
/// contain one of your targets, with batched Discord/Telegram/webhook alerts.
#[derive(Parser, Debug, Clone)]
#[command(name = "crtmon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    // ===== Targets =====
    /// Target to monitor: a domain, a file with one target per line, or '-' for stdin
    #[arg(short = 't', long = "target")]
    pub target: Option<String>,

    /// Only report domains that also contain this keyword
    #[arg(short = 's', long = "scope")]
    pub scope: Option<String>,

    // ===== Configuration =====
    /// Path to TOML config file (default: ~/.config/crtmon/provider.toml)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Notification providers: discord, telegram, webhook, or both (= discord,telegram)
    #[arg(short = 'n', long = "notify")]
    pub notify: Option<String>,

    // ===== Output =====
    /// Output matches in JSONL format to stdout
    #[arg(short = 'j', long = "json")]
    pub json: bool,

    /// Log a statistics line every N seconds (0 disables)
    #[arg(long = "stats-interval", default_value = "60")]
    pub stats_interval: u64,

    // ===== Logging =====
    /// Verbose logging (set log level to debug)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Quiet logging (set log level to warn)
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

/// Where the active target list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOrigin {
    Flag,
    Stdin,
    Config,
}

impl std::fmt::Display for TargetOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TargetOrigin::Flag => "cli flag",
            TargetOrigin::Stdin => "stdin",
            TargetOrigin::Config => "configuration",
        })
    }
}

impl Cli {
    /// Validate flag combinations and return errors for invalid usage
    pub fn validate(&self) -> anyhow::Result<()> {
        // Verbose and quiet are mutually exclusive
        if self.verbose && self.quiet {
            bail!("Cannot specify both --verbose and --quiet");
        }

        if let Some(target) = &self.target {
            if target.trim().is_empty() {
                bail!("--target must not be empty");
            }
        }

        self.providers()?;
        Ok(())
    }

    /// Providers selected with `--notify`; none when the flag is absent
    pub fn providers(&self) -> anyhow::Result<Vec<Provider>> {
        match &self.notify {
            Some(value) => parse_providers(value),
            None => Ok(Vec::new()),
        }
    }

    /// Fallback log level when RUST_LOG is unset
    pub fn log_level<'a>(&self, configured: &'a str) -> &'a str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else if self.json {
            "error"
        } else {
            configured
        }
    }

    /// Resolve targets: `--target` first, then piped stdin, then the config file.
    ///
    /// Returns `None` when no source supplied anything.
    pub fn resolve_targets(
        &self,
        stdin_piped: bool,
        configured: &[String],
    ) -> anyhow::Result<Option<(Vec<String>, TargetOrigin)>> {
        if let Some(value) = &self.target {
            let targets = resolve_target_flag(value)?;
            if targets.is_empty() {
                bail!("no targets resolved from --target");
            }
            return Ok(Some((targets, TargetOrigin::Flag)));
        }

        if stdin_piped {
            let targets = read_targets(std::io::stdin().lock())
                .context("failed to read targets from stdin")?;
            if targets.is_empty() {
                bail!("no targets provided on stdin");
            }
            return Ok(Some((targets, TargetOrigin::Stdin)));
        }

        if configured.is_empty() {
            return Ok(None);
        }
        Ok(Some((configured.to_vec(), TargetOrigin::Config)))
    }
}

/// Interpret a `--target` value: `-` reads stdin, an existing file is read line by line,
/// anything else is a literal target
pub fn resolve_target_flag(value: &str) -> anyhow::Result<Vec<String>> {
    let value = value.trim();
    if value == "-" {
        return read_targets(std::io::stdin().lock()).context("failed to read targets from stdin");
    }

    let path = Path::new(value);
    if path.is_file() {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open target file {}", path.display()))?;
        return read_targets(BufReader::new(file))
            .with_context(|| format!("failed to read target file {}", path.display()));
    }

    Ok(vec![value.to_string()])
}

/// One target per line; blank lines and `#` comments are skipped
pub fn read_targets<R: BufRead>(reader: R) -> anyhow::Result<Vec<String>> {
    let mut targets = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        targets.push(line.to_string());
    }
    Ok(targets)
}

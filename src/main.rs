// src/main.rs
use anyhow::{Context, bail};
use clap::Parser;
use crtmon::cert_parser::X509Decoder;
use crtmon::cli::Cli;
use crtmon::config::{self, Config};
use crtmon::ct_log::HttpLogSource;
use crtmon::engine::{Engine, EngineSettings};
use crtmon::matcher::TargetMatcher;
use crtmon::notify::Notifiers;
use crtmon::output::OutputManager;
use crtmon::stats::StatsCollector;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();
    cli.validate()?;

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };
    let loaded = Config::load_optional(&config_path)?;
    let config_found = loaded.is_some();
    let config = loaded.unwrap_or_default();

    // Initialize logging; stderr keeps stdout clean for --json
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level(&config.logging.level)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    if !config_found {
        tracing::warn!(
            "No configuration file at {}; notifications disabled unless providers are configured",
            config_path.display()
        );
    }

    let stdin_piped = !is_terminal::is_terminal(std::io::stdin());
    let (targets, origin) = match cli.resolve_targets(stdin_piped, &config.targets())? {
        Some(resolved) => resolved,
        None if !config_found => {
            config::write_template(&config_path)?;
            tracing::info!("Created config template at {}", config_path.display());
            bail!(
                "please edit {} or provide targets via --target or stdin and run again",
                config_path.display()
            );
        }
        None => bail!(
            "no targets configured. add target domains to {} or use --target or stdin",
            config_path.display()
        ),
    };

    tracing::info!("Using {} targets from {}", targets.len(), origin);
    for (i, target) in targets.iter().enumerate() {
        tracing::info!("  {}. {}", i + 1, target);
    }

    let matcher = TargetMatcher::new(&targets, cli.scope.as_deref());
    if matcher.is_empty() {
        bail!("no usable targets after trimming blank entries");
    }
    if let Some(scope) = matcher.scope() {
        tracing::info!("Scope filter: {}", scope);
    }

    let stats = StatsCollector::new();
    let notifiers = Notifiers::from_config(&config, &cli.providers()?, stats.clone());

    let source = HttpLogSource::new(config.ct_logs.clone())
        .context("Failed to initialise the CT log client")?;

    let mut settings = EngineSettings::from_config(&config);
    if cli.stats_interval > 0 {
        settings.stats_interval = Some(Duration::from_secs(cli.stats_interval));
    }

    let engine = Engine::new(
        Arc::new(source),
        Arc::new(X509Decoder),
        matcher,
        OutputManager::for_stdout(cli.json),
        notifiers,
        settings,
        stats,
    );

    // Shutdown on Ctrl-C / SIGTERM
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutting down...");
        let _ = shutdown_tx.send(true);
    });

    tracing::info!("Connecting to certificate transparency logs");
    engine.run(shutdown_rx).await?;
    tracing::info!("Goodbye");

    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

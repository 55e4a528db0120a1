// Configuration loading against files on disk
use crtmon::config::{Config, write_template};
use crtmon::notify::{Notifiers, Provider};
use crtmon::stats::StatsCollector;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_configured_providers_are_built() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("provider.toml");
    fs::write(
        &path,
        r#"
targets = ["example.com"]

[discord]
webhook_url = "https://discord.com/api/webhooks/1/abc"

[webhook]
url = "https://hooks.example.com/ct"
secret = "s3cret"
"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    let notifiers = Notifiers::from_config(
        &config,
        &[Provider::Discord, Provider::Telegram, Provider::Webhook],
        StatsCollector::new(),
    );

    // telegram has no credentials and is skipped
    assert_eq!(notifiers.names(), vec!["discord", "webhook"]);
}

#[test]
fn test_template_is_loadable_but_has_no_targets() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".config").join("crtmon").join("provider.toml");

    write_template(&path).unwrap();
    assert!(path.exists());

    let config = Config::load_optional(&path).unwrap().expect("template should parse");
    assert!(config.targets().is_empty());
    assert_eq!(config.pipeline.flush_threshold, 25);
}

#[test]
fn test_invalid_pipeline_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("provider.toml");
    fs::write(&path, "[pipeline]\nflush_threshold = 0\n").unwrap();

    let err = Config::from_file(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("flush_threshold"));
}
